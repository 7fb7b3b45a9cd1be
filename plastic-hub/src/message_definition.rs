//! Message definitions and the static catalogue of known messages

use crate::error::TypeError;
use crate::identifier::Identifier;
use crate::message_id::*;
use crate::value::Value;
use crate::value_type::{infer_type, ValueType};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Number of optional ANY arguments given to a message whose arguments
/// could not be typed
pub const PERMISSIVE_ARG_COUNT: usize = 20;

/// Declared argument and return shape of one message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDefinition {
    id: Identifier,
    arg_types: Vec<ValueType>,
    required_args: usize,
    return_type: ValueType,
}

impl MessageDefinition {
    /// Creates a definition in which every argument is required
    pub fn new(id: Identifier, arg_types: Vec<ValueType>, return_type: ValueType) -> Self {
        let required_args = arg_types.len();
        Self {
            id,
            arg_types,
            required_args,
            return_type,
        }
    }

    /// Lowers the number of required arguments.
    ///
    /// Values larger than the number of declared arguments are clamped.
    pub fn with_required_args(mut self, required_args: usize) -> Self {
        self.required_args = required_args.min(self.arg_types.len());
        self
    }

    /// Synthesises a definition from the arguments of an observed call.
    ///
    /// All observed arguments become required and the return type is ANY.
    pub fn infer(id: Identifier, args: &[Value]) -> Result<Self, TypeError> {
        let arg_types = args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                infer_type(arg).map_err(|e| TypeError::new(format!("arg {}: {}", i, e.reason)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(id, arg_types, ValueType::Any))
    }

    /// A definition that accepts anything, used once inference has failed
    pub fn permissive(id: Identifier) -> Self {
        Self::new(id, vec![ValueType::Any; PERMISSIVE_ARG_COUNT], ValueType::Any)
            .with_required_args(0)
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn arg_types(&self) -> &[ValueType] {
        &self.arg_types
    }

    pub fn required_args(&self) -> usize {
        self.required_args
    }

    pub fn return_type(&self) -> ValueType {
        self.return_type
    }
}

impl fmt::Display for MessageDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.id)?;
        for (i, ty) in self.arg_types.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            if i >= self.required_args {
                write!(f, "[{}]", ty)?;
            } else {
                write!(f, "{}", ty)?;
            }
        }
        write!(f, ") -> {}", self.return_type)
    }
}

static CATALOGUE: Lazy<HashMap<Identifier, MessageDefinition>> = Lazy::new(|| {
    use ValueType::*;
    let defs = vec![
        MessageDefinition::new(ECHO.clone(), vec![String], String),
        MessageDefinition::new(GET_NAME.clone(), vec![], String),
        MessageDefinition::new(GET_IRN.clone(), vec![], StringIvorn),
        MessageDefinition::new(GET_VERSION.clone(), vec![], String),
        MessageDefinition::new(GET_DESCRIPTION.clone(), vec![], String),
        MessageDefinition::new(GET_ICON_URL.clone(), vec![], StringUrl),
        MessageDefinition::new(APPLICATION_REGISTERED.clone(), vec![StringUri], Void),
        MessageDefinition::new(APPLICATION_UNREGISTERED.clone(), vec![StringUri], Void),
        MessageDefinition::new(HUB_STOPPING.clone(), vec![], Void),
        MessageDefinition::new(HUB_EXIT.clone(), vec![], Void),
        MessageDefinition::new(VOTABLE_LOAD.clone(), vec![String, String], Boolean)
            .with_required_args(1),
        MessageDefinition::new(VOTABLE_LOAD_FROM_URL.clone(), vec![StringUrl, String], Boolean)
            .with_required_args(1),
        MessageDefinition::new(VOTABLE_SHOW_OBJECTS.clone(), vec![String, ListInts], Boolean),
        MessageDefinition::new(VOTABLE_HIGHLIGHT_OBJECT.clone(), vec![String, Int], Boolean),
        MessageDefinition::new(FITS_LOAD_FROM_URL.clone(), vec![StringUrl, String], Boolean)
            .with_required_args(1),
        MessageDefinition::new(
            SPECTRUM_LOAD_FROM_URL.clone(),
            vec![StringUrl, String, Map],
            Boolean,
        ),
        MessageDefinition::new(SKY_POINT_AT_COORDS.clone(), vec![Double, Double], Boolean),
    ];
    defs.into_iter().map(|d| (d.id.clone(), d)).collect()
});

/// Looks up a message in the static catalogue
pub fn lookup(id: &Identifier) -> Option<&'static MessageDefinition> {
    CATALOGUE.get(id)
}

/// All definitions in the static catalogue
pub fn known_definitions() -> Vec<&'static MessageDefinition> {
    CATALOGUE.values().collect()
}
