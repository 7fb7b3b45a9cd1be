//! Advisory checking of requests and responses against message definitions
//!
//! The validator never changes the outcome of a dispatch. It only produces
//! human-readable warnings, which the hub logs under the
//! `plastic_hub::validation` target.

use crate::identifier::Identifier;
use crate::message_definition::{self, MessageDefinition};
use crate::value::Value;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// Checks observed traffic against known or inferred message definitions
#[derive(Debug)]
pub struct MessageValidator {
    definitions: DashMap<Identifier, MessageDefinition>,
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageValidator {
    /// Creates a validator seeded with the static catalogue
    pub fn new() -> Self {
        let definitions = DashMap::new();
        for def in message_definition::known_definitions() {
            definitions.insert(def.id().clone(), def.clone());
        }
        Self { definitions }
    }

    /// Returns the definition currently held for `message`, if any
    pub fn definition(&self, message: &Identifier) -> Option<MessageDefinition> {
        self.definitions.get(message).map(|d| d.clone())
    }

    /// Checks a request.
    ///
    /// # Arguments
    /// * `sender` - Claimed sender of the request
    /// * `message` - Message being sent
    /// * `args` - Message arguments
    /// * `registered` - Registry snapshot used to check the sender, if available
    ///
    /// # Returns
    /// Every problem found; an empty list means the request looks fine.
    pub fn validate_request(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        registered: Option<&[Identifier]>,
    ) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Some(ids) = registered {
            if !ids.contains(sender) {
                warnings.push(format!("Sender {} is not registered", sender));
            }
        }

        let def = match self.definitions.entry(message.clone()) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                let def = match MessageDefinition::infer(message.clone(), args) {
                    Ok(def) => {
                        warnings.push(format!(
                            "First sighting of unknown message {}; assuming {}",
                            message, def
                        ));
                        def
                    }
                    Err(e) => {
                        warnings.push(format!(
                            "First sighting of unknown message {}; can't infer argument types ({}), accepting anything",
                            message, e.reason
                        ));
                        MessageDefinition::permissive(message.clone())
                    }
                };
                entry.insert(def);
                return warnings;
            }
        };

        if args.len() < def.required_args() {
            warnings.push(format!(
                "Message {} has {} args, at least {} required",
                message,
                args.len(),
                def.required_args()
            ));
        }
        for (i, (arg, ty)) in args.iter().zip(def.arg_types()).enumerate() {
            if let Err(e) = ty.validate(arg) {
                warnings.push(format!(
                    "Message {} arg {}: {}",
                    message, i, e.reason
                ));
            }
        }
        warnings
    }

    /// Checks a response value against the return type of `message`.
    ///
    /// Silent for messages that have never been seen.
    pub fn validate_response(&self, message: &Identifier, value: &Value) -> Vec<String> {
        match self.definitions.get(message) {
            Some(def) => match def.return_type().validate(value) {
                Ok(()) => Vec::new(),
                Err(e) => vec![format!("Response to {}: {}", message, e.reason)],
            },
            None => Vec::new(),
        }
    }
}
