//! Message argument and return values
//!
//! [`Value`] is the closed set of values a PLASTIC message can carry. It
//! mirrors the XML-RPC scalar and compound types, plus a native-only
//! [`Value::Uri`] that the wire doctoring step turns into a string.

use crate::identifier::Identifier;
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use std::fmt;

/// Longest scalar rendering used in log output before truncation
const MAX_DISPLAY_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// No value; VOID returns and failed lookups
    Null,
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(String),
    Date(NaiveDateTime),
    /// Identifier or URL held natively; sent as a string
    Uri(Identifier),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns a copy safe for transmission over the wire transports.
    ///
    /// URIs become strings; lists and map values are doctored recursively.
    pub fn doctored(&self) -> Value {
        match self {
            Value::Uri(id) => Value::Str(id.to_string()),
            Value::List(items) => Value::List(items.iter().map(Value::doctored).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.doctored()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Uri(id) => Some(id.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Interprets a string or URI value as an identifier
    pub fn as_identifier(&self) -> Option<Identifier> {
        match self {
            Value::Uri(id) => Some(id.clone()),
            Value::Str(s) => Identifier::parse(s).ok(),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "string",
            Value::Date(_) => "date",
            Value::Uri(_) => "uri",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }
}

/// Log-friendly rendering: collections as `( a, b )`, long scalars
/// truncated, newlines escaped.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::List(items) => {
                f.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    write!(f, " {}{}", item, if i + 1 < items.len() { "," } else { " " })?;
                }
                f.write_str(")")
            }
            Value::Map(map) => {
                f.write_str("(")?;
                let n = map.len();
                for (i, (k, v)) in map.iter().enumerate() {
                    write!(f, " {}={}{}", k, v, if i + 1 < n { "," } else { " " })?;
                }
                f.write_str(")")
            }
            Value::Str(s) => f.write_str(&abbreviate(s)),
            Value::Uri(id) => f.write_str(id.as_str()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Double(d) => write!(f, "{}", d),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

pub(crate) fn abbreviate(text: &str) -> String {
    let shortened = if text.chars().count() < MAX_DISPLAY_LEN {
        text.to_string()
    } else {
        let head: String = text.chars().take(MAX_DISPLAY_LEN - 3).collect();
        format!("{}...", head)
    };
    shortened.replace('\n', "\\n")
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Identifier> for Value {
    fn from(id: Identifier) -> Self {
        Value::Uri(id)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(d: NaiveDateTime) -> Self {
        Value::Date(d)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doctoring_replaces_uris_recursively() {
        let id = Identifier::parse("plastic://hub/1-1-x").unwrap();
        let mut map = BTreeMap::new();
        map.insert("who".to_string(), Value::Uri(id.clone()));
        let value = Value::List(vec![Value::Uri(id.clone()), Value::Map(map), Value::Int(3)]);

        let doctored = value.doctored();
        let items = doctored.as_list().unwrap();
        assert_eq!(items[0], Value::Str(id.to_string()));
        match &items[1] {
            Value::Map(m) => assert_eq!(m["who"], Value::Str(id.to_string())),
            other => panic!("expected map, got {:?}", other),
        }
        assert_eq!(items[2], Value::Int(3));
    }

    #[test]
    fn test_display_abbreviates() {
        let long = "x".repeat(100);
        let shown = Value::Str(long).to_string();
        assert_eq!(shown.len(), 60);
        assert!(shown.ends_with("..."));
        assert_eq!(Value::Str("a\nb".into()).to_string(), "a\\nb");
        assert_eq!(Value::from(vec![1, 2]).to_string(), "( 1, 2 )");
        assert_eq!(Value::List(vec![]).to_string(), "()");
    }

    #[test]
    fn test_as_identifier() {
        assert!(Value::from("ivo://votech.org/test/echo").as_identifier().is_some());
        assert!(Value::from("not one").as_identifier().is_none());
        assert!(Value::Int(1).as_identifier().is_none());
    }
}
