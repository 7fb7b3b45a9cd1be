//! Value types used to describe message arguments and return values
//!
//! The set of types is closed. Each one knows how to check a [`Value`]
//! and how to produce a reasonable blank value of itself.

use crate::error::TypeError;
use crate::value::Value;
use chrono::DateTime;
use std::fmt;
use url::Url;

/// Scheme prefix every IVORN must carry
pub const IVORN_PREFIX: &str = "ivo://";

/// Order in which concrete types are tried when inferring a type.
///
/// The order matters for values more than one type would accept.
pub const INFERENCE_ORDER: [ValueType; 7] = [
    ValueType::Int,
    ValueType::Boolean,
    ValueType::String,
    ValueType::Double,
    ValueType::Date,
    ValueType::List,
    ValueType::Map,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Int,
    Boolean,
    String,
    Double,
    Date,
    Map,
    List,
    /// No meaningful value
    Void,
    /// String holding a URL
    StringUrl,
    /// String holding an `ivo://` resource name
    StringIvorn,
    /// String holding any absolute URI
    StringUri,
    /// List whose elements are all ints
    ListInts,
    /// Anything at all
    Any,
}

impl ValueType {
    pub fn name(&self) -> &'static str {
        match self {
            ValueType::Int => "int",
            ValueType::Boolean => "boolean",
            ValueType::String => "string",
            ValueType::Double => "double",
            ValueType::Date => "date",
            ValueType::Map => "map",
            ValueType::List => "list",
            ValueType::Void => "void",
            ValueType::StringUrl => "string(url)",
            ValueType::StringIvorn => "string(ivorn)",
            ValueType::StringUri => "string(uri)",
            ValueType::ListInts => "list(int)",
            ValueType::Any => "any",
        }
    }

    /// Checks that `value` is a legal instance of this type.
    pub fn validate(&self, value: &Value) -> Result<(), TypeError> {
        match (self, value) {
            (ValueType::Any, _) => Ok(()),
            (ValueType::Int, Value::Int(_)) => Ok(()),
            (ValueType::Boolean, Value::Bool(_)) => Ok(()),
            (ValueType::String, Value::Str(_) | Value::Uri(_)) => Ok(()),
            // ints widen to doubles
            (ValueType::Double, Value::Double(_) | Value::Int(_)) => Ok(()),
            (ValueType::Date, Value::Date(_)) => Ok(()),
            (ValueType::List, Value::List(items)) => {
                for (i, item) in items.iter().enumerate() {
                    infer_type(item)
                        .map_err(|e| TypeError::new(format!("list element {}: {}", i, e.reason)))?;
                }
                Ok(())
            }
            (ValueType::Map, Value::Map(map)) => {
                for (key, item) in map {
                    infer_type(item)
                        .map_err(|e| TypeError::new(format!("map entry '{}': {}", key, e.reason)))?;
                }
                Ok(())
            }
            (ValueType::ListInts, Value::List(items)) => {
                match items.iter().position(|item| !matches!(item, Value::Int(_))) {
                    None => Ok(()),
                    Some(i) => Err(TypeError::new(format!(
                        "list element {} is {} not int",
                        i,
                        items[i].kind()
                    ))),
                }
            }
            // some transports cannot carry a true null
            (ValueType::Void, Value::Null) => Ok(()),
            (ValueType::Void, Value::Str(s)) if s.is_empty() => Ok(()),
            (ValueType::Void, Value::List(items)) if items.is_empty() => Ok(()),
            (ValueType::Void, Value::Map(map)) if map.is_empty() => Ok(()),
            (ValueType::Void, other) => Err(TypeError::new(format!(
                "void value expected, got {} {}",
                other.kind(),
                other
            ))),
            (ValueType::StringUrl, v) => check_url(v),
            (ValueType::StringUri, v) => check_uri(v).map(|_| ()),
            (ValueType::StringIvorn, v) => {
                let text = check_uri(v)?;
                if text.starts_with(IVORN_PREFIX) {
                    Ok(())
                } else {
                    Err(TypeError::new(format!(
                        "'{}' is not an IVORN (no {} prefix)",
                        text, IVORN_PREFIX
                    )))
                }
            }
            (ty, other) => Err(TypeError::new(format!(
                "{} value expected, got {} {}",
                ty.name(),
                other.kind(),
                other
            ))),
        }
    }

    /// Returns a value of this type suitable as a placeholder.
    pub fn blank_value(&self) -> Value {
        match self {
            ValueType::Int => Value::Int(0),
            ValueType::Boolean => Value::Bool(false),
            ValueType::String => Value::Str(String::new()),
            ValueType::Double => Value::Double(0.0),
            ValueType::Date => Value::Date(DateTime::UNIX_EPOCH.naive_utc()),
            ValueType::Map => Value::Map(Default::default()),
            ValueType::List | ValueType::ListInts => Value::List(Vec::new()),
            ValueType::Void | ValueType::Any => Value::Null,
            ValueType::StringUrl => Value::Str("http://localhost/".to_string()),
            ValueType::StringIvorn => Value::Str("ivo://localhost/".to_string()),
            ValueType::StringUri => Value::Str("urn:blank".to_string()),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Works out the type of an observed value.
///
/// Concrete types are tried in [`INFERENCE_ORDER`]; the first whose check
/// passes wins.
pub fn infer_type(value: &Value) -> Result<ValueType, TypeError> {
    INFERENCE_ORDER
        .iter()
        .find(|ty| ty.validate(value).is_ok())
        .copied()
        .ok_or_else(|| TypeError::new(format!("can't work out type of {} {}", value.kind(), value)))
}

fn check_uri(value: &Value) -> Result<&str, TypeError> {
    let text = value
        .as_str()
        .ok_or_else(|| TypeError::new(format!("string expected, got {}", value.kind())))?;
    Url::parse(text).map_err(|e| TypeError::new(format!("bad URI '{}': {}", text, e)))?;
    Ok(text)
}

fn check_url(value: &Value) -> Result<(), TypeError> {
    let text = check_uri(value)?;
    if text.starts_with("file:") && !text.starts_with("file://") {
        return Err(TypeError::new(format!(
            "non-compliant file URL '{}' (should be file://host/path)",
            text
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ValueType; 13] = [
        ValueType::Int,
        ValueType::Boolean,
        ValueType::String,
        ValueType::Double,
        ValueType::Date,
        ValueType::Map,
        ValueType::List,
        ValueType::Void,
        ValueType::StringUrl,
        ValueType::StringIvorn,
        ValueType::StringUri,
        ValueType::ListInts,
        ValueType::Any,
    ];

    #[test]
    fn test_blank_values_validate() {
        for ty in ALL {
            assert!(
                ty.validate(&ty.blank_value()).is_ok(),
                "blank value of {} rejected",
                ty
            );
        }
    }

    #[test]
    fn test_int_rejects_string_and_null() {
        assert!(ValueType::Int.validate(&Value::Int(3)).is_ok());
        assert!(ValueType::Int.validate(&Value::from("3")).is_err());
        assert!(ValueType::Int.validate(&Value::Null).is_err());
    }

    #[test]
    fn test_void_leniency() {
        assert!(ValueType::Void.validate(&Value::Null).is_ok());
        assert!(ValueType::Void.validate(&Value::from("")).is_ok());
        assert!(ValueType::Void.validate(&Value::List(vec![])).is_ok());
        assert!(ValueType::Void.validate(&Value::from("x")).is_err());
    }

    #[test]
    fn test_ivorn_requires_prefix() {
        assert!(ValueType::StringIvorn
            .validate(&Value::from("ivo://votech.org/test"))
            .is_ok());
        let err = ValueType::StringIvorn
            .validate(&Value::from("http://votech.org/test"))
            .unwrap_err();
        assert!(err.reason.contains("IVORN"));
    }

    #[test]
    fn test_file_url_must_have_authority() {
        assert!(ValueType::StringUrl
            .validate(&Value::from("file:///data/cat.xml"))
            .is_ok());
        assert!(ValueType::StringUrl
            .validate(&Value::from("file:/data/cat.xml"))
            .is_err());
        assert!(ValueType::StringUrl.validate(&Value::from("not a url")).is_err());
    }

    #[test]
    fn test_list_ints() {
        assert!(ValueType::ListInts
            .validate(&Value::from(vec![1, 2, 3]))
            .is_ok());
        assert!(ValueType::ListInts
            .validate(&Value::List(vec![Value::Int(1), Value::from("2")]))
            .is_err());
    }

    #[test]
    fn test_inference_order() {
        assert_eq!(infer_type(&Value::Int(10)).unwrap(), ValueType::Int);
        assert_eq!(infer_type(&Value::Double(10.0)).unwrap(), ValueType::Double);
        assert_eq!(infer_type(&Value::Bool(true)).unwrap(), ValueType::Boolean);
        assert_eq!(infer_type(&Value::from("abc")).unwrap(), ValueType::String);
        assert_eq!(infer_type(&Value::from(vec![1])).unwrap(), ValueType::List);
        assert_eq!(
            infer_type(&Value::Map(Default::default())).unwrap(),
            ValueType::Map
        );
        assert!(infer_type(&Value::Null).is_err());
        assert!(infer_type(&Value::List(vec![Value::Null])).is_err());
    }
}
