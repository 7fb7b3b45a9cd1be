//! JSON encoding of values for the object protocol
//!
//! XML-RPC scalars map onto JSON scalars, and the XML-RPC
//! `dateTime.iso8601` type is kept as a one-entry object so that dates
//! survive the trip. Every value is [doctored](Value::doctored) before
//! encoding. The HTTP-RPC transport speaks XML-RPC proper; see
//! [`crate::xmlrpc::codec`].

use crate::error::{PlasticError, Result};
use crate::value::Value;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number};
use std::collections::BTreeMap;

/// Object key marking an encoded date
pub const DATE_TAG: &str = "dateTime.iso8601";

/// XML-RPC date format
pub const DATE_FORMAT: &str = "%Y%m%dT%H:%M:%S";

/// Fault payload, following XML-RPC's faultCode/faultString pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFault {
    #[serde(rename = "faultCode")]
    pub fault_code: i32,
    #[serde(rename = "faultString")]
    pub fault_string: String,
}

/// A method response envelope: exactly one of `result` or `fault`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<WireFault>,
}

impl WireResponse {
    pub fn success(value: &Value) -> Result<Self> {
        Ok(Self {
            result: Some(to_wire(value)?),
            fault: None,
        })
    }

    pub fn from_error(err: &PlasticError) -> Self {
        Self {
            result: None,
            fault: Some(WireFault {
                fault_code: err.fault_code(),
                fault_string: err.to_string(),
            }),
        }
    }

    /// The success envelope for `outcome`, or a fault if it failed or
    /// cannot be encoded
    pub fn from_outcome(outcome: Result<Value>) -> Self {
        match outcome.and_then(|value| Self::success(&value)) {
            Ok(response) => response,
            Err(e) => Self::from_error(&e),
        }
    }

    /// Turns the envelope into a native result; a fault becomes
    /// [`PlasticError::Remote`].
    pub fn into_result(self) -> Result<Value> {
        if let Some(fault) = self.fault {
            return Err(PlasticError::Remote(fault.fault_string));
        }
        match self.result {
            Some(json) => from_wire(&json),
            None => Ok(Value::Null),
        }
    }
}

/// Encodes a native value as wire JSON, doctoring on the way.
///
/// NaN and the infinities have no JSON form and are refused.
pub fn to_wire(value: &Value) -> Result<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number((*i).into()),
        Value::Double(d) => serde_json::Value::Number(Number::from_f64(*d).ok_or_else(|| {
            PlasticError::Encoding(format!("JSON has no representation for double {}", d))
        })?),
        Value::Str(s) => serde_json::Value::String(s.clone()),
        Value::Uri(id) => serde_json::Value::String(id.to_string()),
        Value::Date(d) => {
            let mut obj = Map::new();
            obj.insert(
                DATE_TAG.to_string(),
                serde_json::Value::String(d.format(DATE_FORMAT).to_string()),
            );
            serde_json::Value::Object(obj)
        }
        Value::List(items) => {
            serde_json::Value::Array(items.iter().map(to_wire).collect::<Result<_>>()?)
        }
        Value::Map(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), to_wire(v)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

/// Decodes wire JSON into a native value
pub fn from_wire(json: &serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
                Some(i) if !n.is_f64() => Value::Int(i),
                _ => Value::Double(n.as_f64().ok_or_else(|| {
                    PlasticError::transport("wire", format!("unrepresentable number {}", n))
                })?),
            }
        }
        serde_json::Value::String(s) => Value::Str(s.clone()),
        serde_json::Value::Array(items) => {
            Value::List(items.iter().map(from_wire).collect::<Result<Vec<_>>>()?)
        }
        serde_json::Value::Object(obj) => {
            if obj.len() == 1 {
                if let Some(serde_json::Value::String(text)) = obj.get(DATE_TAG) {
                    let date = NaiveDateTime::parse_from_str(text, DATE_FORMAT).map_err(|e| {
                        PlasticError::transport("wire", format!("bad date '{}': {}", text, e))
                    })?;
                    return Ok(Value::Date(date));
                }
            }
            let mut map = BTreeMap::new();
            for (k, v) in obj {
                map.insert(k.clone(), from_wire(v)?);
            }
            Value::Map(map)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::Identifier;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_int_and_double_stay_distinct() {
        assert_eq!(from_wire(&json!(10)).unwrap(), Value::Int(10));
        assert_eq!(from_wire(&json!(10.0)).unwrap(), Value::Double(10.0));
        assert_eq!(from_wire(&json!(1u64 << 40)).unwrap(), Value::Double((1u64 << 40) as f64));
    }

    #[test]
    fn test_dates_survive() {
        let date = NaiveDate::from_ymd_opt(2006, 7, 18)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let wire = to_wire(&Value::Date(date)).unwrap();
        assert_eq!(wire, json!({"dateTime.iso8601": "20060718T10:30:00"}));
        assert_eq!(from_wire(&wire).unwrap(), Value::Date(date));
    }

    #[test]
    fn test_uris_are_sent_as_strings() {
        let id = Identifier::parse("ivo://votech.org/test/echo").unwrap();
        let wire = to_wire(&Value::List(vec![Value::Uri(id)])).unwrap();
        assert_eq!(wire, json!(["ivo://votech.org/test/echo"]));
    }

    #[test]
    fn test_fault_becomes_remote_error() {
        let response = WireResponse::from_error(&PlasticError::Unsupported("nope".into()));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["fault"]["faultCode"], json!(1));
        let err = response.into_result().unwrap_err();
        assert!(matches!(err, PlasticError::Remote(_)));
    }

    #[test]
    fn test_non_finite_double_is_refused() {
        let nested = Value::List(vec![Value::Int(1), Value::Double(f64::NAN)]);
        assert!(matches!(to_wire(&nested), Err(PlasticError::Encoding(_))));

        let response = WireResponse::from_outcome(Ok(Value::Double(f64::INFINITY)));
        assert!(response.result.is_none());
        assert_eq!(response.fault.unwrap().fault_code, 2);
    }
}
