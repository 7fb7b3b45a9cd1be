//! XML-RPC documents
//!
//! Reads and writes `methodCall` and `methodResponse` bodies. Native values
//! map onto the XML-RPC types as follows:
//!
//! | [`Value`]         | XML-RPC                          |
//! |-------------------|----------------------------------|
//! | `Null`            | `<nil/>`                         |
//! | `Bool`            | `<boolean>`                      |
//! | `Int`             | `<int>` (`<i4>` also read)       |
//! | `Double`          | `<double>`, finite values only   |
//! | `Str`, `Uri`      | `<string>` (untyped also read)   |
//! | `Date`            | `<dateTime.iso8601>`             |
//! | `List`            | `<array>`                        |
//! | `Map`             | `<struct>`                       |

use crate::error::{PlasticError, Result};
use crate::value::Value;
use crate::wire::DATE_FORMAT;
use chrono::NaiveDateTime;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

/// Media type of XML-RPC request and response bodies
pub const CONTENT_TYPE: &str = "text/xml";

const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// A decoded `methodCall`
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCall {
    pub method_name: String,
    pub params: Vec<Value>,
}

impl MethodCall {
    pub fn new<S: Into<String>>(method_name: S, params: Vec<Value>) -> Self {
        Self {
            method_name: method_name.into(),
            params,
        }
    }

    pub fn to_xml(&self) -> Result<String> {
        let mut out = String::from(DECLARATION);
        out.push_str("<methodCall><methodName>");
        out.push_str(&escape(self.method_name.as_str()));
        out.push_str("</methodName><params>");
        for param in &self.params {
            out.push_str("<param>");
            write_value(&mut out, param)?;
            out.push_str("</param>");
        }
        out.push_str("</params></methodCall>");
        Ok(out)
    }

    pub fn from_xml(body: &str) -> Result<Self> {
        let root = parse_document(body)?;
        root.expect_name("methodCall")?;
        let method_name = root.child("methodName")?.text.trim().to_string();
        if method_name.is_empty() {
            return Err(malformed("empty methodName"));
        }
        let params = match root.find("params") {
            Some(params) => read_params(params)?,
            None => Vec::new(),
        };
        Ok(Self {
            method_name,
            params,
        })
    }
}

/// Encodes the outcome of a call as a `methodResponse`.
///
/// A result that cannot be encoded is reported to the caller as a fault.
pub fn encode_response(outcome: Result<Value>) -> String {
    let encoded = outcome.and_then(|value| {
        let mut out = String::from(DECLARATION);
        out.push_str("<methodResponse><params><param>");
        write_value(&mut out, &value)?;
        out.push_str("</param></params></methodResponse>");
        Ok(out)
    });
    match encoded {
        Ok(body) => body,
        Err(e) => encode_fault(&e),
    }
}

/// Encodes `err` as a `fault` response
pub fn encode_fault(err: &PlasticError) -> String {
    let mut fault = BTreeMap::new();
    fault.insert("faultCode".to_string(), Value::Int(err.fault_code()));
    fault.insert("faultString".to_string(), Value::Str(err.to_string()));
    let mut out = String::from(DECLARATION);
    out.push_str("<methodResponse><fault>");
    // a map of an int and a string always encodes
    let _ = write_value(&mut out, &Value::Map(fault));
    out.push_str("</fault></methodResponse>");
    out
}

/// Decodes a `methodResponse`; a fault becomes [`PlasticError::Remote`]
pub fn decode_response(body: &str) -> Result<Value> {
    let root = parse_document(body)?;
    root.expect_name("methodResponse")?;
    if let Some(fault) = root.find("fault") {
        let detail = read_value(fault.child("value")?)?;
        let text = match &detail {
            Value::Map(map) => map
                .get("faultString")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| detail.to_string()),
            other => other.to_string(),
        };
        return Err(PlasticError::Remote(text));
    }
    match root.find("params") {
        Some(params) => Ok(read_params(params)?.into_iter().next().unwrap_or(Value::Null)),
        None => Ok(Value::Null),
    }
}

fn write_value(out: &mut String, value: &Value) -> Result<()> {
    out.push_str("<value>");
    match value {
        Value::Null => out.push_str("<nil/>"),
        Value::Bool(b) => {
            out.push_str(if *b { "<boolean>1</boolean>" } else { "<boolean>0</boolean>" })
        }
        Value::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
        Value::Double(d) => {
            if !d.is_finite() {
                return Err(PlasticError::Encoding(format!(
                    "XML-RPC has no representation for double {}",
                    d
                )));
            }
            out.push_str(&format!("<double>{}</double>", d));
        }
        Value::Str(s) => push_string(out, s),
        Value::Uri(id) => push_string(out, id.as_str()),
        Value::Date(d) => out.push_str(&format!(
            "<dateTime.iso8601>{}</dateTime.iso8601>",
            d.format(DATE_FORMAT)
        )),
        Value::List(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(out, item)?;
            }
            out.push_str("</data></array>");
        }
        Value::Map(map) => {
            out.push_str("<struct>");
            for (name, item) in map {
                out.push_str("<member><name>");
                out.push_str(&escape(name.as_str()));
                out.push_str("</name>");
                write_value(out, item)?;
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
    Ok(())
}

fn push_string(out: &mut String, text: &str) {
    out.push_str("<string>");
    out.push_str(&escape(text));
    out.push_str("</string>");
}

fn read_params(params: &Element) -> Result<Vec<Value>> {
    params
        .children_named("param")
        .map(|param| read_value(param.child("value")?))
        .collect()
}

fn read_value(value: &Element) -> Result<Value> {
    value.expect_name("value")?;
    let Some(typed) = value.children.first() else {
        return Ok(Value::Str(value.text.clone()));
    };
    let text = typed.text.as_str();
    Ok(match typed.name.as_str() {
        "int" | "i4" => Value::Int(parse_number(text, "int")?),
        "i8" => {
            let wide: i64 = parse_number(text, "i8")?;
            i32::try_from(wide).map_or(Value::Double(wide as f64), Value::Int)
        }
        "boolean" => match text.trim() {
            "1" | "true" => Value::Bool(true),
            "0" | "false" => Value::Bool(false),
            other => return Err(malformed(format!("bad boolean '{}'", other))),
        },
        "double" => Value::Double(parse_number(text, "double")?),
        "string" => Value::Str(text.to_string()),
        "dateTime.iso8601" => {
            let trimmed = text.trim();
            let date = NaiveDateTime::parse_from_str(trimmed, DATE_FORMAT)
                .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S"))
                .map_err(|e| malformed(format!("bad date '{}': {}", trimmed, e)))?;
            Value::Date(date)
        }
        "nil" => Value::Null,
        "array" => Value::List(
            typed
                .child("data")?
                .children_named("value")
                .map(read_value)
                .collect::<Result<_>>()?,
        ),
        "struct" => {
            let mut map = BTreeMap::new();
            for member in typed.children_named("member") {
                let name = member.child("name")?.text.clone();
                map.insert(name, read_value(member.child("value")?)?);
            }
            Value::Map(map)
        }
        other => return Err(malformed(format!("unsupported value type <{}>", other))),
    })
}

fn parse_number<T: std::str::FromStr>(text: &str, kind: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| malformed(format!("bad {} '{}': {}", kind, text.trim(), e)))
}

fn malformed<S: Into<String>>(reason: S) -> PlasticError {
    PlasticError::transport("XML-RPC document", reason.into())
}

/// Element tree of a parsed document. Text is kept only for leaves; the
/// whitespace between child elements is of no interest.
#[derive(Debug)]
struct Element {
    name: String,
    children: Vec<Element>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self> {
        let name = std::str::from_utf8(start.local_name().as_ref())
            .map_err(|e| malformed(e.to_string()))?
            .to_string();
        Ok(Self {
            name,
            children: Vec::new(),
            text: String::new(),
        })
    }

    fn expect_name(&self, name: &str) -> Result<()> {
        if self.name == name {
            Ok(())
        } else {
            Err(malformed(format!("expected <{}>, found <{}>", name, self.name)))
        }
    }

    fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    fn child(&self, name: &str) -> Result<&Element> {
        self.find(name)
            .ok_or_else(|| malformed(format!("<{}> has no <{}>", self.name, name)))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn parse_document(body: &str) -> Result<Element> {
    let mut reader = Reader::from_str(body);
    let mut open: Vec<Element> = Vec::new();
    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(format!("at byte {}: {}", reader.buffer_position(), e)))?;
        match event {
            Event::Start(start) => open.push(Element::open(&start)?),
            Event::Empty(start) => {
                let element = Element::open(&start)?;
                match open.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let element = open
                    .pop()
                    .ok_or_else(|| malformed("unbalanced end tag"))?;
                match open.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Text(text) => {
                if let Some(current) = open.last_mut() {
                    let text = text.unescape().map_err(|e| malformed(e.to_string()))?;
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = open.last_mut() {
                    let text = std::str::from_utf8(&data).map_err(|e| malformed(e.to_string()))?;
                    current.text.push_str(text);
                }
            }
            Event::Eof => return Err(malformed("document ends before its root element")),
            _ => {}
        }
    }
}
