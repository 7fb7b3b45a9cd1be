//! Wire method table shared by both hub servers
//!
//! Each hub operation is exposed under `plastic.hub.<operation>`.
//! Arguments arrive positionally as wire values and are converted to
//! native types here; results are converted back the same way.

use crate::constants::HUB_METHOD_PREFIX;
use crate::error::{PlasticError, Result};
use crate::hub::PlasticHub;
use crate::identifier::Identifier;
use crate::listener::ResponseMap;
use crate::object::{Connection, RemoteCallback};
use crate::value::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use url::Url;

/// Which server a call came in on
#[derive(Debug, Clone)]
pub enum CallOrigin {
    Http,
    Object(Arc<Connection>),
}

/// Runs wire method `method` against `hub`.
///
/// Unknown method names fail with [`PlasticError::Unsupported`].
pub async fn dispatch(
    hub: &PlasticHub,
    method: &str,
    params: Vec<Value>,
    origin: &CallOrigin,
) -> Result<Value> {
    let operation = method.strip_prefix(HUB_METHOD_PREFIX).ok_or_else(|| {
        PlasticError::Unsupported(format!("No method {} on hub", method))
    })?;
    let mut params = Params::new(method, params);

    let result = match operation {
        "getHubId" => Value::from(hub.hub_id().to_string()),
        "getRegisteredIds" => id_list(&hub.get_registered_ids()),
        "getName" => {
            let id = params.identifier()?;
            hub.get_name(&id).map(Value::from).unwrap_or(Value::Null)
        }
        "getUnderstoodMessages" => {
            let id = params.identifier()?;
            hub.get_understood_messages(&id)
                .map(|msgs| id_list(&msgs))
                .unwrap_or(Value::Null)
        }
        "getMessageRegisteredIds" => {
            let message = params.identifier()?;
            id_list(&hub.get_message_registered_ids(&message))
        }
        "registerXMLRPC" => {
            let name = params.string()?;
            let messages = params.identifier_list()?;
            let url = params.url()?;
            Value::from(hub.register_xml_rpc(&name, &messages, url)?.to_string())
        }
        "registerRMI" => match origin {
            CallOrigin::Object(conn) => {
                let name = params.string()?;
                let messages = params.identifier_list()?;
                let key = params.key()?;
                let callback = RemoteCallback::new(conn.clone(), key);
                Value::from(hub.register_remote(&name, &messages, callback)?.to_string())
            }
            CallOrigin::Http => {
                return Err(PlasticError::Unsupported(
                    "registerRMI needs an object protocol connection to call back on; use registerXMLRPC"
                        .to_string(),
                ))
            }
        },
        "registerNoCallBack" => {
            let name = params.string()?;
            Value::from(hub.register_no_callback(&name)?.to_string())
        }
        "registerPolling" | "pollForMessages" => {
            return Err(PlasticError::Unsupported("Polling not supported".to_string()))
        }
        "unregister" => {
            let id = params.identifier()?;
            hub.unregister(&id);
            Value::Null
        }
        "request" => {
            let (sender, message, args) = params.request()?;
            response_map(hub.request(&sender, &message, &args).await)
        }
        "requestAsynch" => {
            let (sender, message, args) = params.request()?;
            hub.request_asynch(&sender, &message, &args);
            Value::Null
        }
        "requestToSubset" => {
            let (sender, message, args) = params.request()?;
            let recipients = params.identifier_list()?;
            response_map(
                hub.request_to_subset(&sender, &message, &args, &recipients)
                    .await,
            )
        }
        "requestToSubsetAsynch" => {
            let (sender, message, args) = params.request()?;
            let recipients = params.identifier_list()?;
            hub.request_to_subset_asynch(&sender, &message, &args, &recipients);
            Value::Null
        }
        _ => {
            return Err(PlasticError::Unsupported(format!(
                "No method {} on hub",
                method
            )))
        }
    };
    Ok(result.doctored())
}

/// Positional argument reader for one wire call
struct Params<'a> {
    method: &'a str,
    items: VecDeque<Value>,
}

impl<'a> Params<'a> {
    fn new(method: &'a str, items: Vec<Value>) -> Self {
        Self {
            method,
            items: items.into(),
        }
    }

    fn next(&mut self, what: &str) -> Result<Value> {
        self.items
            .pop_front()
            .ok_or_else(|| PlasticError::bad_argument(self.method, format!("missing {}", what)))
    }

    fn string(&mut self) -> Result<String> {
        match self.next("string")? {
            Value::Str(s) => Ok(s),
            Value::Uri(id) => Ok(id.to_string()),
            other => Err(self.wrong("string", &other)),
        }
    }

    fn identifier(&mut self) -> Result<Identifier> {
        let value = self.next("identifier")?;
        value
            .as_identifier()
            .ok_or_else(|| self.wrong("identifier", &value))
    }

    fn list(&mut self) -> Result<Vec<Value>> {
        match self.next("list")? {
            Value::List(items) => Ok(items),
            other => Err(self.wrong("list", &other)),
        }
    }

    fn identifier_list(&mut self) -> Result<Vec<Identifier>> {
        let items = self.list()?;
        items
            .iter()
            .map(|item| item.as_identifier().ok_or_else(|| self.wrong("identifier", item)))
            .collect()
    }

    fn url(&mut self) -> Result<Url> {
        let text = self.string()?;
        Url::parse(&text)
            .map_err(|e| PlasticError::bad_argument(self.method, format!("bad URL {}: {}", text, e)))
    }

    fn key(&mut self) -> Result<u64> {
        match self.next("listener key")? {
            Value::Int(i) if i >= 0 => Ok(i as u64),
            other => Err(self.wrong("listener key", &other)),
        }
    }

    fn request(&mut self) -> Result<(Identifier, Identifier, Vec<Value>)> {
        Ok((self.identifier()?, self.identifier()?, self.list()?))
    }

    fn wrong(&self, expected: &str, got: &Value) -> PlasticError {
        PlasticError::bad_argument(
            self.method,
            format!("expected {}, got {} {}", expected, got.kind(), got),
        )
    }
}

fn id_list(ids: &[Identifier]) -> Value {
    Value::List(ids.iter().map(|id| Value::from(id.to_string())).collect())
}

fn response_map(results: ResponseMap) -> Value {
    Value::Map(
        results
            .into_iter()
            .map(|(id, value)| (id.to_string(), value))
            .collect::<BTreeMap<_, _>>(),
    )
}
