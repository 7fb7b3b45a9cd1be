//! Hub handles that drive a hub over a wire transport
//!
//! [`RemoteHub`] implements every [`HubService`] operation as a single
//! wire call through a [`HubCaller`]. Responses come from another
//! process, so malformed identifiers in them are logged and skipped
//! rather than treated as fatal.

use crate::constants::HUB_METHOD_PREFIX;
use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::listener::{HubService, PlasticListener, ResponseMap};
use crate::value::Value;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;
use url::Url;

/// One wire transport's way of reaching the hub
#[async_trait]
pub trait HubCaller: Send + Sync {
    /// Description of the hub endpoint, for error messages
    fn endpoint(&self) -> String;

    /// Performs wire method `method` and returns its decoded result
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value>;

    /// Registers a callback-capable peer by this transport's own means
    async fn register_listener(
        &self,
        hub: &RemoteHub<Self>,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Identifier>
    where
        Self: Sized;

    /// Releases any local resources held for a peer after it unregisters
    async fn release(&self, _id: &Identifier) {}
}

/// A hub reached through a [`HubCaller`]
pub struct RemoteHub<C> {
    caller: C,
}

impl<C: HubCaller> RemoteHub<C> {
    pub fn with_caller(caller: C) -> Self {
        Self { caller }
    }

    pub fn caller(&self) -> &C {
        &self.caller
    }

    /// Calls hub operation `operation` (without the `plastic.hub.` prefix)
    pub async fn invoke(&self, operation: &str, params: Vec<Value>) -> Result<Value> {
        let method = format!("{}{}", HUB_METHOD_PREFIX, operation);
        self.caller.call(&method, params).await
    }

    /// Decodes a single returned identifier
    pub(crate) fn expect_id(&self, value: Value) -> Result<Identifier> {
        value.as_identifier().ok_or_else(|| {
            PlasticError::transport(
                self.caller.endpoint(),
                format!("hub returned bad identifier {}", value),
            )
        })
    }
}

impl<C> std::fmt::Debug for RemoteHub<C>
where
    C: HubCaller,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteHub")
            .field("endpoint", &self.caller.endpoint())
            .finish()
    }
}

fn id_values(ids: &[Identifier]) -> Value {
    Value::List(ids.iter().map(|id| Value::from(id.to_string())).collect())
}

fn request_params(sender: &Identifier, message: &Identifier, args: &[Value]) -> Vec<Value> {
    vec![
        Value::from(sender.to_string()),
        Value::from(message.to_string()),
        Value::List(args.iter().map(Value::doctored).collect()),
    ]
}

/// Converts a returned list of id strings, skipping bad entries
fn decode_id_list(value: Value) -> Vec<Identifier> {
    match value {
        Value::List(items) => items
            .into_iter()
            .filter_map(|item| {
                let id = item.as_identifier();
                if id.is_none() {
                    warn!("Ignoring bad identifier {} from hub", item);
                }
                id
            })
            .collect(),
        Value::Null => Vec::new(),
        other => {
            warn!("Expected identifier list from hub, got {}", other);
            Vec::new()
        }
    }
}

/// Converts a returned id-keyed map, skipping bad keys
fn decode_response_map(value: Value) -> ResponseMap {
    match value {
        Value::Map(map) => map
            .into_iter()
            .filter_map(|(key, value)| match Identifier::parse(&key) {
                Ok(id) => Some((id, value)),
                Err(_) => {
                    warn!("Ignoring response from bad identifier {}", key);
                    None
                }
            })
            .collect(),
        Value::Null => ResponseMap::new(),
        other => {
            warn!("Expected response map from hub, got {}", other);
            ResponseMap::new()
        }
    }
}

#[async_trait]
impl<C: HubCaller> HubService for RemoteHub<C> {
    async fn get_hub_id(&self) -> Result<Identifier> {
        let value = self.invoke("getHubId", vec![]).await?;
        self.expect_id(value)
    }

    async fn get_registered_ids(&self) -> Result<Vec<Identifier>> {
        Ok(decode_id_list(self.invoke("getRegisteredIds", vec![]).await?))
    }

    async fn get_name(&self, id: &Identifier) -> Result<Option<String>> {
        let value = self
            .invoke("getName", vec![Value::from(id.to_string())])
            .await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn get_understood_messages(&self, id: &Identifier) -> Result<Option<Vec<Identifier>>> {
        let value = self
            .invoke("getUnderstoodMessages", vec![Value::from(id.to_string())])
            .await?;
        Ok(match value {
            Value::Null => None,
            other => Some(decode_id_list(other)),
        })
    }

    async fn get_message_registered_ids(&self, message: &Identifier) -> Result<Vec<Identifier>> {
        let value = self
            .invoke("getMessageRegisteredIds", vec![Value::from(message.to_string())])
            .await?;
        Ok(decode_id_list(value))
    }

    async fn register_xml_rpc(
        &self,
        name: &str,
        messages: &[Identifier],
        callback: &Url,
    ) -> Result<Identifier> {
        let value = self
            .invoke(
                "registerXMLRPC",
                vec![
                    Value::from(name),
                    id_values(messages),
                    Value::from(callback.to_string()),
                ],
            )
            .await?;
        self.expect_id(value)
    }

    async fn register_no_callback(&self, name: &str) -> Result<Identifier> {
        let value = self
            .invoke("registerNoCallBack", vec![Value::from(name)])
            .await?;
        self.expect_id(value)
    }

    async fn register_listener(
        &self,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Identifier> {
        self.caller
            .register_listener(self, name, messages, listener)
            .await
    }

    async fn unregister(&self, id: &Identifier) -> Result<()> {
        let outcome = self
            .invoke("unregister", vec![Value::from(id.to_string())])
            .await;
        self.caller.release(id).await;
        outcome.map(|_| ())
    }

    async fn request(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<ResponseMap> {
        let value = self
            .invoke("request", request_params(sender, message, args))
            .await?;
        Ok(decode_response_map(value))
    }

    async fn request_asynch(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<()> {
        self.invoke("requestAsynch", request_params(sender, message, args))
            .await
            .map(|_| ())
    }

    async fn request_to_subset(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) -> Result<ResponseMap> {
        let mut params = request_params(sender, message, args);
        params.push(id_values(recipients));
        let value = self.invoke("requestToSubset", params).await?;
        Ok(decode_response_map(value))
    }

    async fn request_to_subset_asynch(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) -> Result<()> {
        let mut params = request_params(sender, message, args);
        params.push(id_values(recipients));
        self.invoke("requestToSubsetAsynch", params)
            .await
            .map(|_| ())
    }
}
