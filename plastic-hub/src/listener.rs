//! The two interfaces of the PLASTIC protocol
//!
//! [`PlasticListener`] is what an application implements to receive
//! messages. [`HubService`] is what a hub offers to applications, whether
//! it lives in the same process or is reached over a wire transport.

use crate::error::Result;
use crate::identifier::Identifier;
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

/// Responses of a synchronous fan-out, keyed by responding peer
pub type ResponseMap = HashMap<Identifier, Value>;

/// Receiving side of an application
#[async_trait]
pub trait PlasticListener: Send + Sync {
    /// Handles one message.
    ///
    /// # Arguments
    /// * `sender` - Id of the sending peer
    /// * `message` - Id of the message
    /// * `args` - Message arguments
    ///
    /// # Returns
    /// The response value; [`Value::Null`] when there is nothing to say
    async fn perform(&self, sender: &Identifier, message: &Identifier, args: &[Value])
        -> Result<Value>;
}

/// The operations a hub offers to applications
#[async_trait]
pub trait HubService: Send + Sync {
    /// Id of the hub's own identity agent
    async fn get_hub_id(&self) -> Result<Identifier>;

    async fn get_registered_ids(&self) -> Result<Vec<Identifier>>;

    /// Registered name of a peer, `None` if unknown
    async fn get_name(&self, id: &Identifier) -> Result<Option<String>>;

    /// Declared interest of a peer, `None` if unknown
    async fn get_understood_messages(&self, id: &Identifier) -> Result<Option<Vec<Identifier>>>;

    /// Peers that would receive `message` in a broadcast
    async fn get_message_registered_ids(&self, message: &Identifier) -> Result<Vec<Identifier>>;

    /// Registers a peer that receives messages at an HTTP-RPC callback URL
    async fn register_xml_rpc(
        &self,
        name: &str,
        messages: &[Identifier],
        callback: &Url,
    ) -> Result<Identifier>;

    /// Registers a send-only peer
    async fn register_no_callback(&self, name: &str) -> Result<Identifier>;

    /// Registers a peer served by `listener` in this process.
    ///
    /// How the callback reaches the listener depends on how this handle
    /// talks to the hub.
    async fn register_listener(
        &self,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Identifier>;

    /// Removes a peer. Unknown ids are ignored.
    async fn unregister(&self, id: &Identifier) -> Result<()>;

    /// Sends to every other interested peer and waits for all responses
    async fn request(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<ResponseMap>;

    /// Sends to every other interested peer without waiting
    async fn request_asynch(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<()>;

    /// Sends to the named peers and waits for all responses
    async fn request_to_subset(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) -> Result<ResponseMap>;

    /// Sends to the named peers without waiting
    async fn request_to_subset_asynch(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
        recipients: &[Identifier],
    ) -> Result<()>;
}

type Handler = Arc<
    dyn Fn(Identifier, Identifier, Vec<Value>) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>>
        + Send
        + Sync,
>;

/// A listener defined by an async closure
#[derive(Clone)]
pub struct FnListener {
    handler: Handler,
}

impl FnListener {
    pub fn new<F, Fut>(handler: F) -> Self
    where
        F: Fn(Identifier, Identifier, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            handler: Arc::new(move |sender, message, args| Box::pin(handler(sender, message, args))),
        }
    }
}

#[async_trait]
impl PlasticListener for FnListener {
    async fn perform(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<Value> {
        (self.handler)(sender.clone(), message.clone(), args.to_vec()).await
    }
}

impl std::fmt::Debug for FnListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnListener").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fn_listener() {
        let listener = FnListener::new(|_sender, _message, args: Vec<Value>| async move {
            Ok(Value::Int(args.len() as i32))
        });
        let sender = Identifier::parse("plastic://hub/1-1-a").unwrap();
        let message = Identifier::parse("ivo://example.org/count").unwrap();
        let out = listener
            .perform(&sender, &message, &[Value::Null, Value::Null])
            .await
            .unwrap();
        assert_eq!(out, Value::Int(2));
    }
}
