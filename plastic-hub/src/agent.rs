//! Registered peers
//!
//! An [`Agent`] is the hub's record of one registered application: its
//! identity, the messages it declared interest in and the means of
//! reaching it. Agents are created once at registration and never change.

use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::listener::PlasticListener;
use crate::object::RemoteCallback;
use crate::value::Value;
use crate::xmlrpc::client::post_call;
use crate::xmlrpc::MethodCall;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// Wire method invoked on HTTP-RPC callback endpoints
pub const CALLBACK_METHOD: &str = "perform";

/// How the hub reaches a peer
#[derive(Clone)]
pub enum Transport {
    /// Listener living in the hub's own process
    Direct(Arc<dyn PlasticListener>),
    /// Listener behind an object protocol connection
    Remote(RemoteCallback),
    /// Listener behind an HTTP-RPC callback URL
    XmlRpc { url: Url, client: reqwest::Client },
    /// Send-only peer
    NoCallBack,
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Direct(_) => f.write_str("Direct"),
            Transport::Remote(cb) => f.debug_tuple("Remote").field(cb).finish(),
            Transport::XmlRpc { url, .. } => f.debug_struct("XmlRpc").field("url", url).finish(),
            Transport::NoCallBack => f.write_str("NoCallBack"),
        }
    }
}

/// A registered peer
#[derive(Debug)]
pub struct Agent {
    id: Identifier,
    name: String,
    interest: Vec<Identifier>,
    transport: Transport,
}

impl Agent {
    pub fn new(id: Identifier, name: String, interest: Vec<Identifier>, transport: Transport) -> Self {
        Self {
            id,
            name,
            interest,
            transport,
        }
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared interest; empty means every message
    pub fn interest(&self) -> &[Identifier] {
        &self.interest
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Whether the hub should deliver `message` to this peer.
    ///
    /// An empty interest set matches everything, as peers written for
    /// protocol versions before 0.5 expect. Send-only peers match nothing.
    pub fn supports_message(&self, message: &Identifier) -> bool {
        match self.transport {
            Transport::NoCallBack => false,
            _ => self.interest.is_empty() || self.interest.contains(message),
        }
    }

    /// Human readable summary of the transport
    pub fn connection_description(&self) -> String {
        match &self.transport {
            Transport::Direct(_) => "direct in-process".to_string(),
            Transport::Remote(cb) => cb.describe(),
            Transport::XmlRpc { url, .. } => format!("HTTP-RPC {}", url),
            Transport::NoCallBack => "no callback".to_string(),
        }
    }

    /// Delivers one message and waits for the response.
    ///
    /// Failures of remote transports come back as
    /// [`PlasticError::Transport`]; a direct listener's own error is passed
    /// through unchanged.
    pub async fn request(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<Value> {
        match &self.transport {
            Transport::Direct(listener) => listener.perform(sender, message, args).await,
            Transport::Remote(cb) => cb
                .perform(sender, message, args)
                .await
                .map_err(|e| self.wrap(e)),
            Transport::XmlRpc { url, client } => {
                let call = MethodCall::new(
                    CALLBACK_METHOD,
                    vec![
                        Value::Uri(sender.clone()),
                        Value::Uri(message.clone()),
                        Value::List(args.to_vec()),
                    ],
                );
                post_call(client, url, call).await.map_err(|e| self.wrap(e))
            }
            Transport::NoCallBack => Err(PlasticError::Unsupported(format!(
                "{} registered without a callback",
                self
            ))),
        }
    }

    /// Delivers one message on a detached task, discarding the outcome.
    /// Without a Tokio runtime to spawn on, the message is dropped.
    pub fn request_asynch(self: &Arc<Self>, sender: &Identifier, message: &Identifier, args: &[Value]) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime; dropping {} to {}", message, self);
            return;
        };
        let agent = self.clone();
        let sender = sender.clone();
        let message = message.clone();
        let args = args.to_vec();
        runtime.spawn(async move {
            if let Err(e) = agent.request(&sender, &message, &args).await {
                debug!("Asynch {} to {} failed: {}", message, agent, e);
            }
        });
    }

    fn wrap(&self, err: PlasticError) -> PlasticError {
        match err {
            e @ PlasticError::Transport { .. } => e,
            other => PlasticError::transport(self.connection_description(), other),
        }
    }
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FnListener;

    fn id(text: &str) -> Identifier {
        Identifier::parse(text).unwrap()
    }

    fn direct(interest: Vec<Identifier>) -> Agent {
        Agent::new(
            id("plastic://hub/1-1-calc"),
            "calc".into(),
            interest,
            Transport::Direct(Arc::new(FnListener::new(|_, _, args: Vec<Value>| async move {
                Ok(args.into_iter().next().unwrap_or(Value::Null))
            }))),
        )
    }

    #[test]
    fn test_supports_message() {
        let calc = id("ivo://example.org/calc");
        let other = id("ivo://example.org/other");

        let wildcard = direct(vec![]);
        assert!(wildcard.supports_message(&calc));
        assert!(wildcard.supports_message(&other));

        let picky = direct(vec![calc.clone()]);
        assert!(picky.supports_message(&calc));
        assert!(!picky.supports_message(&other));

        let silent = Agent::new(id("plastic://hub/1-2-x"), "x".into(), vec![], Transport::NoCallBack);
        assert!(!silent.supports_message(&calc));
    }

    #[tokio::test]
    async fn test_direct_request() {
        let agent = direct(vec![]);
        let out = agent
            .request(&id("plastic://hub/1-0-hub"), &id("ivo://example.org/calc"), &[Value::Int(5)])
            .await
            .unwrap();
        assert_eq!(out, Value::Int(5));
        assert_eq!(agent.connection_description(), "direct in-process");
    }

    #[tokio::test]
    async fn test_no_callback_request_fails() {
        let agent = Agent::new(id("plastic://hub/1-2-x"), "x".into(), vec![], Transport::NoCallBack);
        let err = agent
            .request(&id("plastic://hub/1-0-hub"), &id("ivo://example.org/calc"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PlasticError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_unreachable_callback_is_transport_error() {
        let agent = Agent::new(
            id("plastic://hub/1-3-y"),
            "y".into(),
            vec![],
            Transport::XmlRpc {
                url: Url::parse("http://127.0.0.1:1/").unwrap(),
                client: reqwest::Client::new(),
            },
        );
        let err = agent
            .request(&id("plastic://hub/1-0-hub"), &id("ivo://example.org/calc"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, PlasticError::Transport { .. }));
    }
}
