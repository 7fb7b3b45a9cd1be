//! Client-side HTTP server receiving message deliveries
//!
//! The hub calls back with an XML-RPC `perform(sender, message, args)`.
//! The method name is not checked, so hubs that use another name for the
//! callback still get through.

use super::codec::{self, MethodCall};
use super::xml_response;
use crate::error::{PlasticError, Result};
use crate::listener::PlasticListener;
use crate::servers::{bind_first, http_url};
use crate::value::Value;
use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

/// A running callback endpoint for one listener
pub struct CallbackServer {
    url: Url,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Starts serving `listener` on the first free port from `start_port`
    pub async fn start(
        listener: Arc<dyn PlasticListener>,
        bind: IpAddr,
        start_port: u16,
        attempts: u16,
    ) -> Result<Self> {
        let tcp = bind_first(bind, start_port, attempts, "HTTP-RPC callback").await?;
        let url = http_url(tcp.local_addr()?)?;
        let shutdown = CancellationToken::new();
        let app = Router::new()
            .route("/", post(handle_perform))
            .with_state(listener);
        let token = shutdown.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(tcp, app)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                warn!("Callback server failed: {}", e);
            }
        });
        debug!("Callback server listening at {}", url);
        Ok(Self {
            url,
            shutdown,
            task: Some(task),
        })
    }

    /// URL to register with the hub
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stops the server and waits for it to finish
    pub async fn stop(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for CallbackServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackServer").field("url", &self.url).finish()
    }
}

async fn handle_perform(
    State(listener): State<Arc<dyn PlasticListener>>,
    body: String,
) -> Response {
    let outcome = match MethodCall::from_xml(&body) {
        Ok(call) => deliver(listener.as_ref(), &call.method_name, call.params).await,
        Err(e) => Err(e),
    };
    xml_response(codec::encode_response(outcome))
}

async fn deliver(
    listener: &dyn PlasticListener,
    method: &str,
    params: Vec<Value>,
) -> Result<Value> {
    let mut params = params.into_iter();
    let sender = params.next().and_then(|v| v.as_identifier());
    let message = params.next().and_then(|v| v.as_identifier());
    let args = match params.next() {
        Some(Value::List(args)) => Some(args),
        Some(Value::Null) | None => Some(Vec::new()),
        Some(_) => None,
    };
    match (sender, message, args) {
        (Some(sender), Some(message), Some(args)) => {
            listener.perform(&sender, &message, &args).await
        }
        _ => Err(PlasticError::bad_argument(
            method,
            "expected sender id, message id and argument list",
        )),
    }
}
