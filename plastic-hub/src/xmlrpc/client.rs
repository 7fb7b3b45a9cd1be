use super::callback::CallbackServer;
use super::codec::{self, MethodCall};
use crate::config::{DEFAULT_CALLBACK_PORT, DEFAULT_PORT_ATTEMPTS};
use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::listener::{HubService, PlasticListener};
use crate::remote::{HubCaller, RemoteHub};
use crate::value::Value;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

/// HTTP-RPC side of a [`RemoteHub`]
///
/// Listeners registered through it are served by a [`CallbackServer`]
/// started on demand, one per registration.
pub struct HttpCaller {
    url: Url,
    client: reqwest::Client,
    callback_bind: IpAddr,
    callback_port: u16,
    callback_attempts: u16,
    callbacks: Mutex<HashMap<Identifier, CallbackServer>>,
}

impl HttpCaller {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
            callback_bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            callback_port: DEFAULT_CALLBACK_PORT,
            callback_attempts: DEFAULT_PORT_ATTEMPTS,
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Sets the first port tried for callback servers; 0 lets the OS choose
    pub fn with_callback_port(mut self, port: u16) -> Self {
        self.callback_port = port;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl HubCaller for HttpCaller {
    fn endpoint(&self) -> String {
        format!("HTTP-RPC {}", self.url)
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        post_call(&self.client, &self.url, MethodCall::new(method, params)).await
    }

    /// Starts a callback server and registers its URL with `registerXMLRPC`
    async fn register_listener(
        &self,
        hub: &RemoteHub<Self>,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Identifier> {
        let server = CallbackServer::start(
            listener,
            self.callback_bind,
            self.callback_port,
            self.callback_attempts,
        )
        .await?;
        match hub.register_xml_rpc(name, messages, server.url()).await {
            Ok(id) => {
                self.callbacks.lock().await.insert(id.clone(), server);
                Ok(id)
            }
            Err(e) => {
                server.stop().await;
                Err(e)
            }
        }
    }

    async fn release(&self, id: &Identifier) {
        let server = self.callbacks.lock().await.remove(id);
        if let Some(server) = server {
            server.stop().await;
        }
    }
}

/// POSTs one XML-RPC call to `url` and decodes the response.
///
/// HTTP and document failures are transport errors; a fault returned by the
/// far end is [`PlasticError::Remote`].
pub(crate) async fn post_call(
    client: &reqwest::Client,
    url: &Url,
    call: MethodCall,
) -> Result<Value> {
    let body = call.to_xml()?;
    let text = client
        .post(url.clone())
        .header(reqwest::header::CONTENT_TYPE, codec::CONTENT_TYPE)
        .body(body)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| PlasticError::transport(url.to_string(), e))?
        .text()
        .await
        .map_err(|e| PlasticError::transport(url.to_string(), e))?;
    codec::decode_response(&text).map_err(|e| match e {
        PlasticError::Transport { reason, .. } => PlasticError::transport(url.to_string(), reason),
        other => other,
    })
}

/// A hub reached over HTTP-RPC
pub type XmlRpcHub = RemoteHub<HttpCaller>;

impl RemoteHub<HttpCaller> {
    /// Handle on the hub serving HTTP-RPC at `url`. No connection is made
    /// until the first call.
    pub fn new(url: Url) -> Self {
        Self::with_caller(HttpCaller::new(url))
    }
}
