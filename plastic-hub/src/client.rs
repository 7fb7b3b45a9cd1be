//! Helpers for applications talking to a hub
//!
//! Locating a hub goes through the rendezvous file. The one-shot request
//! helpers register a send-only peer, send, and unregister again.

use crate::config::DEFAULT_NOTIFY_TIMEOUT_MS;
use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::listener::{HubService, PlasticListener};
use crate::object::ObjectHubClient;
use crate::rendezvous::{self, RendezvousInfo};
use crate::value::Value;
use crate::xmlrpc::XmlRpcHub;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

fn default_rendezvous() -> Result<PathBuf> {
    rendezvous::default_path()
        .ok_or_else(|| PlasticError::NoHub("no home directory for the rendezvous file".into()))
}

/// Whether a live hub is advertised in the default rendezvous file
pub async fn is_hub_running() -> bool {
    match default_rendezvous() {
        Ok(path) => is_hub_running_at(&path).await,
        Err(_) => false,
    }
}

/// Whether a live hub is advertised in the rendezvous file at `path`
pub async fn is_hub_running_at(path: &Path) -> bool {
    match RendezvousInfo::read(path) {
        Ok(info) => info.is_live().await,
        Err(_) => false,
    }
}

/// HTTP-RPC handle on the hub named in the default rendezvous file
pub async fn connect_xmlrpc() -> Result<XmlRpcHub> {
    connect_xmlrpc_at(&default_rendezvous()?).await
}

pub async fn connect_xmlrpc_at(path: &Path) -> Result<XmlRpcHub> {
    let info = RendezvousInfo::read(path)?;
    if !info.is_live().await {
        return Err(PlasticError::NoHub(format!(
            "hub in {} is not answering",
            path.display()
        )));
    }
    Ok(XmlRpcHub::new(info.xmlrpc_url))
}

/// Object protocol handle on the hub named in the default rendezvous file
pub async fn connect_object() -> Result<ObjectHubClient> {
    connect_object_at(&default_rendezvous()?).await
}

pub async fn connect_object_at(path: &Path) -> Result<ObjectHubClient> {
    let info = RendezvousInfo::read(path)?;
    ObjectHubClient::connect(info.object_address()?).await
}

/// Sends one request to `target` under a temporary send-only
/// registration and returns its answer.
///
/// `None` means the target did not answer: it is unknown, does not
/// support `message`, or failed.
pub async fn target_request<H>(
    hub: &H,
    name: &str,
    message: &Identifier,
    args: &[Value],
    target: &Identifier,
) -> Result<Option<Value>>
where
    H: HubService + ?Sized,
{
    let sender = hub.register_no_callback(name).await?;
    let outcome = hub
        .request_to_subset(&sender, message, args, std::slice::from_ref(target))
        .await;
    if let Err(e) = hub.unregister(&sender).await {
        debug!("Unregistering {} failed: {}", sender, e);
    }
    Ok(outcome?.remove(target))
}

/// Broadcasts one asynchronous request under a temporary send-only
/// registration
pub async fn single_request_asynch<H>(
    hub: &H,
    name: &str,
    message: &Identifier,
    args: &[Value],
) -> Result<()>
where
    H: HubService + ?Sized,
{
    let sender = hub.register_no_callback(name).await?;
    let outcome = hub.request_asynch(&sender, message, args).await;
    if let Err(e) = hub.unregister(&sender).await {
        debug!("Unregistering {} failed: {}", sender, e);
    }
    outcome
}

/// A registration with a hub
///
/// Unregistering is idempotent and never waits longer than the
/// connection's timeout for the hub.
pub struct HubConnection<H: HubService + ?Sized> {
    hub: Arc<H>,
    id: Identifier,
    unregistered: AtomicBool,
    timeout: Duration,
}

impl<H: HubService + ?Sized> HubConnection<H> {
    /// Registers `listener` under `name`
    pub async fn register(
        hub: Arc<H>,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Self> {
        let id = hub.register_listener(name, messages, listener).await?;
        Ok(Self::new(hub, id))
    }

    /// Registers a send-only peer
    pub async fn register_no_callback(hub: Arc<H>, name: &str) -> Result<Self> {
        let id = hub.register_no_callback(name).await?;
        Ok(Self::new(hub, id))
    }

    fn new(hub: Arc<H>, id: Identifier) -> Self {
        Self {
            hub,
            id,
            unregistered: AtomicBool::new(false),
            timeout: Duration::from_millis(DEFAULT_NOTIFY_TIMEOUT_MS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> &Identifier {
        &self.id
    }

    pub fn hub(&self) -> &Arc<H> {
        &self.hub
    }

    pub fn is_registered(&self) -> bool {
        !self.unregistered.load(Ordering::SeqCst)
    }

    /// Unregisters from the hub. Only the first call contacts the hub;
    /// failures are logged, not returned.
    pub async fn unregister(&self) {
        if self.unregistered.swap(true, Ordering::SeqCst) {
            return;
        }
        match tokio::time::timeout(self.timeout, self.hub.unregister(&self.id)).await {
            Ok(Ok(())) => debug!("Unregistered {}", self.id),
            Ok(Err(e)) => info!("Unregister of {} failed: {}", self.id, e),
            Err(_) => info!(
                "Unregister of {} not confirmed after {:?}",
                self.id, self.timeout
            ),
        }
    }
}

impl<H: HubService + ?Sized> std::fmt::Debug for HubConnection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("id", &self.id)
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Runs `attempt` every `interval` until it succeeds.
///
/// Failures that a later attempt might fix, such as no hub running yet,
/// are retried; any other error is returned. Drop the future (or wrap it
/// in a timeout) to give up.
pub async fn wait_to_register<T, F, Fut>(interval: Duration, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_recoverable() => {
                debug!("Registration not possible yet: {}", e);
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(interval).await;
    }
}
