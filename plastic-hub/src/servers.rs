//! Listening servers of a running hub
//!
//! A [`ServerSet`] owns the object protocol and HTTP-RPC listeners and the
//! rendezvous file that advertises them.

use crate::error::{PlasticError, Result};
use crate::hub::PlasticHub;
use crate::rendezvous::{self, RendezvousInfo};
use crate::{object, xmlrpc};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Binds the first free port from `port` on, trying `attempts` ports.
///
/// Port 0 asks the OS for any free port and is tried once.
pub(crate) async fn bind_first(
    ip: IpAddr,
    port: u16,
    attempts: u16,
    transport: &'static str,
) -> Result<TcpListener> {
    if port == 0 {
        return TcpListener::bind((ip, 0))
            .await
            .map_err(|e| PlasticError::Bind {
                transport,
                reason: e.to_string(),
            });
    }
    let mut last_error = None;
    for offset in 0..attempts.max(1) {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((ip, candidate)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!("{} port {} unavailable: {}", transport, candidate, e);
                last_error = Some(e);
            }
        }
    }
    Err(PlasticError::Bind {
        transport,
        reason: match last_error {
            Some(e) => format!("no free port in {}..+{}: {}", port, attempts, e),
            None => format!("no free port in {}..+{}", port, attempts),
        },
    })
}

/// Address clients should dial for a listener bound at `addr`
pub(crate) fn connectable(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

/// Root URL of an HTTP listener bound at `addr`
pub(crate) fn http_url(addr: SocketAddr) -> Result<Url> {
    let addr = connectable(addr);
    Url::parse(&format!("http://{}/", addr))
        .map_err(|e| PlasticError::Config(format!("bad listener address {}: {}", addr, e)))
}

pub(crate) struct ServerSet {
    object_address: SocketAddr,
    xmlrpc_url: Url,
    rendezvous: Option<(PathBuf, String)>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerSet {
    /// Claims the rendezvous file, binds both listeners and publishes them
    pub async fn start(hub: &Arc<PlasticHub>) -> Result<Self> {
        let config = hub.config();
        let path = config.rendezvous_path().map(|p| p.to_path_buf());
        if let Some(path) = &path {
            rendezvous::claim(path).await?;
        }

        let object_listener = bind_first(
            config.bind_address,
            config.object_port,
            config.port_attempts,
            "object protocol",
        )
        .await?;
        let xmlrpc_listener = bind_first(
            config.bind_address,
            config.xmlrpc_port,
            config.port_attempts,
            "HTTP-RPC",
        )
        .await?;
        let object_address = connectable(object_listener.local_addr()?);
        let xmlrpc_url = http_url(xmlrpc_listener.local_addr()?)?;

        let shutdown = CancellationToken::new();
        let tasks = vec![
            object::server::serve(object_listener, hub, shutdown.clone()),
            xmlrpc::server::serve(xmlrpc_listener, hub, shutdown.clone()),
        ];
        let mut servers = Self {
            object_address,
            xmlrpc_url,
            rendezvous: None,
            shutdown,
            tasks,
        };

        if let Some(path) = path {
            let instance = uuid::Uuid::new_v4().to_string();
            let info = RendezvousInfo::new(
                object_address.port(),
                servers.xmlrpc_url.clone(),
                instance.clone(),
            );
            // dropping `servers` on failure stops the listeners
            info.write(&path)?;
            info!("Wrote rendezvous file {}", path.display());
            servers.rendezvous = Some((path, instance));
        }
        Ok(servers)
    }

    pub fn object_address(&self) -> SocketAddr {
        self.object_address
    }

    pub fn xmlrpc_url(&self) -> &Url {
        &self.xmlrpc_url
    }

    /// Stops both listeners, closes object protocol connections and
    /// removes the rendezvous file if it is still ours.
    pub async fn shutdown(mut self) {
        self.release();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                warn!("Server task ended abnormally: {}", e);
            }
        }
    }

    fn release(&mut self) {
        self.shutdown.cancel();
        if let Some((path, instance)) = self.rendezvous.take() {
            if let Err(e) = rendezvous::remove_if_owned(&path, &instance) {
                warn!("Failed to remove rendezvous file {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for ServerSet {
    fn drop(&mut self) {
        self.release();
    }
}
