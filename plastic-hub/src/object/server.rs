use super::connection::{Connection, FrameHandler};
use crate::dispatch::{dispatch, CallOrigin};
use crate::error::{PlasticError, Result};
use crate::hub::PlasticHub;
use crate::identifier::Identifier;
use crate::value::Value;
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Serves hub operations arriving over object protocol connections
struct HubFrameHandler {
    hub: Weak<PlasticHub>,
}

#[async_trait]
impl FrameHandler for HubFrameHandler {
    async fn on_call(
        &self,
        conn: &Arc<Connection>,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value> {
        let hub = self.hub.upgrade().ok_or(PlasticError::Stopped)?;
        dispatch(&hub, method, params, &CallOrigin::Object(conn.clone())).await
    }

    async fn on_perform(
        &self,
        _key: u64,
        _sender: Identifier,
        message: Identifier,
        _args: Vec<Value>,
    ) -> Result<Value> {
        Err(PlasticError::Unsupported(format!(
            "hub does not accept message deliveries ({})",
            message
        )))
    }
}

/// Accepts object protocol connections until `shutdown` is cancelled.
///
/// Every connection is closed along with the server.
pub(crate) fn serve(
    listener: TcpListener,
    hub: &Arc<PlasticHub>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let handler: Arc<dyn FrameHandler> = Arc::new(HubFrameHandler {
        hub: Arc::downgrade(hub),
    });
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!("Object protocol connection from {}", addr);
                        Connection::spawn(stream, handler.clone(), shutdown.child_token());
                    }
                    Err(e) => warn!("Object protocol accept failed: {}", e),
                },
            }
        }
        debug!("Object protocol server stopped");
    })
}
