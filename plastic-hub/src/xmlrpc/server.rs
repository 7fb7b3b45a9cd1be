use super::codec::{self, MethodCall};
use super::xml_response;
use crate::dispatch::{dispatch, CallOrigin};
use crate::error::PlasticError;
use crate::hub::PlasticHub;
use axum::extract::State;
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use std::sync::{Arc, Weak};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Routes for the hub's HTTP-RPC endpoint
fn create_router(hub: Weak<PlasticHub>) -> Router {
    Router::new()
        .route("/", post(handle_call))
        .with_state(hub)
}

/// Any content type is accepted; older clients send `text/plain`
async fn handle_call(State(hub): State<Weak<PlasticHub>>, body: String) -> Response {
    let Some(hub) = hub.upgrade() else {
        return xml_response(codec::encode_fault(&PlasticError::Stopped));
    };
    let call = match MethodCall::from_xml(&body) {
        Ok(call) => call,
        Err(e) => {
            debug!("Unreadable HTTP-RPC call: {}", e);
            return xml_response(codec::encode_fault(&e));
        }
    };
    let outcome = dispatch(&hub, &call.method_name, call.params, &CallOrigin::Http).await;
    if let Err(e) = &outcome {
        debug!("HTTP-RPC call {} failed: {}", call.method_name, e);
    }
    xml_response(codec::encode_response(outcome))
}

/// Serves hub operations over HTTP until `shutdown` is cancelled
pub(crate) fn serve(
    listener: TcpListener,
    hub: &Arc<PlasticHub>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    let app = create_router(Arc::downgrade(hub));
    tokio::spawn(async move {
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        match served {
            Ok(()) => debug!("HTTP-RPC server stopped"),
            Err(e) => warn!("HTTP-RPC server failed: {}", e),
        }
    })
}
