//! The HTTP-RPC transport
//!
//! Standard XML-RPC over HTTP: a `methodCall` document POSTed to the server
//! root, a `methodResponse` back. The hub serves its operations this way,
//! and peers that register with a callback URL receive their messages as
//! `perform` calls on a server of their own.

pub mod callback;
pub mod client;
pub mod codec;
pub mod server;

pub use callback::CallbackServer;
pub use client::{HttpCaller, XmlRpcHub};
pub use codec::MethodCall;

use axum::http::header;
use axum::response::{IntoResponse, Response};

/// Wraps an encoded `methodResponse` as an HTTP response
pub(crate) fn xml_response(body: String) -> Response {
    ([(header::CONTENT_TYPE, codec::CONTENT_TYPE)], body).into_response()
}
