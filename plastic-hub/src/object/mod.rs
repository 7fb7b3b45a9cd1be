//! The object protocol: a persistent TCP connection carrying
//! newline-delimited JSON frames in both directions
//!
//! Clients call hub operations over the connection and, once registered
//! with `registerRMI`, receive their messages back over the same
//! connection. This is the transport published as `plastic.rmi.port`.

pub mod client;
pub mod connection;
pub mod frame;
pub mod server;

pub use client::{ObjectCaller, ObjectHubClient};
pub use connection::{Connection, FrameHandler, RemoteCallback};
pub use frame::Frame;
