//! # PLASTIC hub
//!
//! A message hub for the PLASTIC desktop interoperability protocol.
//! Applications register with the hub, declare which messages they
//! understand, and send requests that the hub fans out to every other
//! interested application, collecting the answers.
//!
//! ## Features
//!
//! - **Peer registry**: unique identifiers, declared interests, idempotent unregister
//! - **Concurrent fan-out**: one task per target; a failing target never fails the request
//! - **Two wire transports**: XML-RPC over HTTP with callback URLs, and a persistent object protocol
//! - **Rendezvous file**: publishes a running hub and clears stale ones
//! - **Message validation**: optional, advisory checks against known message definitions
//!
//! ## Quick Start
//!
//! ```rust
//! use plastic_hub::{message_id::ECHO, HubConfig, PlasticHub, Value};
//!
//! # tokio_test::block_on(async {
//! let hub = PlasticHub::new(HubConfig::ephemeral());
//! let sender = hub.register_no_callback("example").unwrap();
//!
//! let results = hub
//!     .request_to_subset(&sender, &ECHO, &[Value::from("hello")], &[hub.hub_id().clone()])
//!     .await;
//! assert_eq!(results[hub.hub_id()], Value::from("hello"));
//! # });
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

// Error types (must be first for other modules to use)
pub mod error;

// Core types
pub mod constants;
pub mod identifier;
pub mod value;
pub mod value_type;
pub mod message_id;
pub mod message_definition;
pub mod validator;

// Peers and the hub
pub mod listener;
pub mod application;
pub mod agent;
pub mod hub;
pub mod logging;
pub mod config;

// Transports
pub mod wire;
pub mod dispatch;
pub mod remote;
pub mod object;
pub mod xmlrpc;
pub mod rendezvous;
mod servers;

// Client side
pub mod client;
pub mod tester;

// Re-exports
pub use agent::{Agent, Transport};
pub use application::BasicApplication;
pub use client::HubConnection;
pub use config::HubConfig;
pub use constants::PLASTIC_VERSION;
pub use error::{PlasticError, Result, TypeError};
pub use hub::PlasticHub;
pub use identifier::Identifier;
pub use listener::{FnListener, HubService, PlasticListener, ResponseMap};
pub use message_definition::MessageDefinition;
pub use object::ObjectHubClient;
pub use rendezvous::RendezvousInfo;
pub use tester::HubTester;
pub use validator::MessageValidator;
pub use value::Value;
pub use value_type::ValueType;
pub use xmlrpc::XmlRpcHub;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
