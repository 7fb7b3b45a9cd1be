//! Error handling for the PLASTIC hub
//!
//! Every fallible operation in this crate returns [`Result`], whose error
//! type [`PlasticError`] covers hub discovery, per-peer transport failures,
//! the advisory type checks of the message validator, protocol misuse and
//! hub lifecycle faults.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for PLASTIC operations
pub type Result<T> = std::result::Result<T, PlasticError>;

/// Main error type for the plastic-hub library
#[derive(Error, Debug)]
pub enum PlasticError {
    /// No hub could be located, or the located hub does not answer
    #[error("No PLASTIC hub detected: {0}")]
    NoHub(String),

    /// A live hub already owns the rendezvous file
    #[error("PLASTIC hub already running (rendezvous file {path})")]
    HubAlreadyRunning {
        /// Rendezvous file naming the live hub
        path: PathBuf,
    },

    /// A call to one specific peer or hub endpoint failed
    #[error("Transport failure talking to '{endpoint}': {reason}")]
    Transport {
        /// Endpoint description (URL, socket address, peer id)
        endpoint: String,
        /// Failure reason
        reason: String,
    },

    /// The remote side answered the call with a fault
    #[error("Remote fault: {0}")]
    Remote(String),

    /// A value does not match its declared type
    #[error(transparent)]
    Type(#[from] TypeError),

    /// The operation cannot be performed by this transport or agent
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A wire call carried missing or ill-typed arguments
    #[error("Bad argument to {method}: {reason}")]
    BadArgument {
        /// Wire method name
        method: String,
        /// What was wrong
        reason: String,
    },

    /// A string could not be turned into an identifier
    #[error("Invalid identifier '{value}': {reason}")]
    InvalidIdentifier {
        /// Offending text
        value: String,
        /// Parse failure
        reason: String,
    },

    /// The rendezvous file exists but describes a hub that is gone
    #[error("Stale rendezvous file {path}: {reason}")]
    StaleRendezvous {
        /// Rendezvous file location
        path: PathBuf,
        /// Why it was judged stale
        reason: String,
    },

    /// The rendezvous file could not be understood
    #[error("Bad rendezvous file {path}: {reason}")]
    BadRendezvous {
        /// Rendezvous file location
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },

    /// No listening port could be bound
    #[error("Failed to bind {transport} server: {reason}")]
    Bind {
        /// Which listener failed
        transport: &'static str,
        /// Failure reason
        reason: String,
    },

    /// The hub has been stopped
    #[error("Hub has been stopped")]
    Stopped,

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// The self-test found a discrepancy
    #[error("Hub test failed: {0}")]
    TestFailed(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A value has no representation on the wire
    #[error("Cannot encode value: {0}")]
    Encoding(String),

    /// JSON encoding or decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A value failed its [`ValueType`](crate::value_type::ValueType) check.
///
/// Only produced by the validation layer, which is advisory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Type error: {reason}")]
pub struct TypeError {
    /// Human readable reason
    pub reason: String,
}

impl TypeError {
    pub fn new<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl PlasticError {
    /// Create a transport error for an endpoint
    pub fn transport<E: Into<String>, R: ToString>(endpoint: E, reason: R) -> Self {
        PlasticError::Transport {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a bad-argument error for a wire method
    pub fn bad_argument<M: Into<String>, R: Into<String>>(method: M, reason: R) -> Self {
        PlasticError::BadArgument {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Numeric code reported alongside the message in wire faults
    pub fn fault_code(&self) -> i32 {
        match self {
            PlasticError::Unsupported(_) => 1,
            PlasticError::BadArgument { .. }
            | PlasticError::InvalidIdentifier { .. }
            | PlasticError::Encoding(_) => 2,
            PlasticError::Stopped => 3,
            _ => 0,
        }
    }

    /// Check if retrying after re-resolving the hub may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PlasticError::NoHub(_)
                | PlasticError::Transport { .. }
                | PlasticError::Http(_)
                | PlasticError::StaleRendezvous { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PlasticError::transport("http://localhost:3112/", "connection refused");
        assert_eq!(
            err.to_string(),
            "Transport failure talking to 'http://localhost:3112/': connection refused"
        );

        let err = PlasticError::from(TypeError::new("not an int"));
        assert_eq!(err.to_string(), "Type error: not an int");
    }

    #[test]
    fn test_recoverable() {
        assert!(PlasticError::NoHub("no file".into()).is_recoverable());
        assert!(PlasticError::transport("x", "y").is_recoverable());
        assert!(!PlasticError::Unsupported("registerRMI".into()).is_recoverable());
        assert!(!PlasticError::Stopped.is_recoverable());
    }
}
