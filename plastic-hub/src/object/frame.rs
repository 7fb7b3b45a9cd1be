use crate::wire::{WireFault, WireResponse};
use serde::{Deserialize, Serialize};

/// Longest frame accepted on an object protocol connection
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

/// One line of the object protocol.
///
/// Both ends may send `call` and `perform` frames at any time; each is
/// answered by a `reply` carrying the same `seq`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "lowercase")]
pub enum Frame {
    /// Client asks the hub to run a hub operation
    Call {
        seq: u64,
        method: String,
        #[serde(default)]
        params: Vec<serde_json::Value>,
    },
    /// Hub asks a client to deliver a message to one of its listeners
    Perform {
        seq: u64,
        /// Listener slot chosen by the client at registration
        key: u64,
        sender: String,
        message: String,
        #[serde(default)]
        args: Vec<serde_json::Value>,
    },
    Reply {
        seq: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fault: Option<WireFault>,
    },
}

impl Frame {
    pub fn reply(seq: u64, response: WireResponse) -> Self {
        Frame::Reply {
            seq,
            result: response.result,
            fault: response.fault,
        }
    }
}
