use crate::agent::Agent;
use crate::constants::EVENT_LOGGER_NAME;
use crate::error::{PlasticError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing_subscriber::EnvFilter;

/// Event for logging peer registration and unregistration
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub id: String,
    pub name: String,
    pub transport: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub messages: Vec<String>,
}

impl RegistrationEvent {
    pub fn registered(agent: &Agent) -> Self {
        Self::new("Register", agent)
    }

    pub fn unregistered(agent: &Agent) -> Self {
        Self::new("Unregister", agent)
    }

    fn new(event_type: &str, agent: &Agent) -> Self {
        Self {
            event_type: event_type.to_string(),
            id: agent.id().to_string(),
            name: agent.name().to_string(),
            transport: agent.connection_description(),
            messages: agent.interest().iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl std::fmt::Display for RegistrationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "RegistrationEvent serialization error"),
        }
    }
}

/// Delivery modes for request events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestMode {
    #[serde(rename = "synch")]
    Synch,
    #[serde(rename = "asynch")]
    Asynch,
}

/// Event for logging an incoming request before fan-out
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub request_id: u64,
    pub mode: RequestMode,
    pub sender: String,
    pub message: String,
    pub args: String,
    pub targets: Vec<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl RequestEvent {
    pub fn new(
        request_id: u64,
        mode: RequestMode,
        sender: String,
        message: String,
        args: String,
        targets: Vec<String>,
    ) -> Self {
        Self {
            event_type: "Request".to_string(),
            request_id,
            mode,
            sender,
            message,
            args,
            targets,
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: String, value: Value) -> Self {
        self.extra.insert(key, value);
        self
    }
}

impl std::fmt::Display for RequestEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "RequestEvent serialization error"),
        }
    }
}

/// Event for logging one target's answer to a synchronous request
#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub request_id: u64,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEvent {
    pub fn success(request_id: u64, target: String, result: String) -> Self {
        Self {
            event_type: "Response".to_string(),
            request_id,
            target,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(request_id: u64, target: String, error: &PlasticError) -> Self {
        Self {
            event_type: "Response".to_string(),
            request_id,
            target,
            result: None,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for ResponseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "ResponseEvent serialization error"),
        }
    }
}

/// Hub lifecycle stages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HubStage {
    Started,
    Stopping,
    Stopped,
}

/// Event for logging hub start and stop
#[derive(Debug, Serialize, Deserialize)]
pub struct HubLifecycleEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub stage: HubStage,
    pub hub_id: String,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl HubLifecycleEvent {
    pub fn new(stage: HubStage, hub_id: String) -> Self {
        Self {
            event_type: "HubLifecycle".to_string(),
            stage,
            hub_id,
            extra: HashMap::new(),
        }
    }

    pub fn with_extra(mut self, key: String, value: Value) -> Self {
        self.extra.insert(key, value);
        self
    }
}

impl std::fmt::Display for HubLifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "HubLifecycleEvent serialization error"),
        }
    }
}

/// Installs the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence. Otherwise hub events are shown when
/// `verbose` is set and only warnings are shown when it is not.
pub fn init_tracing(verbose: bool) -> Result<()> {
    let default = if verbose {
        format!("warn,plastic_hub=info,{}=info", EVENT_LOGGER_NAME)
    } else {
        "warn".to_string()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| PlasticError::Config(format!("failed to install tracing subscriber: {}", e)))
}
