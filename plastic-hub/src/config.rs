//! Hub configuration
//!
//! [`HubConfig`] has usable defaults for a desktop hub and can be read
//! from a TOML file. Every field is optional in the file.
//!
//! ```toml
//! object_port = 3110
//! xmlrpc_port = 3111
//! verbose = true
//! request_timeout_ms = 30000
//! ```

use crate::error::{PlasticError, Result};
use crate::rendezvous;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_OBJECT_PORT: u16 = 3110;
pub const DEFAULT_XMLRPC_PORT: u16 = 3111;
pub const DEFAULT_CALLBACK_PORT: u16 = 3112;
pub const DEFAULT_PORT_ATTEMPTS: u16 = 20;
pub const DEFAULT_NOTIFY_TIMEOUT_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Where to publish connection details. An empty path disables the
    /// rendezvous file.
    pub rendezvous_file: Option<PathBuf>,
    /// Interface both listeners bind to
    pub bind_address: IpAddr,
    /// First port tried for the object protocol; 0 lets the OS choose
    pub object_port: u16,
    /// First port tried for HTTP-RPC; 0 lets the OS choose
    pub xmlrpc_port: u16,
    /// Ports tried per listener before giving up
    pub port_attempts: u16,
    /// Log every registration, request and response
    pub verbose: bool,
    /// Check traffic against known message definitions
    pub validate: bool,
    /// Bound on waiting for hub notifications to be delivered
    pub notify_timeout_ms: u64,
    /// Optional bound on each target of a request. Unset means a slow
    /// peer can hold up a synchronous request indefinitely.
    pub request_timeout_ms: Option<u64>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            rendezvous_file: rendezvous::default_path(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            object_port: DEFAULT_OBJECT_PORT,
            xmlrpc_port: DEFAULT_XMLRPC_PORT,
            port_attempts: DEFAULT_PORT_ATTEMPTS,
            verbose: false,
            validate: false,
            notify_timeout_ms: DEFAULT_NOTIFY_TIMEOUT_MS,
            request_timeout_ms: None,
        }
    }
}

impl HubConfig {
    /// Configuration for a hub that is only used in-process: no rendezvous
    /// file and OS-chosen ports.
    pub fn ephemeral() -> Self {
        Self {
            rendezvous_file: None,
            object_port: 0,
            xmlrpc_port: 0,
            ..Self::default()
        }
    }

    /// Parses TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PlasticError::Config(e.to_string()))
    }

    /// Reads a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| PlasticError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn with_rendezvous_file(mut self, path: Option<PathBuf>) -> Self {
        self.rendezvous_file = path;
        self
    }

    pub fn with_ports(mut self, object_port: u16, xmlrpc_port: u16) -> Self {
        self.object_port = object_port;
        self.xmlrpc_port = xmlrpc_port;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    pub fn with_notify_timeout(mut self, timeout: Duration) -> Self {
        self.notify_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout_ms = timeout.map(|t| t.as_millis() as u64);
        self
    }

    /// Effective rendezvous file location, if enabled
    pub fn rendezvous_path(&self) -> Option<&Path> {
        self.rendezvous_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}
