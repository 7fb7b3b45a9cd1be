//! The rendezvous file through which applications find the hub
//!
//! The file is a `key=value` properties file in the user's home directory.
//! The hub writes it once both listeners are up and deletes it on stop,
//! but only while it still carries that hub's instance value.

use crate::constants::PLASTIC_VERSION;
use crate::error::{PlasticError, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{info, warn};
use url::Url;

pub const RENDEZVOUS_FILE_NAME: &str = ".plastic";

pub const KEY_VERSION: &str = "plastic.version";
pub const KEY_OBJECT_PORT: &str = "plastic.rmi.port";
pub const KEY_XMLRPC_URL: &str = "plastic.xmlrpc.url";
pub const KEY_INSTANCE: &str = "plastic.hub.instance";

/// How long a liveness check waits for the hub to accept a connection
const LIVENESS_TIMEOUT: Duration = Duration::from_millis(500);

/// The user's home directory, from `HOME` or `USERPROFILE`
pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

/// Standard rendezvous file location, `~/.plastic`
pub fn default_path() -> Option<PathBuf> {
    home_dir().map(|home| home.join(RENDEZVOUS_FILE_NAME))
}

/// Connection details published by a running hub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendezvousInfo {
    pub version: String,
    pub object_port: u16,
    pub xmlrpc_url: Url,
    pub instance: String,
}

impl RendezvousInfo {
    pub fn new(object_port: u16, xmlrpc_url: Url, instance: String) -> Self {
        Self {
            version: PLASTIC_VERSION.to_string(),
            object_port,
            xmlrpc_url,
            instance,
        }
    }

    /// Reads a rendezvous file.
    ///
    /// A missing file means there is no hub and yields
    /// [`PlasticError::NoHub`]; an unreadable one yields
    /// [`PlasticError::BadRendezvous`].
    pub fn read(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PlasticError::NoHub(format!("no file {}", path.display())))
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&text, path)
    }

    /// Parses rendezvous text; `path` is only used in error messages
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let props = parse_properties(text);
        let bad = |reason: String| PlasticError::BadRendezvous {
            path: path.to_path_buf(),
            reason,
        };
        let get = |key: &str| {
            props
                .get(key)
                .map(String::as_str)
                .ok_or_else(|| bad(format!("no property {}", key)))
        };

        let port_text = get(KEY_OBJECT_PORT)?;
        let object_port = port_text
            .parse()
            .map_err(|_| bad(format!("{}={}", KEY_OBJECT_PORT, port_text)))?;
        let url_text = get(KEY_XMLRPC_URL)?;
        let xmlrpc_url =
            Url::parse(url_text).map_err(|e| bad(format!("{}={}: {}", KEY_XMLRPC_URL, url_text, e)))?;

        Ok(Self {
            version: props
                .get(KEY_VERSION)
                .cloned()
                .unwrap_or_else(|| PLASTIC_VERSION.to_string()),
            object_port,
            xmlrpc_url,
            instance: props.get(KEY_INSTANCE).cloned().unwrap_or_default(),
        })
    }

    /// Renders the file contents
    pub fn to_file_text(&self) -> String {
        format!(
            "# PLASTIC hub rendezvous\n{}={}\n{}={}\n{}={}\n{}={}\n",
            KEY_VERSION,
            self.version,
            KEY_OBJECT_PORT,
            self.object_port,
            KEY_XMLRPC_URL,
            self.xmlrpc_url,
            KEY_INSTANCE,
            self.instance
        )
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_file_text())?;
        Ok(())
    }

    /// Socket address of the object protocol listener.
    ///
    /// Uses the host of the HTTP-RPC URL, since both listeners share an
    /// interface.
    pub fn object_address(&self) -> Result<SocketAddr> {
        let host = self.xmlrpc_url.host_str().unwrap_or("localhost");
        let host = host.trim_start_matches('[').trim_end_matches(']');
        (host, self.object_port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| PlasticError::NoHub(format!("can't resolve host {}", host)))
    }

    /// Whether the described hub accepts connections
    pub async fn is_live(&self) -> bool {
        let addr = match self.object_address() {
            Ok(addr) => addr,
            Err(_) => return false,
        };
        matches!(
            tokio::time::timeout(LIVENESS_TIMEOUT, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Parses Java-style properties: `key=value` or `key: value`, `#` and `!`
/// comments, backslash escapes.
fn parse_properties(text: &str) -> HashMap<String, String> {
    let mut props = HashMap::new();
    for line in text.lines() {
        let line = line.trim_start();
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }
        let mut key = String::new();
        let mut chars = line.chars();
        let mut escaped = false;
        for c in chars.by_ref() {
            if escaped {
                key.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '=' || c == ':' {
                break;
            } else {
                key.push(c);
            }
        }
        let value = unescape(chars.as_str().trim());
        props.insert(key.trim().to_string(), value);
    }
    props
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Makes sure no live hub owns `path`, clearing a stale file.
///
/// Fails with [`PlasticError::HubAlreadyRunning`] if the file describes a
/// hub that still accepts connections.
pub async fn claim(path: &Path) -> Result<()> {
    let stale = match RendezvousInfo::read(path) {
        Ok(info) => {
            if info.is_live().await {
                return Err(PlasticError::HubAlreadyRunning {
                    path: path.to_path_buf(),
                });
            }
            PlasticError::StaleRendezvous {
                path: path.to_path_buf(),
                reason: format!("no hub listening on port {}", info.object_port),
            }
        }
        Err(PlasticError::NoHub(_)) => return Ok(()),
        Err(e) => PlasticError::StaleRendezvous {
            path: path.to_path_buf(),
            reason: e.to_string(),
        },
    };
    warn!("{}; removing it", stale);
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Deletes `path` if it still names hub instance `instance`.
///
/// Returns whether the file was removed.
pub fn remove_if_owned(path: &Path, instance: &str) -> Result<bool> {
    match RendezvousInfo::read(path) {
        Ok(info) if info.instance == instance => {
            fs::remove_file(path)?;
            info!("Removed rendezvous file {}", path.display());
            Ok(true)
        }
        Ok(_) => {
            warn!(
                "Rendezvous file {} belongs to another hub; leaving it",
                path.display()
            );
            Ok(false)
        }
        Err(PlasticError::NoHub(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::net::TcpListener;

    fn sample(port: u16) -> RendezvousInfo {
        RendezvousInfo::new(
            port,
            Url::parse("http://127.0.0.1:3111/").unwrap(),
            "abc-123".to_string(),
        )
    }

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RENDEZVOUS_FILE_NAME);
        sample(3110).write(&path).unwrap();
        let info = RendezvousInfo::read(&path).unwrap();
        assert_eq!(info, sample(3110));
    }

    #[test]
    fn test_java_escapes_are_understood() {
        let text = "#Thu Jul 20 10:00:00 BST 2006\n\
                    plastic.rmi.port=3110\n\
                    plastic.xmlrpc.url=http\\://localhost\\:3111/\n";
        let info = RendezvousInfo::parse(text, Path::new(".plastic")).unwrap();
        assert_eq!(info.xmlrpc_url.as_str(), "http://localhost:3111/");
        assert_eq!(info.version, PLASTIC_VERSION);
        assert_eq!(info.instance, "");
    }

    #[test]
    fn test_missing_and_bad_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RENDEZVOUS_FILE_NAME);
        assert!(matches!(
            RendezvousInfo::read(&path),
            Err(PlasticError::NoHub(_))
        ));
        fs::write(&path, "plastic.rmi.port=lots\n").unwrap();
        assert!(matches!(
            RendezvousInfo::read(&path),
            Err(PlasticError::BadRendezvous { .. })
        ));
    }

    #[tokio::test]
    async fn test_claim_removes_stale_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RENDEZVOUS_FILE_NAME);
        // nothing listens on port 1
        sample(1).write(&path).unwrap();
        claim(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_claim_refuses_live_hub() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RENDEZVOUS_FILE_NAME);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        sample(port).write(&path).unwrap();
        let err = claim(&path).await.unwrap_err();
        assert!(matches!(err, PlasticError::HubAlreadyRunning { .. }));
        assert!(path.exists());
    }

    #[test]
    fn test_remove_only_own_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RENDEZVOUS_FILE_NAME);
        sample(3110).write(&path).unwrap();
        assert!(!remove_if_owned(&path, "someone-else").unwrap());
        assert!(path.exists());
        assert!(remove_if_owned(&path, "abc-123").unwrap());
        assert!(!path.exists());
        assert!(!remove_if_owned(&path, "abc-123").unwrap());
    }
}
