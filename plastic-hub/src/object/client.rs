use super::connection::{Connection, FrameHandler};
use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::listener::PlasticListener;
use crate::remote::{HubCaller, RemoteHub};
use crate::value::Value;
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

type Slots = Arc<DashMap<u64, Arc<dyn PlasticListener>>>;

/// Delivers `perform` frames to the listeners registered over this
/// connection
struct ListenerSlots {
    slots: Slots,
}

#[async_trait]
impl FrameHandler for ListenerSlots {
    async fn on_call(
        &self,
        _conn: &Arc<Connection>,
        method: &str,
        _params: Vec<Value>,
    ) -> Result<Value> {
        Err(PlasticError::Unsupported(format!(
            "clients do not serve hub operations ({})",
            method
        )))
    }

    async fn on_perform(
        &self,
        key: u64,
        sender: Identifier,
        message: Identifier,
        args: Vec<Value>,
    ) -> Result<Value> {
        let listener = self
            .slots
            .get(&key)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| PlasticError::Unsupported(format!("no listener in slot {}", key)))?;
        listener.perform(&sender, &message, &args).await
    }
}

/// Object protocol side of a [`RemoteHub`]
pub struct ObjectCaller {
    conn: Arc<Connection>,
    slots: Slots,
    slot_ids: DashMap<Identifier, u64>,
    next_key: AtomicU64,
}

#[async_trait]
impl HubCaller for ObjectCaller {
    fn endpoint(&self) -> String {
        format!("object protocol {}", self.conn.peer())
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        self.conn.call(method, &params).await
    }

    /// Registers with `registerRMI`; messages come back over this
    /// connection.
    async fn register_listener(
        &self,
        hub: &RemoteHub<Self>,
        name: &str,
        messages: &[Identifier],
        listener: Arc<dyn PlasticListener>,
    ) -> Result<Identifier> {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        let sent_key = wire_key(key)?;
        // the slot must exist before the hub can announce the registration
        self.slots.insert(key, listener);
        let params = vec![
            Value::from(name),
            Value::List(messages.iter().map(|m| Value::from(m.to_string())).collect()),
            Value::Int(sent_key),
        ];
        let registered = match hub.invoke("registerRMI", params).await {
            Ok(value) => hub.expect_id(value),
            Err(e) => Err(e),
        };
        match registered {
            Ok(id) => {
                self.slot_ids.insert(id.clone(), key);
                Ok(id)
            }
            Err(e) => {
                self.slots.remove(&key);
                Err(e)
            }
        }
    }

    async fn release(&self, id: &Identifier) {
        if let Some((_, key)) = self.slot_ids.remove(id) {
            self.slots.remove(&key);
        }
    }
}

/// Listener keys travel as XML-RPC ints, so only the non-negative `i32`
/// range can be handed out.
fn wire_key(key: u64) -> Result<i32> {
    i32::try_from(key).map_err(|_| {
        PlasticError::Unsupported(format!("listener key {} does not fit the wire", key))
    })
}

/// A hub reached over the object protocol
pub type ObjectHubClient = RemoteHub<ObjectCaller>;

impl RemoteHub<ObjectCaller> {
    /// Opens a connection to the hub's object protocol server
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| PlasticError::NoHub(format!("can't connect to {}: {}", addr, e)))?;
        let slots: Slots = Arc::new(DashMap::new());
        let handler = Arc::new(ListenerSlots {
            slots: slots.clone(),
        });
        let conn = Connection::spawn(stream, handler, CancellationToken::new());
        Ok(Self::with_caller(ObjectCaller {
            conn,
            slots,
            slot_ids: DashMap::new(),
            next_key: AtomicU64::new(1),
        }))
    }

    /// Whether the connection to the hub has gone away
    pub fn is_closed(&self) -> bool {
        self.caller().conn.is_closed()
    }

    /// Closes the connection. Peers registered over it stop receiving
    /// messages.
    pub fn close(&self) {
        self.caller().conn.close();
    }
}

impl Drop for ObjectCaller {
    fn drop(&mut self) {
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::{FnListener, HubService};

    #[test]
    fn test_wire_key_range() {
        assert_eq!(wire_key(1).unwrap(), 1);
        assert_eq!(wire_key(i32::MAX as u64).unwrap(), i32::MAX);
        assert!(matches!(
            wire_key(i32::MAX as u64 + 1),
            Err(PlasticError::Unsupported(_))
        ));
        assert!(wire_key((1 << 32) | 5).is_err());
    }

    #[tokio::test]
    async fn test_exhausted_keys_refuse_registration() {
        let server = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let remote = ObjectHubClient::connect(server.local_addr().unwrap())
            .await
            .unwrap();
        remote
            .caller()
            .next_key
            .store(i32::MAX as u64 + 1, Ordering::Relaxed);

        let listener = Arc::new(FnListener::new(|_, _, _| async { Ok(Value::Null) }));
        let err = remote
            .register_listener("late", &[], listener)
            .await
            .unwrap_err();
        assert!(matches!(err, PlasticError::Unsupported(_)));
        assert!(remote.caller().slots.is_empty());
    }
}
