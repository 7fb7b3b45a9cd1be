//! A framed, bidirectional object protocol connection
//!
//! Each side can issue requests while serving the other's. Outgoing
//! requests are matched to their replies by sequence number; incoming
//! requests are handed to a [`FrameHandler`] on their own task so that a
//! slow handler never blocks the reader.

use super::frame::{Frame, MAX_FRAME_LENGTH};
use crate::error::{PlasticError, Result};
use crate::identifier::Identifier;
use crate::value::Value;
use crate::wire::{self, WireResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Serves requests arriving on a [`Connection`]
#[async_trait]
pub trait FrameHandler: Send + Sync + 'static {
    /// Handles a hub operation call
    async fn on_call(&self, conn: &Arc<Connection>, method: &str, params: Vec<Value>)
        -> Result<Value>;

    /// Handles a message delivery to listener slot `key`
    async fn on_perform(
        &self,
        key: u64,
        sender: Identifier,
        message: Identifier,
        args: Vec<Value>,
    ) -> Result<Value>;
}

pub struct Connection {
    peer: String,
    outgoing: mpsc::UnboundedSender<String>,
    pending: DashMap<u64, oneshot::Sender<WireResponse>>,
    next_seq: AtomicU64,
    closed: CancellationToken,
}

impl Connection {
    /// Starts the reader and writer tasks for `stream`.
    ///
    /// Cancelling `closed` shuts the connection down; the token is also
    /// cancelled when the peer hangs up.
    pub fn spawn(
        stream: TcpStream,
        handler: Arc<dyn FrameHandler>,
        closed: CancellationToken,
    ) -> Arc<Self> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown peer".to_string());
        let (read_half, write_half) = stream.into_split();
        let (outgoing, rx) = mpsc::unbounded_channel();

        let conn = Arc::new(Self {
            peer,
            outgoing,
            pending: DashMap::new(),
            next_seq: AtomicU64::new(1),
            closed,
        });

        tokio::spawn(write_loop(write_half, rx, conn.closed.clone()));

        let reader = conn.clone();
        tokio::spawn(async move {
            let mut lines =
                FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));
            loop {
                let line = tokio::select! {
                    _ = reader.closed.cancelled() => break,
                    next = lines.next() => match next {
                        Some(Ok(line)) => line,
                        Some(Err(e)) => {
                            warn!("Read failed on connection {}: {}", reader.peer, e);
                            break;
                        }
                        None => break,
                    },
                };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Frame>(&line) {
                    Ok(frame) => reader.dispatch(frame, &handler),
                    Err(e) => warn!("Malformed frame from {}: {}", reader.peer, e),
                }
            }
            reader.closed.cancel();
            reader.pending.clear();
            debug!("Connection {} closed", reader.peer);
        });

        conn
    }

    fn dispatch(self: &Arc<Self>, frame: Frame, handler: &Arc<dyn FrameHandler>) {
        match frame {
            Frame::Reply { seq, result, fault } => match self.pending.remove(&seq) {
                Some((_, tx)) => {
                    let _ = tx.send(WireResponse { result, fault });
                }
                None => debug!("Unexpected reply {} from {}", seq, self.peer),
            },
            Frame::Call {
                seq,
                method,
                params,
            } => {
                let conn = self.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let outcome = match decode_all(&params) {
                        Ok(params) => handler.on_call(&conn, &method, params).await,
                        Err(e) => Err(e),
                    };
                    conn.send_reply(seq, outcome);
                });
            }
            Frame::Perform {
                seq,
                key,
                sender,
                message,
                args,
            } => {
                let conn = self.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let outcome = async {
                        let sender = Identifier::parse(&sender)?;
                        let message = Identifier::parse(&message)?;
                        let args = decode_all(&args)?;
                        handler.on_perform(key, sender, message, args).await
                    }
                    .await;
                    conn.send_reply(seq, outcome);
                });
            }
        }
    }

    fn send_reply(&self, seq: u64, outcome: Result<Value>) {
        let response = WireResponse::from_outcome(outcome);
        if let Err(e) = self.send(&Frame::reply(seq, response)) {
            debug!("Dropping reply {}: {}", seq, e);
        }
    }

    fn send(&self, frame: &Frame) -> Result<()> {
        let line = serde_json::to_string(frame)?;
        self.outgoing
            .send(line)
            .map_err(|_| PlasticError::transport(self.peer.clone(), "connection closed"))
    }

    async fn round_trip(&self, frame_for: impl FnOnce(u64) -> Frame) -> Result<Value> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(seq, tx);
        if self.closed.is_cancelled() {
            self.pending.remove(&seq);
            return Err(PlasticError::transport(self.peer.clone(), "connection closed"));
        }
        if let Err(e) = self.send(&frame_for(seq)) {
            self.pending.remove(&seq);
            return Err(e);
        }
        let response = rx.await.map_err(|_| {
            PlasticError::transport(self.peer.clone(), "connection closed before reply")
        })?;
        response.into_result()
    }

    /// Calls hub operation `method` on the other end
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        let params = params.iter().map(wire::to_wire).collect::<Result<Vec<_>>>()?;
        self.round_trip(|seq| Frame::Call {
            seq,
            method: method.to_string(),
            params,
        })
        .await
    }

    /// Delivers a message to listener slot `key` on the other end
    pub async fn perform(
        &self,
        key: u64,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<Value> {
        let args = args.iter().map(wire::to_wire).collect::<Result<Vec<_>>>()?;
        self.round_trip(|seq| Frame::Perform {
            seq,
            key,
            sender: sender.to_string(),
            message: message.to_string(),
            args,
        })
        .await
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("pending", &self.pending.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn write_loop(
    write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    closed: CancellationToken,
) {
    let mut sink = FramedWrite::new(write_half, LinesCodec::new());
    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            line = rx.recv() => match line {
                Some(line) => {
                    if let Err(e) = sink.send(line).await {
                        warn!("Write failed: {}", e);
                        closed.cancel();
                        break;
                    }
                }
                None => break,
            },
        }
    }
}

fn decode_all(items: &[serde_json::Value]) -> Result<Vec<Value>> {
    items.iter().map(wire::from_wire).collect()
}

/// Callback capability of a peer registered over the object protocol
#[derive(Clone, Debug)]
pub struct RemoteCallback {
    conn: Arc<Connection>,
    key: u64,
}

impl RemoteCallback {
    pub fn new(conn: Arc<Connection>, key: u64) -> Self {
        Self { conn, key }
    }

    pub async fn perform(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<Value> {
        self.conn.perform(self.key, sender, message, args).await
    }

    pub fn describe(&self) -> String {
        format!("object protocol {} slot {}", self.conn.peer(), self.key)
    }
}
