//! WebSocket sync client for connecting to the collaboration server.
//!
//! Provides:
//! - Connection lifecycle (connect, disconnect, reconnect)
//! - Client-side OT state: one update in flight, later edits buffered
//! - Resend of an unacknowledged update after a timeout
//!
//! ```text
//!   local edit ──► pending ──take_outgoing──► inflight ──Ack──► (version + 1)
//!                     ▲                          ▲
//!                     └──── transform_x ─────────┴──── UpdateApplied from others
//! ```

use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use scribe_ot::transform::append;
use scribe_ot::{apply_ops, strip_comments, transform_x, Op, OtError, Update, UpdateMeta};

use crate::protocol::{PeerInfo, ProtocolError, SyncMessage};

/// Resend an unacknowledged update after this long.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Ot(#[from] OtError),
    #[error("expected update at version {expected}, got {got}")]
    VersionGap { expected: u64, got: u64 },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("connection closed")]
    ConnectionClosed,
}

#[derive(Debug, Clone)]
struct InFlight {
    /// As sent, for retransmission
    original: Update,
    /// Transformed against every remote update received since
    ops: Vec<Op>,
    sent_at: Instant,
}

/// A client's view of one document.
#[derive(Debug, Clone)]
pub struct ClientDoc {
    doc_id: Uuid,
    /// Connection id stamped on outgoing updates
    source: Uuid,
    user_id: Option<Uuid>,
    content: String,
    /// Last server version reflected in `content`, excluding local edits
    version: u64,
    inflight: Option<InFlight>,
    pending: Vec<Op>,
}

impl ClientDoc {
    pub fn new(doc_id: Uuid, source: Uuid, user_id: Option<Uuid>) -> Self {
        Self {
            doc_id,
            source,
            user_id,
            content: String::new(),
            version: 0,
            inflight: None,
            pending: Vec::new(),
        }
    }

    /// Reset to a server snapshot, discarding unacknowledged edits.
    pub fn load(&mut self, lines: &[String], version: u64) {
        self.content = lines.join("\n");
        self.version = version;
        self.inflight = None;
        self.pending.clear();
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Whether any local edit is still waiting for an ack.
    pub fn has_unacked(&self) -> bool {
        self.inflight.is_some() || !self.pending.is_empty()
    }

    /// Apply a local edit immediately and buffer it for sending.
    pub fn apply_local(&mut self, ops: Vec<Op>) -> Result<(), ClientError> {
        let ops = strip_comments(&ops);
        apply_ops(&mut self.content, &ops)?;
        for op in ops {
            append(&mut self.pending, op);
        }
        Ok(())
    }

    /// The next update to send, if nothing is in flight.
    pub fn take_outgoing(&mut self) -> Option<Update> {
        if self.inflight.is_some() || self.pending.is_empty() {
            return None;
        }
        let ops = std::mem::take(&mut self.pending);
        let update = Update::new(
            self.doc_id,
            self.version,
            ops.clone(),
            UpdateMeta::new(self.user_id).with_source(self.source),
        );
        self.inflight = Some(InFlight {
            original: update.clone(),
            ops,
            sent_at: Instant::now(),
        });
        Some(update)
    }

    /// Our in-flight update was applied; the server is at `version`.
    pub fn on_ack(&mut self, version: u64) -> Result<bool, ClientError> {
        if self.inflight.is_none() || version <= self.version {
            // Re-ack of a retransmission
            return Ok(false);
        }
        if version != self.version + 1 {
            return Err(ClientError::VersionGap {
                expected: self.version + 1,
                got: version,
            });
        }
        self.inflight = None;
        self.version = version;
        Ok(true)
    }

    /// Integrate an update produced by another client.
    ///
    /// Returns false for an update already reflected here.
    pub fn on_remote(&mut self, update: &Update) -> Result<bool, ClientError> {
        if update.version < self.version {
            return Ok(false);
        }
        if update.version > self.version {
            return Err(ClientError::VersionGap {
                expected: self.version,
                got: update.version,
            });
        }

        let mut remote = strip_comments(&update.ops);
        if let Some(inflight) = &mut self.inflight {
            let (r, i) = transform_x(&remote, &inflight.ops)?;
            remote = r;
            inflight.ops = i;
        }
        let (r, p) = transform_x(&remote, &self.pending)?;
        apply_ops(&mut self.content, &r)?;
        self.pending = p;
        self.version += 1;
        Ok(true)
    }

    /// The in-flight update to retransmit once `timeout` has passed without an ack.
    pub fn needs_resend(&mut self, timeout: Duration) -> Option<Update> {
        let inflight = self.inflight.as_mut()?;
        if inflight.sent_at.elapsed() < timeout {
            return None;
        }
        inflight.sent_at = Instant::now();
        Some(inflight.original.clone().with_dup_if_source(self.source))
    }
}

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Events emitted by the sync client.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Connection established
    Connected,
    /// Connection lost
    Disconnected,
    /// Snapshot received; local state reset to `version`
    Joined { version: u64 },
    /// Another client's update was integrated
    RemoteUpdate(Update),
    /// Our update was applied at `version`
    Acked { version: u64 },
    /// The server rejected an update or the local state diverged
    Error { message: String, resync: bool },
}

/// The sync client.
pub struct SyncClient {
    /// Our peer identity
    peer_info: PeerInfo,

    /// Document we're editing
    doc_id: Uuid,

    doc: Arc<parking_lot::Mutex<ClientDoc>>,

    state: Arc<RwLock<ConnectionState>>,

    /// Channel to the WebSocket writer task
    outgoing_tx: Option<mpsc::Sender<SyncMessage>>,

    /// Event receiver for the application
    event_rx: Option<mpsc::Receiver<SyncEvent>>,

    /// Event sender (held by connection tasks)
    event_tx: mpsc::Sender<SyncEvent>,

    server_url: String,

    ack_timeout: Duration,

    tasks: Vec<JoinHandle<()>>,
}

impl SyncClient {
    pub fn new(peer_info: PeerInfo, doc_id: Uuid, server_url: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(256);
        let doc = ClientDoc::new(doc_id, peer_info.peer_id, peer_info.user_id);
        Self {
            peer_info,
            doc_id,
            doc: Arc::new(parking_lot::Mutex::new(doc)),
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            outgoing_tx: None,
            event_rx: Some(event_rx),
            event_tx,
            server_url: server_url.into(),
            ack_timeout: ACK_TIMEOUT,
            tasks: Vec::new(),
        }
    }

    /// Override the resend timeout.
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Connect and join the document.
    ///
    /// Spawns background tasks for reading, writing and resending.
    pub async fn connect(&mut self) -> Result<(), ClientError> {
        *self.state.write().await = ConnectionState::Connecting;

        let url = format!("{}/{}", self.server_url, self.doc_id);
        let ws_stream = match tokio_tungstenite::connect_async(&url).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                log::warn!("Failed to connect to {url}: {e}");
                *self.state.write().await = ConnectionState::Disconnected;
                return Err(ClientError::ConnectionClosed);
            }
        };
        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<SyncMessage>(256);
        self.outgoing_tx = Some(out_tx.clone());

        // Writer task: forward outgoing channel to WebSocket
        self.tasks.push(tokio::spawn(async move {
            while let Some(msg) = out_rx.recv().await {
                let encoded = match msg.encode() {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        log::error!("Failed to encode outgoing message: {e}");
                        continue;
                    }
                };
                if ws_writer.send(Message::Binary(encoded.into())).await.is_err() {
                    break;
                }
            }
        }));

        let join = self.join_message();
        out_tx.send(join.clone()).await.map_err(|_| ClientError::ConnectionClosed)?;

        *self.state.write().await = ConnectionState::Connected;
        let _ = self.event_tx.send(SyncEvent::Connected).await;

        // Reader task: integrate server messages
        let doc = self.doc.clone();
        let event_tx = self.event_tx.clone();
        let state = self.state.clone();
        let tx = out_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(msg) = ws_reader.next().await {
                match msg {
                    Ok(Message::Binary(data)) => {
                        let bytes: Vec<u8> = data.into();
                        match SyncMessage::decode(&bytes) {
                            Ok(sync_msg) => {
                                if !Self::on_message(sync_msg, &doc, &tx, &event_tx, &join).await {
                                    break;
                                }
                            }
                            Err(e) => log::warn!("Failed to decode server message: {e}"),
                        }
                    }
                    Ok(Message::Close(_)) | Err(_) => break,
                    _ => {}
                }
            }

            // Connection lost
            *state.write().await = ConnectionState::Disconnected;
            let _ = event_tx.send(SyncEvent::Disconnected).await;
        }));

        // Resend task: retransmit an update the server never acknowledged
        let doc = self.doc.clone();
        let timeout = self.ack_timeout;
        self.tasks.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval((timeout / 5).max(Duration::from_millis(10)));
            loop {
                ticker.tick().await;
                let resend = doc.lock().needs_resend(timeout);
                if let Some(update) = resend {
                    log::info!("Resending unacknowledged update at base version {}", update.version);
                    if out_tx.send(SyncMessage::ApplyUpdate(update)).await.is_err() {
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    fn join_message(&self) -> SyncMessage {
        SyncMessage::JoinDoc {
            doc_id: self.doc_id,
            peer: self.peer_info.clone(),
            from_version: None,
        }
    }

    /// Handle one server message. Returns false once the connection is unusable.
    async fn on_message(
        msg: SyncMessage,
        doc: &Arc<parking_lot::Mutex<ClientDoc>>,
        tx: &mpsc::Sender<SyncMessage>,
        event_tx: &mpsc::Sender<SyncEvent>,
        join: &SyncMessage,
    ) -> bool {
        let (event, next) = match msg {
            SyncMessage::JoinedDoc { lines, version, .. } => {
                doc.lock().load(&lines, version);
                (Some(SyncEvent::Joined { version }), None)
            }
            SyncMessage::UpdateApplied(update) => {
                let result = doc.lock().on_remote(&update);
                match result {
                    Ok(true) => (Some(SyncEvent::RemoteUpdate(update)), None),
                    Ok(false) => (None, None),
                    Err(e) => {
                        log::warn!("Local state diverged, rejoining: {e}");
                        let event = SyncEvent::Error {
                            message: e.to_string(),
                            resync: true,
                        };
                        (Some(event), Some(join.clone()))
                    }
                }
            }
            SyncMessage::Ack { version, .. } => {
                let mut doc = doc.lock();
                match doc.on_ack(version) {
                    Ok(true) => {
                        let next = doc.take_outgoing().map(SyncMessage::ApplyUpdate);
                        (Some(SyncEvent::Acked { version }), next)
                    }
                    Ok(false) => (None, None),
                    Err(e) => {
                        log::warn!("Unexpected ack, rejoining: {e}");
                        let event = SyncEvent::Error {
                            message: e.to_string(),
                            resync: true,
                        };
                        (Some(event), Some(join.clone()))
                    }
                }
            }
            SyncMessage::UpdateError { message, resync, .. } => {
                log::warn!("Server rejected update: {message}");
                let next = resync.then(|| join.clone());
                (Some(SyncEvent::Error { message, resync }), next)
            }
            SyncMessage::Pong => (None, None),
            other => {
                log::debug!("Unexpected server message: {other:?}");
                (None, None)
            }
        };

        if let Some(event) = event {
            let _ = event_tx.send(event).await;
        }
        match next {
            Some(msg) => tx.send(msg).await.is_ok(),
            None => true,
        }
    }

    /// Apply a local edit and send it once nothing else is in flight.
    pub async fn apply_local(&self, ops: Vec<Op>) -> Result<(), ClientError> {
        self.doc.lock().apply_local(ops)?;
        self.flush().await
    }

    /// Send buffered edits if the connection is up and nothing is in flight.
    pub async fn flush(&self) -> Result<(), ClientError> {
        if *self.state.read().await != ConnectionState::Connected {
            return Ok(());
        }
        let next = self.doc.lock().take_outgoing();
        if let (Some(update), Some(tx)) = (next, &self.outgoing_tx) {
            tx.send(SyncMessage::ApplyUpdate(update))
                .await
                .map_err(|_| ClientError::ConnectionClosed)?;
        }
        Ok(())
    }

    pub async fn send_ping(&self) -> Result<(), ClientError> {
        match &self.outgoing_tx {
            Some(tx) => tx.send(SyncMessage::Ping).await.map_err(|_| ClientError::ConnectionClosed),
            None => Err(ClientError::ConnectionClosed),
        }
    }

    /// Stop all connection tasks.
    pub async fn disconnect(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outgoing_tx = None;
        *self.state.write().await = ConnectionState::Disconnected;
    }

    /// Drop the connection and join again from a fresh snapshot.
    pub async fn reconnect(&mut self) -> Result<(), ClientError> {
        self.disconnect().await;
        *self.state.write().await = ConnectionState::Reconnecting;
        self.connect().await
    }

    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    pub fn content(&self) -> String {
        self.doc.lock().content().to_owned()
    }

    pub fn version(&self) -> u64 {
        self.doc.lock().version()
    }

    pub fn has_unacked(&self) -> bool {
        self.doc.lock().has_unacked()
    }

    pub fn peer_info(&self) -> &PeerInfo {
        &self.peer_info
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
