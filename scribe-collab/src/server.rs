//! WebSocket sync server with room-based document routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐                        ┌── DocumentRegistry ── DocumentAuthority (per doc)
//!             ├── connection task ────┤                          │
//! Client B ──┘   (select loop)        │                          ├── DurableStore
//!                    ▲                │                          │     (RocksDB / memory)
//!                    │                └── RoomManager ◄──────────┘ publish RoomEvent
//!                    │                       │
//!                    └── forwarder task ◄────┘ one per joined doc,
//!                        delivery_for(peer)     filters acks / updates / errors
//! ```
//!
//! A connection joins documents with `JoinDoc`, then sends `ApplyUpdate`.
//! Replies to updates do not come back on the request path: the authority
//! publishes to the room, and each connection's forwarder turns the event into
//! an `Ack`, an `UpdateApplied` or an `UpdateError`.

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use crate::authority::{AuthorityConfig, DocumentRegistry};
use crate::broadcast::RoomManager;
use crate::protocol::{PeerInfo, ProtocolError, SyncMessage};
use crate::storage::{DurableStore, MemoryStore, RocksStore, StoreConfig, StoreError};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Broadcast channel capacity per room
    pub broadcast_capacity: usize,
    /// Persistence storage path (None = in-memory only)
    pub storage_path: Option<PathBuf>,
    /// How often the idle sweeper runs
    pub sweep_interval_secs: u64,
    pub authority: AuthorityConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
            storage_path: None,
            sweep_interval_secs: 60,
            authority: AuthorityConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_json(json: &str) -> Result<Self, ServerError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServerError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Server errors.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
    #[error("invalid config: {0}")]
    Config(#[from] serde_json::Error),
}

/// Server statistics.
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub active_rooms: usize,
    pub updates_submitted: u64,
    pub updates_rejected: u64,
}

/// The sync server.
pub struct SyncServer {
    config: ServerConfig,
    registry: Arc<DocumentRegistry>,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<ServerStats>>,
}

impl SyncServer {
    /// Create a server, opening RocksDB when a storage path is configured.
    pub fn new(config: ServerConfig) -> Result<Self, StoreError> {
        let store: Arc<dyn DurableStore> = match &config.storage_path {
            Some(path) => Arc::new(RocksStore::open(StoreConfig {
                path: path.clone(),
                ..StoreConfig::default()
            })?),
            None => Arc::new(MemoryStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    pub fn with_store(config: ServerConfig, store: Arc<dyn DurableStore>) -> Self {
        let rooms = Arc::new(RoomManager::new(config.broadcast_capacity));
        let registry = Arc::new(DocumentRegistry::new(store, rooms.clone(), config.authority.clone()));
        Self {
            config,
            registry,
            rooms,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    /// In-memory server with default configuration.
    pub fn with_defaults() -> Self {
        Self::with_store(ServerConfig::default(), Arc::new(MemoryStore::new()))
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Sync server listening on {}", self.config.bind_addr);
        self.serve(listener).await
    }

    /// Serve connections from an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ServerError> {
        let sweep_every = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        let _sweeper = self.registry.spawn_idle_sweeper(sweep_every);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let registry = self.registry.clone();
            let rooms = self.rooms.clone();
            let stats = self.stats.clone();
            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, registry, rooms, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    /// Flush every loaded document. Call before exiting.
    pub async fn shutdown(&self) -> usize {
        let flushed = self.registry.flush_all().await;
        log::info!("Flushed {flushed} documents on shutdown");
        flushed
    }

    /// Handle a single WebSocket connection.
    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<DocumentRegistry>,
        rooms: Arc<RoomManager>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), ServerError> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;
        log::info!("WebSocket connection established from {addr}");

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let (out_tx, out_rx) = mpsc::channel(256);
        let mut session = Session {
            addr,
            peer: None,
            joined: HashMap::new(),
            out_tx,
            registry,
            rooms,
            stats: stats.clone(),
        };

        let result = session.run(ws_stream, out_rx).await;
        session.close();

        let mut s = stats.write().await;
        s.active_connections -= 1;
        s.active_rooms = session.rooms.room_count();
        result
    }

    pub async fn stats(&self) -> ServerStats {
        self.stats.read().await.clone()
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DocumentRegistry> {
        &self.registry
    }

    pub fn room_manager(&self) -> &Arc<RoomManager> {
        &self.rooms
    }
}

/// Per-connection state.
struct Session {
    addr: SocketAddr,
    /// Identity given by the first JoinDoc
    peer: Option<PeerInfo>,
    /// Forwarder task per joined document
    joined: HashMap<Uuid, JoinHandle<()>>,
    out_tx: mpsc::Sender<SyncMessage>,
    registry: Arc<DocumentRegistry>,
    rooms: Arc<RoomManager>,
    stats: Arc<RwLock<ServerStats>>,
}

impl Session {
    async fn run(
        &mut self,
        ws_stream: tokio_tungstenite::WebSocketStream<TcpStream>,
        mut out_rx: mpsc::Receiver<SyncMessage>,
    ) -> Result<(), ServerError> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let addr = self.addr;

        loop {
            tokio::select! {
                // Incoming WebSocket message
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            let bytes: Vec<u8> = data.into();
                            {
                                let mut s = self.stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += bytes.len() as u64;
                            }
                            match SyncMessage::decode(&bytes) {
                                Ok(sync_msg) => {
                                    if let Some(reply) = self.handle(sync_msg).await {
                                        ws_sender.send(Message::Binary(reply.encode()?.into())).await?;
                                    }
                                }
                                Err(e) => log::warn!("Failed to decode message from {addr}: {e}"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            return Ok(());
                        }
                        Some(Ok(Message::Ping(data))) => {
                            ws_sender.send(Message::Pong(data)).await?;
                        }
                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                // Room events filtered for this peer
                Some(outgoing) = out_rx.recv() => {
                    ws_sender.send(Message::Binary(outgoing.encode()?.into())).await?;
                }
            }
        }
    }

    /// Process one client message. Returns a direct reply, if any.
    async fn handle(&mut self, msg: SyncMessage) -> Option<SyncMessage> {
        match msg {
            SyncMessage::JoinDoc {
                doc_id,
                peer,
                from_version,
            } => Some(self.join(doc_id, peer, from_version).await),

            SyncMessage::ApplyUpdate(mut update) => {
                let doc_id = update.doc_id;
                let peer = match &self.peer {
                    Some(peer) if self.joined.contains_key(&doc_id) => peer,
                    _ => {
                        return Some(SyncMessage::UpdateError {
                            doc_id,
                            message: format!("doc {doc_id} not joined"),
                            resync: true,
                        })
                    }
                };
                update.meta.source = Some(peer.peer_id);
                if update.meta.user_id.is_none() {
                    update.meta.user_id = peer.user_id;
                }

                // Outcome reaches this peer through the room
                let accepted = self.registry.submit(update).await.is_ok();
                let mut s = self.stats.write().await;
                if accepted {
                    s.updates_submitted += 1;
                } else {
                    s.updates_rejected += 1;
                }
                None
            }

            SyncMessage::LeaveDoc { doc_id } => {
                self.leave(doc_id);
                None
            }

            SyncMessage::Ping => Some(SyncMessage::Pong),

            other => {
                log::debug!("Unexpected message from {}: {other:?}", self.addr);
                None
            }
        }
    }

    async fn join(&mut self, doc_id: Uuid, peer: PeerInfo, from_version: Option<u64>) -> SyncMessage {
        let peer = self.peer.get_or_insert(peer).clone();
        if self.joined.contains_key(&doc_id) {
            self.leave(doc_id);
        }

        // Subscribe before reading state so nothing applied in between is missed
        let room = self.rooms.get_or_create(doc_id);
        let mut rx = room.add_peer(peer.clone());

        let (snapshot, updates) = match self.registry.join(doc_id, from_version).await {
            Ok(joined) => joined,
            Err(e) => {
                log::warn!("Peer {} failed to join doc {doc_id}: {e}", peer.peer_id);
                room.remove_peer(&peer.peer_id);
                self.rooms.remove_if_empty(&doc_id);
                return SyncMessage::UpdateError {
                    doc_id,
                    message: e.to_string(),
                    resync: e.requires_resync(),
                };
            }
        };

        let tx = self.out_tx.clone();
        let peer_id = peer.peer_id;
        let forwarder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Some(msg) = event.delivery_for(peer_id) {
                            if tx.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("Peer {peer_id} lagged by {n} events on doc {doc_id}");
                        room.record_dropped(n);
                        let resync = SyncMessage::UpdateError {
                            doc_id,
                            message: format!("missed {n} updates"),
                            resync: true,
                        };
                        if tx.send(resync).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.joined.insert(doc_id, forwarder);
        self.stats.write().await.active_rooms = self.rooms.room_count();

        log::info!(
            "Peer {} ({}) joined doc {doc_id} at version {}",
            peer.name,
            peer.peer_id,
            snapshot.version
        );
        SyncMessage::JoinedDoc {
            doc_id,
            lines: snapshot.lines,
            version: snapshot.version,
            updates,
        }
    }

    fn leave(&mut self, doc_id: Uuid) {
        if let Some(forwarder) = self.joined.remove(&doc_id) {
            forwarder.abort();
        }
        if let (Some(peer), Some(room)) = (&self.peer, self.rooms.get(&doc_id)) {
            room.remove_peer(&peer.peer_id);
        }
        if self.rooms.remove_if_empty(&doc_id) {
            log::info!("Room {doc_id} removed (empty)");
        }
    }

    fn close(&mut self) {
        let docs: Vec<Uuid> = self.joined.keys().copied().collect();
        for doc_id in docs {
            self.leave(doc_id);
        }
    }
}
