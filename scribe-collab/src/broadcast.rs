//! Fan-out of authoritative updates to every connection in a document room.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each peer gets an independent receiver that buffers up to `capacity` events;
//! a peer that falls further behind sees `Lagged` and must resync.
//!
//! Events are published once per room. Each subscriber filters them with
//! [`RoomEvent::delivery_for`]: the originator gets a thin ack, everyone else
//! the full update, and rejections reach only the connection that caused them.

use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use scribe_ot::Update;

use crate::protocol::{PeerInfo, SyncMessage};

/// What the document authority publishes to a room.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomEvent {
    /// An update was applied. `dup` marks the re-ack of a retransmission,
    /// which only the originator needs to see.
    Applied { update: Update, dup: bool },
    /// A submission was rejected.
    Error {
        doc_id: Uuid,
        source: Option<Uuid>,
        message: String,
        resync: bool,
    },
}

impl RoomEvent {
    /// The message connection `conn` should receive for this event, if any.
    pub fn delivery_for(&self, conn: Uuid) -> Option<SyncMessage> {
        match self {
            RoomEvent::Applied { update, dup } => {
                if update.meta.source == Some(conn) {
                    Some(SyncMessage::Ack {
                        doc_id: update.doc_id,
                        version: update.resulting_version(),
                    })
                } else if *dup {
                    None
                } else {
                    Some(SyncMessage::UpdateApplied(update.clone()))
                }
            }
            RoomEvent::Error {
                doc_id,
                source,
                message,
                resync,
            } => (*source == Some(conn)).then(|| SyncMessage::UpdateError {
                doc_id: *doc_id,
                message: message.clone(),
                resync: *resync,
            }),
        }
    }
}

/// Bus the document authority publishes through.
pub trait Broadcaster: Send + Sync {
    /// Publish to a room. Returns how many subscribers received the event.
    fn publish(&self, room_id: Uuid, event: RoomEvent) -> usize;
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub active_peers: usize,
}

/// Atomic broadcast stats, lock-free on the hot path.
#[derive(Default)]
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

/// A broadcast group for a single document room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Arc<RoomEvent>>,

    /// Connected peers in this room
    peers: RwLock<HashMap<Uuid, PeerInfo>>,

    /// Channel capacity (events buffered per receiver)
    capacity: usize,

    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// `capacity` determines how many events can be buffered per peer
    /// before a lagging peer starts missing them.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            peers: RwLock::new(HashMap::new()),
            capacity,
            atomic_stats: AtomicBroadcastStats::default(),
        }
    }

    /// Add a peer and return its receiver.
    pub fn add_peer(&self, info: PeerInfo) -> broadcast::Receiver<Arc<RoomEvent>> {
        self.peers.write().insert(info.peer_id, info);
        self.sender.subscribe()
    }

    pub fn remove_peer(&self, peer_id: &Uuid) -> Option<PeerInfo> {
        self.peers.write().remove(peer_id)
    }

    /// Send an event to every subscriber. Returns the number of receivers.
    pub fn publish(&self, event: RoomEvent) -> usize {
        let count = self.sender.send(Arc::new(event)).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Record events a lagging receiver skipped.
    pub fn record_dropped(&self, n: u64) {
        self.atomic_stats.messages_dropped.fetch_add(n, Ordering::Relaxed);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.peers.read().values().cloned().collect()
    }

    pub fn has_peer(&self, peer_id: &Uuid) -> bool {
        self.peers.read().contains_key(peer_id)
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.atomic_stats.messages_dropped.load(Ordering::Relaxed),
            active_peers: self.peer_count(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Room manager: maps document IDs to broadcast groups.
///
/// Rooms are created on first join and removed once their last peer leaves.
pub struct RoomManager {
    rooms: DashMap<Uuid, Arc<BroadcastGroup>>,
    default_capacity: usize,
}

impl RoomManager {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            default_capacity,
        }
    }

    /// Get or create a room for the given document.
    pub fn get_or_create(&self, doc_id: Uuid) -> Arc<BroadcastGroup> {
        self.rooms
            .entry(doc_id)
            .or_insert_with(|| Arc::new(BroadcastGroup::new(self.default_capacity)))
            .clone()
    }

    pub fn get(&self, doc_id: &Uuid) -> Option<Arc<BroadcastGroup>> {
        self.rooms.get(doc_id).map(|room| room.clone())
    }

    /// Remove the room if no peer is left in it.
    pub fn remove_if_empty(&self, doc_id: &Uuid) -> bool {
        self.rooms.remove_if(doc_id, |_, room| room.peer_count() == 0).is_some()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn active_documents(&self) -> Vec<Uuid> {
        self.rooms.iter().map(|entry| *entry.key()).collect()
    }
}

impl Broadcaster for RoomManager {
    fn publish(&self, room_id: Uuid, event: RoomEvent) -> usize {
        match self.get(&room_id) {
            Some(room) => room.publish(event),
            // Nobody is watching this document
            None => 0,
        }
    }
}
