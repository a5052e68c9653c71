//! Binary protocol for OT document synchronization.
//!
//! Every WebSocket binary frame carries one bincode-encoded [`SyncMessage`].
//!
//! ```text
//! client                                   server
//!   │ JoinDoc{doc, peer, from_version}  ──►  │
//!   │ ◄── JoinedDoc{lines, version, updates} │
//!   │ ApplyUpdate(update @ base v)      ──►  │ transform + apply + persist
//!   │ ◄── Ack{doc, v+1}                      │ (originator)
//!   │                                        │ UpdateApplied(update) ──► other peers
//!   │ ◄── UpdateError{message, resync}       │ (originator, on rejection)
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use scribe_ot::Update;

/// Peer identity with display metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerInfo {
    /// Connection id, stamped as `meta.source` on this peer's updates
    pub peer_id: Uuid,
    pub name: String,
    pub user_id: Option<Uuid>,
}

impl PeerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), name)
    }

    /// Create with explicit peer_id (for testing)
    pub fn with_id(peer_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            peer_id,
            name: name.into(),
            user_id: None,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMessage {
    /// Subscribe to a document. With `from_version`, the reply carries the
    /// updates since that version instead of relying on the snapshot alone.
    JoinDoc {
        doc_id: Uuid,
        peer: PeerInfo,
        from_version: Option<u64>,
    },
    /// Snapshot at join time, plus catch-up updates when requested.
    JoinedDoc {
        doc_id: Uuid,
        lines: Vec<String>,
        version: u64,
        updates: Vec<Update>,
    },
    /// Client edit at a base version.
    ApplyUpdate(Update),
    /// Authoritative update produced by another connection.
    UpdateApplied(Update),
    /// The sender's own update was applied; the document is now at `version`.
    Ack { doc_id: Uuid, version: u64 },
    /// The sender's update was rejected.
    UpdateError {
        doc_id: Uuid,
        message: String,
        /// Client must reload the document before editing again
        resync: bool,
    },
    LeaveDoc { doc_id: Uuid },
    Ping,
    Pong,
}

impl SyncMessage {
    /// Document this message concerns, if any.
    pub fn doc_id(&self) -> Option<Uuid> {
        match self {
            Self::JoinDoc { doc_id, .. }
            | Self::JoinedDoc { doc_id, .. }
            | Self::Ack { doc_id, .. }
            | Self::UpdateError { doc_id, .. }
            | Self::LeaveDoc { doc_id } => Some(*doc_id),
            Self::ApplyUpdate(update) | Self::UpdateApplied(update) => Some(update.doc_id),
            Self::Ping | Self::Pong => None,
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(msg)
    }
}

/// Protocol errors.
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Deserialization error: {0}")]
    Deserialization(String),
    #[error("Connection closed")]
    ConnectionClosed,
}
