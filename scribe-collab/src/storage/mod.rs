//! Durable storage for document snapshots, the update log and compressed history.
//!
//! Architecture:
//! ```text
//! ┌──────────────────┐   append_to_log    ┌──────────────────────────────────┐
//! │ DocumentAuthority│ ─────────────────► │ DurableStore                     │
//! │ (per document)   │   save / history   │                                  │
//! └────────┬─────────┘ ─────────────────► │  snapshots — latest lines+version│
//!          │                              │  log       — every update, raw   │
//!          │ on load: snapshot + log tail │  history   — compressed updates  │
//!          ◄───────────────────────────── │  metadata  — per-doc counters    │
//!                                         └──────────────────────────────────┘
//! ```
//!
//! Log and history entries are keyed by `(doc_id, base version)`, so writing
//! the same update twice replaces it rather than duplicating it.
//!
//! Two implementations: [`RocksStore`] for production and [`MemoryStore`]
//! for tests and storage-less servers.

pub mod memory;
pub mod rocks;

pub use memory::MemoryStore;
pub use rocks::{DocumentMetadata, RocksStore, StoreConfig};

use scribe_ot::{DocSnapshot, Update};
use thiserror::Error;
use uuid::Uuid;

/// Storage errors.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// RocksDB internal error
    #[error("database error: {0}")]
    Database(String),
    #[error("document not found: {0}")]
    NotFound(Uuid),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<rocksdb::Error> for StoreError {
    fn from(e: rocksdb::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Durable document store consumed by the document authority.
///
/// Calls are synchronous; the authority issues at most one write per
/// document at a time.
pub trait DurableStore: Send + Sync {
    /// Latest saved snapshot, if the document was ever saved.
    fn load(&self, doc_id: Uuid) -> Result<Option<DocSnapshot>, StoreError>;

    /// Replace the document's snapshot.
    fn save(&self, snapshot: &DocSnapshot) -> Result<(), StoreError>;

    /// Record an accepted update under its base version.
    fn append_to_log(&self, update: &Update) -> Result<(), StoreError>;

    /// Logged updates with base versions in `from..to`, in version order.
    fn read_log(&self, doc_id: Uuid, from: u64, to: u64) -> Result<Vec<Update>, StoreError>;

    /// Append compressed history entries. With `replace_last`, the current
    /// last entry is removed first (it has been re-compressed into `updates`).
    fn append_history(&self, doc_id: Uuid, updates: &[Update], replace_last: bool) -> Result<(), StoreError>;

    /// All compressed history entries, oldest first.
    fn read_history(&self, doc_id: Uuid) -> Result<Vec<Update>, StoreError>;

    /// Newest compressed history entry.
    fn last_history_entry(&self, doc_id: Uuid) -> Result<Option<Update>, StoreError>;

    /// Every document with a snapshot or log entry.
    fn list_documents(&self) -> Result<Vec<Uuid>, StoreError>;

    /// Remove a document's snapshot, log and history.
    fn delete_document(&self, doc_id: Uuid) -> Result<(), StoreError>;
}
