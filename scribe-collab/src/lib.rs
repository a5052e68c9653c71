//! # scribe-collab — Real-time collaboration layer for Scribe
//!
//! Server-authoritative operational transform over WebSockets. One
//! [`DocumentAuthority`] per document orders every edit, persists it, and
//! fans it out to the document's room.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     WebSocket      ┌─────────────┐
//! │ SyncClient  │ ◄─────────────────► │ SyncServer  │
//! │ (per user)  │     Binary Proto    │ (central)   │
//! └──────┬──────┘                     └──────┬──────┘
//!        │                                   │
//!        ▼                                   ▼
//! ┌─────────────┐                     ┌─────────────────┐
//! │ ClientDoc   │                     │ DocumentAuthority│──► DurableStore
//! │ (inflight + │                     │ (transform,     │    (RocksDB / memory)
//! │  pending)   │                     │  apply, persist)│
//! └─────────────┘                     └──────┬──────────┘
//!                                            │ RoomEvent
//!                                    ┌───────┴───────┐
//!                                    │ BroadcastGroup│
//!                                    │ (fan-out)     │
//!                                    └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] — Binary wire protocol (bincode-encoded SyncMessage)
//! - [`authority`] — Per-document ordering, persistence and lifecycle
//! - [`broadcast`] — Room-based fan-out with lag detection
//! - [`storage`] — Snapshots, update log and compressed history
//! - [`server`] — WebSocket sync server
//! - [`client`] — WebSocket sync client with client-side transform

pub mod authority;
pub mod broadcast;
pub mod client;
pub mod protocol;
pub mod server;
pub mod storage;

// Re-exports for convenience
pub use authority::{AuthorityConfig, AuthorityError, DocState, DocumentAuthority, DocumentRegistry, SubmitOutcome};
pub use broadcast::{BroadcastGroup, BroadcastStats, Broadcaster, RoomEvent, RoomManager};
pub use client::{ClientDoc, ClientError, ConnectionState, SyncClient, SyncEvent};
pub use protocol::{PeerInfo, ProtocolError, SyncMessage};
pub use server::{ServerConfig, ServerError, ServerStats, SyncServer};
pub use storage::{DocumentMetadata, DurableStore, MemoryStore, RocksStore, StoreConfig, StoreError};
