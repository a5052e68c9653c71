//! # scribe-ot — Operational transform core for Scribe
//!
//! Pure, synchronous text OT: the op model, transform, update compression,
//! and the diff/rewind engine used to replay history. Nothing in this crate
//! performs I/O.
//!
//! ## Architecture
//!
//! ```text
//!   client op ──► transform ──► apply_ops ──► update log
//!                 (vs history)                    │
//!                                   ┌─────────────┴─────────────┐
//!                                   ▼                           ▼
//!                               compress                   rewind / diff
//!                          (compact history)          (past versions, overlay)
//! ```
//!
//! ## Modules
//!
//! - [`op`] — `Op`, `Update`, `UpdateMeta`, `DocSnapshot`
//! - [`text`] — char-indexed application of ops to content
//! - [`transform`] — convergent transform of concurrent ops
//! - [`compress`] — merging adjacent updates
//! - [`diff`] — tracked-changes overlay and rewind

pub mod compress;
pub mod diff;
pub mod error;
pub mod op;
pub mod text;
pub mod transform;

pub use compress::{compress, compress_raw_updates, CompressorConfig};
pub use diff::{
    apply_update_to_diff, build_diff, compress_diff, diff_content, rewind_op, rewind_update, rewind_updates,
    DiffSpan,
};
pub use error::OtError;
pub use op::{now_millis, DocSnapshot, Op, Update, UpdateMeta};
pub use text::{apply_op, apply_ops, clamp_ops, strip_comments};
pub use transform::{transform, transform_op, transform_x, Side};
