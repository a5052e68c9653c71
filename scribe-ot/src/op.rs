//! Op and Update model.
//!
//! An [`Op`] is one atomic edit at a character offset into the document's
//! concatenated line content. An [`Update`] groups ops submitted together
//! against a base version, with authorship metadata.
//!
//! ```text
//! Update { doc_id, version: 41, ops: [Insert{p:3,"X"}], meta{user, ts, source} }
//!            │
//!            └── applies to version 41, produces version 42
//! ```
//!
//! Positions and lengths count `char`s (Unicode scalar values), never bytes.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::text::char_len;

/// An atomic edit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// Insert `text` at `position`.
    Insert { position: usize, text: String },
    /// Delete `text`, which must be the live content at `position`.
    Delete { position: usize, text: String },
    /// Annotate `text` at `position`. Never mutates content.
    Comment { position: usize, text: String },
}

impl Op {
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Op::Insert { position, text: text.into() }
    }

    pub fn delete(position: usize, text: impl Into<String>) -> Self {
        Op::Delete { position, text: text.into() }
    }

    pub fn comment(position: usize, text: impl Into<String>) -> Self {
        Op::Comment { position, text: text.into() }
    }

    pub fn position(&self) -> usize {
        match self {
            Op::Insert { position, .. } | Op::Delete { position, .. } | Op::Comment { position, .. } => {
                *position
            }
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Op::Insert { text, .. } | Op::Delete { text, .. } | Op::Comment { text, .. } => text,
        }
    }

    /// Length of the op's text in chars.
    pub fn len(&self) -> usize {
        char_len(self.text())
    }

    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    /// An insert or delete with no text changes nothing.
    pub fn is_noop(&self) -> bool {
        match self {
            Op::Insert { text, .. } | Op::Delete { text, .. } => text.is_empty(),
            Op::Comment { .. } => true,
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Op::Insert { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Op::Delete { .. })
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Op::Comment { .. })
    }

    /// Same op kind and text at a different position.
    pub fn at(&self, position: usize) -> Op {
        match self {
            Op::Insert { text, .. } => Op::Insert { position, text: text.clone() },
            Op::Delete { text, .. } => Op::Delete { position, text: text.clone() },
            Op::Comment { text, .. } => Op::Comment { position, text: text.clone() },
        }
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Authorship and timing of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMeta {
    /// Authoring user (None for system edits)
    pub user_id: Option<Uuid>,
    /// First edit time, ms since epoch
    pub start_ts: u64,
    /// Last edit time, ms since epoch
    pub end_ts: u64,
    /// Originating connection, used for de-duplication
    pub source: Option<Uuid>,
}

impl UpdateMeta {
    /// Metadata stamped with the current time.
    pub fn new(user_id: Option<Uuid>) -> Self {
        Self::at(user_id, now_millis())
    }

    /// Metadata for a single instant.
    pub fn at(user_id: Option<Uuid>, ts: u64) -> Self {
        Self {
            user_id,
            start_ts: ts,
            end_ts: ts,
            source: None,
        }
    }

    pub fn with_source(mut self, source: Uuid) -> Self {
        self.source = Some(source);
        self
    }

    /// Widen the time range to cover both `self` and `other`.
    pub fn widened(&self, other: &UpdateMeta) -> UpdateMeta {
        UpdateMeta {
            user_id: self.user_id,
            start_ts: self.start_ts.min(other.start_ts),
            end_ts: self.end_ts.max(other.end_ts),
            source: self.source,
        }
    }

    /// Whether two metadata blocks share authorship.
    pub fn same_author(&self, other: &UpdateMeta) -> bool {
        self.user_id == other.user_id
    }
}

impl Default for UpdateMeta {
    fn default() -> Self {
        Self::at(None, 0)
    }
}

/// One or more ops submitted together against a base version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub doc_id: Uuid,
    /// Applied left to right
    pub ops: Vec<Op>,
    /// Base version the ops apply to. The document is at `version + 1` afterwards.
    pub version: u64,
    pub meta: UpdateMeta,
    /// Connections for which an already-applied update from the same source
    /// marks this one as a retransmission.
    #[serde(default)]
    pub dup_if_source: Vec<Uuid>,
}

impl Update {
    pub fn new(doc_id: Uuid, version: u64, ops: Vec<Op>, meta: UpdateMeta) -> Self {
        Self {
            doc_id,
            ops,
            version,
            meta,
            dup_if_source: Vec::new(),
        }
    }

    /// A single-op update.
    pub fn single(doc_id: Uuid, version: u64, op: Op, meta: UpdateMeta) -> Self {
        Self::new(doc_id, version, vec![op], meta)
    }

    /// An update that occupies a version slot without changing content.
    pub fn noop(doc_id: Uuid, version: u64, meta: UpdateMeta) -> Self {
        Self::new(doc_id, version, Vec::new(), meta)
    }

    /// True when applying the update cannot change content.
    pub fn is_noop(&self) -> bool {
        self.ops.iter().all(Op::is_noop)
    }

    pub fn source(&self) -> Option<Uuid> {
        self.meta.source
    }

    /// Mark as a retransmission candidate for `source`.
    pub fn with_dup_if_source(mut self, source: Uuid) -> Self {
        if !self.dup_if_source.contains(&source) {
            self.dup_if_source.push(source);
        }
        self
    }

    /// Whether `earlier` (already applied) is the original of this retransmission.
    pub fn is_retransmission_of(&self, earlier: &Update) -> bool {
        match earlier.meta.source {
            Some(src) => self.dup_if_source.contains(&src),
            None => false,
        }
    }

    /// Version the document reaches once this update is applied.
    pub fn resulting_version(&self) -> u64 {
        self.version + 1
    }
}

/// A document's content and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocSnapshot {
    pub doc_id: Uuid,
    /// Newline-delimited content
    pub lines: Vec<String>,
    pub version: u64,
}

impl DocSnapshot {
    /// An empty document at version 0.
    pub fn empty(doc_id: Uuid) -> Self {
        Self {
            doc_id,
            lines: vec![String::new()],
            version: 0,
        }
    }

    pub fn from_content(doc_id: Uuid, content: &str, version: u64) -> Self {
        Self {
            doc_id,
            lines: content.split('\n').map(str::to_owned).collect(),
            version,
        }
    }

    /// Lines joined with `\n`.
    pub fn content(&self) -> String {
        self.lines.join("\n")
    }
}
