//! Document authority: the single serialization point per document.
//!
//! ```text
//!  ApplyUpdate(v) ──► DocumentRegistry ──► DocumentAuthority (tokio Mutex per doc)
//!                                            │ 1. v > current?  → VersionConflict
//!                                            │ 2. transform vs history since v
//!                                            │ 3. apply to a copy of content
//!                                            │ 4. append_to_log (retry + backoff)
//!                                            │ 5. commit, version += 1
//!                                            └ 6. publish RoomEvent::Applied
//! ```
//!
//! State per document:
//! `Unloaded → Loading → Ready ⇄ Flushing → Unloading → Unloaded`, plus
//! `Unavailable` after persistence retries are exhausted. An unavailable
//! document drops its memory state and reloads from the store on next access.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use scribe_ot::text::{char_len, clamp_ops};
use scribe_ot::{
    apply_ops, build_diff, compress_raw_updates, rewind_updates, strip_comments, transform, CompressorConfig,
    DiffSpan, DocSnapshot, Op, OtError, Side, Update,
};

use crate::broadcast::{Broadcaster, RoomEvent};
use crate::storage::{DurableStore, StoreError};

/// Lifecycle of an in-memory document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    Unloaded,
    Loading,
    Ready,
    Flushing,
    Unloading,
    /// Writes failed; memory state was discarded
    Unavailable,
}

/// Authority tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    /// Retries of a failed log append before the document goes unavailable
    pub persist_retries: u32,
    /// First retry delay, doubled on each attempt
    pub retry_backoff_ms: u64,
    /// Snapshot and compress history after this many accepted updates
    pub flush_every_updates: usize,
    /// Accepted updates kept in memory for transforming late submissions
    pub max_cached_ops: usize,
    /// Documents idle this long are flushed and unloaded by the sweeper
    pub idle_timeout_secs: u64,
    pub compressor: CompressorConfig,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            persist_retries: 3,
            retry_backoff_ms: 50,
            flush_every_updates: 100,
            max_cached_ops: 200,
            idle_timeout_secs: 600,
            compressor: CompressorConfig::default(),
        }
    }
}

impl AuthorityConfig {
    /// Fast retries and small buffers.
    pub fn for_testing() -> Self {
        Self {
            persist_retries: 2,
            retry_backoff_ms: 1,
            flush_every_updates: 10,
            max_cached_ops: 5,
            idle_timeout_secs: 1,
            compressor: CompressorConfig::for_testing(),
        }
    }
}

/// Why a submission or read was refused.
#[derive(Error, Debug)]
pub enum AuthorityError {
    /// Content does not match what an op claims. The client has diverged.
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("doc {doc_id}: submitted version {submitted} is ahead of current version {current}")]
    VersionConflict { doc_id: Uuid, submitted: u64, current: u64 },
    #[error("transform precondition violated: {0}")]
    TransformPrecondition(String),
    #[error("persistence error: {0}")]
    Persistence(#[from] StoreError),
    #[error("document {0} is unavailable for writes")]
    Unavailable(Uuid),
    #[error("invalid version range {from}..{to} (current version {current})")]
    InvalidRange { from: u64, to: u64, current: u64 },
}

impl AuthorityError {
    /// The client must reload the document before editing again.
    pub fn requires_resync(&self) -> bool {
        matches!(
            self,
            AuthorityError::Consistency(_)
                | AuthorityError::VersionConflict { .. }
                | AuthorityError::TransformPrecondition(_)
                | AuthorityError::Unavailable(_)
        )
    }
}

impl From<OtError> for AuthorityError {
    fn from(e: OtError) -> Self {
        match e {
            OtError::Consistency { .. } => AuthorityError::Consistency(e.to_string()),
            OtError::TransformPrecondition(msg) => AuthorityError::TransformPrecondition(msg),
        }
    }
}

/// Result of an accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Applied as `update`; the document is now at `version`.
    Applied { version: u64, update: Update },
    /// A retransmission of an update that was already applied.
    Duplicate { version: u64 },
}

impl SubmitOutcome {
    /// Document version once the submission is reflected.
    pub fn version(&self) -> u64 {
        match self {
            SubmitOutcome::Applied { version, .. } | SubmitOutcome::Duplicate { version } => *version,
        }
    }
}

struct DocInner {
    state: DocState,
    content: String,
    version: u64,
    /// Most recent accepted updates, contiguous, ending at `version - 1`
    recent: VecDeque<Update>,
    /// Accepted updates not yet compressed into history
    unflushed: Vec<Update>,
}

impl DocInner {
    fn unloaded() -> Self {
        Self {
            state: DocState::Unloaded,
            content: String::new(),
            version: 0,
            recent: VecDeque::new(),
            unflushed: Vec::new(),
        }
    }

    fn clear(&mut self, state: DocState) {
        *self = Self::unloaded();
        self.state = state;
    }
}

/// Owns one document's content and version.
pub struct DocumentAuthority {
    doc_id: Uuid,
    store: Arc<dyn DurableStore>,
    broadcaster: Arc<dyn Broadcaster>,
    config: AuthorityConfig,
    inner: Mutex<DocInner>,
    last_access: parking_lot::Mutex<Instant>,
}

impl DocumentAuthority {
    pub fn new(
        doc_id: Uuid,
        store: Arc<dyn DurableStore>,
        broadcaster: Arc<dyn Broadcaster>,
        config: AuthorityConfig,
    ) -> Self {
        Self {
            doc_id,
            store,
            broadcaster,
            config,
            inner: Mutex::new(DocInner::unloaded()),
            last_access: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub fn doc_id(&self) -> Uuid {
        self.doc_id
    }

    pub async fn state(&self) -> DocState {
        self.inner.lock().await.state
    }

    /// Time since the last submit or read.
    pub fn idle_for(&self) -> Duration {
        self.last_access.lock().elapsed()
    }

    fn touch(&self) {
        *self.last_access.lock() = Instant::now();
    }

    // ─── Submit ───────────────────────────────────────────────────────

    /// Accept `update` at its base version.
    ///
    /// Rejections are also published to the room so the originating
    /// connection hears about them.
    pub async fn submit(&self, update: Update) -> Result<SubmitOutcome, AuthorityError> {
        let source = update.meta.source;
        let result = self.submit_inner(update).await;
        if let Err(e) = &result {
            self.broadcaster.publish(
                self.doc_id,
                RoomEvent::Error {
                    doc_id: self.doc_id,
                    source,
                    message: e.to_string(),
                    resync: e.requires_resync(),
                },
            );
        }
        result
    }

    async fn submit_inner(&self, update: Update) -> Result<SubmitOutcome, AuthorityError> {
        let mut inner = self.inner.lock().await;
        self.touch();
        self.ensure_ready(&mut inner)?;

        if update.doc_id != self.doc_id {
            return Err(AuthorityError::Consistency(format!(
                "update for doc {} routed to doc {}",
                update.doc_id, self.doc_id
            )));
        }

        let base = update.version;
        if base > inner.version {
            log::error!(
                "Doc {}: update from {:?} at version {base} is ahead of current version {}",
                self.doc_id,
                update.meta.source,
                inner.version
            );
            return Err(AuthorityError::VersionConflict {
                doc_id: self.doc_id,
                submitted: base,
                current: inner.version,
            });
        }

        let history = self.history_since(&inner, base)?;
        let mut ops = strip_comments(&update.ops);
        clamp_ops(&mut ops, length_before(&inner.content, &history));
        for past in history {
            if update.is_retransmission_of(&past) {
                log::debug!(
                    "Doc {}: retransmission at base {base} already applied as version {}",
                    self.doc_id,
                    past.resulting_version()
                );
                let version = past.resulting_version();
                self.broadcaster
                    .publish(self.doc_id, RoomEvent::Applied { update: past, dup: true });
                return Ok(SubmitOutcome::Duplicate { version });
            }
            ops = transform(&ops, &past.ops, Side::Right).map_err(|e| {
                log::error!("Doc {}: transform against version {} failed: {e}", self.doc_id, past.version);
                AuthorityError::from(e)
            })?;
        }

        let mut content = inner.content.clone();
        if let Err(e) = apply_ops(&mut content, &ops) {
            log::error!("Doc {}: rejected update at base {base}: {e}", self.doc_id);
            return Err(e.into());
        }

        let applied = Update::new(self.doc_id, inner.version, ops, update.meta);
        if let Err(e) = self.persist(&applied).await {
            log::error!(
                "Doc {}: giving up on persisting version {} after {} retries: {e}",
                self.doc_id,
                applied.resulting_version(),
                self.config.persist_retries
            );
            inner.clear(DocState::Unavailable);
            return Err(AuthorityError::Unavailable(self.doc_id));
        }

        inner.content = content;
        inner.version += 1;
        inner.recent.push_back(applied.clone());
        while inner.recent.len() > self.config.max_cached_ops {
            inner.recent.pop_front();
        }
        inner.unflushed.push(applied.clone());

        let version = inner.version;
        let receivers = self.broadcaster.publish(
            self.doc_id,
            RoomEvent::Applied {
                update: applied.clone(),
                dup: false,
            },
        );
        log::debug!("Doc {}: applied version {version}, published to {receivers} peers", self.doc_id);

        if inner.unflushed.len() >= self.config.flush_every_updates {
            if let Err(e) = self.flush_locked(&mut inner) {
                log::warn!("Doc {}: periodic flush failed: {e}", self.doc_id);
            }
        }

        Ok(SubmitOutcome::Applied {
            version,
            update: applied,
        })
    }

    /// Append to the log, retrying with exponential backoff.
    async fn persist(&self, update: &Update) -> Result<(), StoreError> {
        let mut backoff = Duration::from_millis(self.config.retry_backoff_ms);
        let mut attempt = 0;
        loop {
            match self.store.append_to_log(update) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.persist_retries => {
                    attempt += 1;
                    log::warn!(
                        "Doc {}: persisting version {} failed (retry {attempt}/{}): {e}",
                        self.doc_id,
                        update.resulting_version(),
                        self.config.persist_retries
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    // ─── Loading ──────────────────────────────────────────────────────

    fn ensure_ready(&self, inner: &mut DocInner) -> Result<(), AuthorityError> {
        let previous = inner.state;
        if !matches!(previous, DocState::Unloaded | DocState::Unavailable) {
            return Ok(());
        }

        inner.state = DocState::Loading;
        match self.load(inner) {
            Ok(()) => {
                inner.state = DocState::Ready;
                log::info!("Loaded doc {} at version {}", self.doc_id, inner.version);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to load doc {}: {e}", self.doc_id);
                inner.clear(previous);
                Err(e)
            }
        }
    }

    /// Snapshot plus the log tail written after it.
    fn load(&self, inner: &mut DocInner) -> Result<(), AuthorityError> {
        let (mut content, mut version) = match self.store.load(self.doc_id)? {
            Some(snapshot) => (snapshot.content(), snapshot.version),
            None => (String::new(), 0),
        };

        let tail = self.store.read_log(self.doc_id, version, u64::MAX)?;
        for update in &tail {
            if update.version != version {
                return Err(AuthorityError::Consistency(format!(
                    "log for doc {} jumps from version {version} to {}",
                    self.doc_id, update.version
                )));
            }
            apply_ops(&mut content, &update.ops).map_err(|e| e.within(format!("replaying version {version}")))?;
            version += 1;
        }
        if !tail.is_empty() {
            log::debug!("Doc {}: replayed {} logged updates", self.doc_id, tail.len());
        }

        let history_end = self
            .store
            .last_history_entry(self.doc_id)?
            .map_or(0, |last| last.resulting_version());

        inner.unflushed = self.store.read_log(self.doc_id, history_end, version)?;
        let skip = tail.len().saturating_sub(self.config.max_cached_ops);
        inner.recent = tail.into_iter().skip(skip).collect();
        inner.content = content;
        inner.version = version;
        Ok(())
    }

    /// Accepted updates with base versions `from..current`, in order.
    fn history_since(&self, inner: &DocInner, from: u64) -> Result<Vec<Update>, AuthorityError> {
        if from >= inner.version {
            return Ok(Vec::new());
        }
        if inner.recent.front().is_some_and(|first| first.version <= from) {
            return Ok(inner.recent.iter().filter(|u| u.version >= from).cloned().collect());
        }

        let updates = self.store.read_log(self.doc_id, from, inner.version)?;
        let contiguous = updates.len() as u64 == inner.version - from
            && updates.iter().zip(from..).all(|(u, v)| u.version == v);
        if !contiguous {
            return Err(AuthorityError::Consistency(format!(
                "log for doc {} is missing updates between versions {from} and {}",
                self.doc_id, inner.version
            )));
        }
        Ok(updates)
    }

    // ─── Flush / unload ───────────────────────────────────────────────

    /// Save a snapshot and compress pending updates into history.
    pub async fn flush(&self) -> Result<(), AuthorityError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            DocState::Unavailable => Err(AuthorityError::Unavailable(self.doc_id)),
            _ => self.flush_locked(&mut inner),
        }
    }

    fn flush_locked(&self, inner: &mut DocInner) -> Result<(), AuthorityError> {
        if inner.state != DocState::Ready {
            return Ok(());
        }
        inner.state = DocState::Flushing;
        let result = self.write_out(inner);
        inner.state = DocState::Ready;
        result
    }

    fn write_out(&self, inner: &mut DocInner) -> Result<(), AuthorityError> {
        self.store
            .save(&DocSnapshot::from_content(self.doc_id, &inner.content, inner.version))?;

        if !inner.unflushed.is_empty() {
            let last = self.store.last_history_entry(self.doc_id)?;
            let compressed = compress_raw_updates(last.as_ref(), &inner.unflushed, &self.config.compressor);
            self.store.append_history(self.doc_id, &compressed, last.is_some())?;
            log::debug!(
                "Doc {}: compressed {} updates into {} history entries",
                self.doc_id,
                inner.unflushed.len(),
                compressed.len()
            );
            inner.unflushed.clear();
        }
        Ok(())
    }

    /// Flush, then drop the in-memory state.
    pub async fn unload(&self) -> Result<(), AuthorityError> {
        let mut inner = self.inner.lock().await;
        self.unload_locked(&mut inner)
    }

    /// Unload only if nothing touched the document for `max_idle`.
    pub async fn unload_if_idle(&self, max_idle: Duration) -> Result<bool, AuthorityError> {
        let mut inner = self.inner.lock().await;
        if inner.state != DocState::Ready || self.idle_for() < max_idle {
            return Ok(false);
        }
        self.unload_locked(&mut inner)?;
        Ok(true)
    }

    fn unload_locked(&self, inner: &mut DocInner) -> Result<(), AuthorityError> {
        match inner.state {
            DocState::Unloaded => return Ok(()),
            DocState::Unavailable => {
                inner.clear(DocState::Unloaded);
                return Ok(());
            }
            _ => {}
        }
        self.flush_locked(inner)?;
        inner.state = DocState::Unloading;
        let version = inner.version;
        inner.clear(DocState::Unloaded);
        log::info!("Unloaded doc {} at version {version}", self.doc_id);
        Ok(())
    }

    // ─── Reads ────────────────────────────────────────────────────────

    pub async fn get_snapshot(&self) -> Result<DocSnapshot, AuthorityError> {
        let mut inner = self.inner.lock().await;
        self.touch();
        self.ensure_ready(&mut inner)?;
        Ok(DocSnapshot::from_content(self.doc_id, &inner.content, inner.version))
    }

    /// Updates a reconnecting client at `from` has missed.
    pub async fn get_previous_updates(&self, from: u64) -> Result<Vec<Update>, AuthorityError> {
        let mut inner = self.inner.lock().await;
        self.touch();
        self.ensure_ready(&mut inner)?;
        self.updates_from(&inner, from)
    }

    /// Snapshot and, when `from_version` is given, the updates since then.
    /// Both are taken under one lock so no update falls between them.
    pub async fn join(&self, from_version: Option<u64>) -> Result<(DocSnapshot, Vec<Update>), AuthorityError> {
        let mut inner = self.inner.lock().await;
        self.touch();
        self.ensure_ready(&mut inner)?;
        let updates = match from_version {
            Some(from) => self.updates_from(&inner, from)?,
            None => Vec::new(),
        };
        Ok((DocSnapshot::from_content(self.doc_id, &inner.content, inner.version), updates))
    }

    fn updates_from(&self, inner: &DocInner, from: u64) -> Result<Vec<Update>, AuthorityError> {
        if from > inner.version {
            return Err(AuthorityError::InvalidRange {
                from,
                to: inner.version,
                current: inner.version,
            });
        }
        self.history_since(inner, from)
    }

    /// Tracked-changes overlay of the edits between two versions.
    pub async fn get_diff(&self, from: u64, to: u64) -> Result<Vec<DiffSpan>, AuthorityError> {
        let mut inner = self.inner.lock().await;
        self.touch();
        self.ensure_ready(&mut inner)?;
        if from > to || to > inner.version {
            return Err(AuthorityError::InvalidRange {
                from,
                to,
                current: inner.version,
            });
        }

        let history = self.history_since(&inner, from)?;
        let base = rewind_updates(&inner.content, &history)?;
        let window = &history[..(to - from) as usize];
        let compressed = compress_raw_updates(None, window, &self.config.compressor);
        Ok(build_diff(&base, &compressed)?)
    }

    /// Compressed history, including updates not yet flushed.
    pub async fn get_history(&self) -> Result<Vec<Update>, AuthorityError> {
        let mut inner = self.inner.lock().await;
        self.touch();
        self.ensure_ready(&mut inner)?;
        let mut history = self.store.read_history(self.doc_id)?;
        history.extend(compress_raw_updates(None, &inner.unflushed, &self.config.compressor));
        Ok(history)
    }
}

/// Char length of the document before `history` was applied to reach `content`.
fn length_before(content: &str, history: &[Update]) -> usize {
    let net: i64 = history
        .iter()
        .flat_map(|u| &u.ops)
        .map(|op| match op {
            Op::Insert { .. } => op.len() as i64,
            Op::Delete { .. } => -(op.len() as i64),
            Op::Comment { .. } => 0,
        })
        .sum();
    usize::try_from(char_len(content) as i64 - net).unwrap_or(0)
}

/// Routes calls to one [`DocumentAuthority`] per document.
///
/// An entry is dropped only by the idle sweep, once its authority is unloaded
/// and no caller still holds it, so a document never has two live writers.
pub struct DocumentRegistry {
    docs: DashMap<Uuid, Arc<DocumentAuthority>>,
    store: Arc<dyn DurableStore>,
    broadcaster: Arc<dyn Broadcaster>,
    config: AuthorityConfig,
}

impl DocumentRegistry {
    pub fn new(store: Arc<dyn DurableStore>, broadcaster: Arc<dyn Broadcaster>, config: AuthorityConfig) -> Self {
        Self {
            docs: DashMap::new(),
            store,
            broadcaster,
            config,
        }
    }

    /// The authority for `doc_id`, created on first use.
    pub fn authority(&self, doc_id: Uuid) -> Arc<DocumentAuthority> {
        self.docs
            .entry(doc_id)
            .or_insert_with(|| {
                Arc::new(DocumentAuthority::new(
                    doc_id,
                    self.store.clone(),
                    self.broadcaster.clone(),
                    self.config.clone(),
                ))
            })
            .clone()
    }

    /// Number of registered documents, loaded or not.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    fn authorities(&self) -> Vec<Arc<DocumentAuthority>> {
        self.docs.iter().map(|entry| entry.value().clone()).collect()
    }

    pub async fn submit(&self, update: Update) -> Result<SubmitOutcome, AuthorityError> {
        self.authority(update.doc_id).submit(update).await
    }

    pub async fn join(
        &self,
        doc_id: Uuid,
        from_version: Option<u64>,
    ) -> Result<(DocSnapshot, Vec<Update>), AuthorityError> {
        self.authority(doc_id).join(from_version).await
    }

    pub async fn get_snapshot(&self, doc_id: Uuid) -> Result<DocSnapshot, AuthorityError> {
        self.authority(doc_id).get_snapshot().await
    }

    pub async fn get_previous_updates(&self, doc_id: Uuid, from: u64) -> Result<Vec<Update>, AuthorityError> {
        self.authority(doc_id).get_previous_updates(from).await
    }

    pub async fn get_diff(&self, doc_id: Uuid, from: u64, to: u64) -> Result<Vec<DiffSpan>, AuthorityError> {
        self.authority(doc_id).get_diff(from, to).await
    }

    pub async fn get_history(&self, doc_id: Uuid) -> Result<Vec<Update>, AuthorityError> {
        self.authority(doc_id).get_history().await
    }

    pub async fn flush(&self, doc_id: Uuid) -> Result<(), AuthorityError> {
        match self.docs.get(&doc_id).map(|entry| entry.value().clone()) {
            Some(authority) => authority.flush().await,
            None => Ok(()),
        }
    }

    pub async fn unload(&self, doc_id: Uuid) -> Result<(), AuthorityError> {
        match self.docs.get(&doc_id).map(|entry| entry.value().clone()) {
            Some(authority) => authority.unload().await,
            None => Ok(()),
        }
    }

    pub async fn state(&self, doc_id: Uuid) -> DocState {
        match self.docs.get(&doc_id).map(|entry| entry.value().clone()) {
            Some(authority) => authority.state().await,
            None => DocState::Unloaded,
        }
    }

    /// Flush every document. Returns how many flushed cleanly.
    pub async fn flush_all(&self) -> usize {
        let mut flushed = 0;
        for authority in self.authorities() {
            match authority.flush().await {
                Ok(()) => flushed += 1,
                Err(e) => log::error!("Flush of doc {} failed: {e}", authority.doc_id()),
            }
        }
        flushed
    }

    /// Flush and unload documents idle for at least `max_idle`, then drop
    /// the entries of unloaded documents nobody is using.
    pub async fn unload_idle(&self, max_idle: Duration) -> usize {
        let mut unloaded = 0;
        let doc_ids: Vec<Uuid> = self.docs.iter().map(|entry| *entry.key()).collect();
        for doc_id in doc_ids {
            let Some(authority) = self.docs.get(&doc_id).map(|entry| entry.value().clone()) else {
                continue;
            };
            match authority.unload_if_idle(max_idle).await {
                Ok(true) => unloaded += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Idle unload of doc {doc_id} failed: {e}"),
            }
            drop(authority);
            self.forget_if_unused(doc_id);
        }
        unloaded
    }

    /// Remove the entry when its authority is unloaded and only the map holds it.
    ///
    /// Runs under the shard lock, which every `authority()` clone also takes.
    fn forget_if_unused(&self, doc_id: Uuid) {
        let removed = self.docs.remove_if(&doc_id, |_, authority| {
            Arc::strong_count(authority) == 1
                && authority
                    .inner
                    .try_lock()
                    .is_ok_and(|inner| inner.state == DocState::Unloaded)
        });
        if removed.is_some() {
            log::debug!("Dropped registry entry for doc {doc_id}");
        }
    }

    /// Periodically unload idle documents. Stops once the registry is dropped.
    pub fn spawn_idle_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let registry = Arc::downgrade(self);
        let max_idle = Duration::from_secs(self.config.idle_timeout_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick fires immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let unloaded = registry.unload_idle(max_idle).await;
                if unloaded > 0 {
                    log::info!("Idle sweeper unloaded {unloaded} documents");
                }
            }
        })
    }
}
