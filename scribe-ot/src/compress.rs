//! Update compression.
//!
//! Folds a run of updates into the smallest equivalent sequence. Merging only
//! happens between single-op updates from the same author that arrive close
//! together in time:
//!
//! ```text
//!   i"foo"@3  +  i"bar"@6             ->  i"foobar"@3
//!   d"b"@1    +  d"a"@0               ->  d"ab"@0
//!   i"hello"@0 + d"ll"@2              ->  i"heo"@0
//!   d"one two three"@0 + i"one 2 three"@0
//!                                     ->  d"two"@4, i"2"@4
//! ```
//!
//! Version slots are never dropped: an update whose ops cancel out becomes an
//! empty insert (or an empty op list once regrouped).

use serde::{Deserialize, Serialize};

use crate::op::{Op, Update};
use crate::text::{char_len, char_slice, inject, remove};

/// Limits on what may be merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorConfig {
    /// Largest merged insert or delete, in chars
    pub max_update_size: usize,
    /// Largest gap between two updates that may still be merged
    pub max_time_between_updates_ms: u64,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            max_update_size: 2 * 1024 * 1024,
            max_time_between_updates_ms: 60_000,
        }
    }
}

impl CompressorConfig {
    /// Small ceiling so tests can exercise the size limit cheaply.
    pub fn for_testing() -> Self {
        Self {
            max_update_size: 64,
            max_time_between_updates_ms: 60_000,
        }
    }
}

fn merged(first: &Update, second: &Update, ops: Vec<Op>) -> Update {
    Update {
        doc_id: first.doc_id,
        ops,
        version: second.version,
        meta: first.meta.widened(&second.meta),
        dup_if_source: Vec::new(),
    }
}

/// Try to merge two chronologically adjacent single-op updates.
///
/// Returns one update when merged, otherwise both unchanged and in order.
/// A delete followed by an insert at the same position may come back as a
/// delete+insert pair covering only the changed text.
pub fn compress(first: &Update, second: &Update, config: &CompressorConfig) -> Vec<Update> {
    let unchanged = || vec![first.clone(), second.clone()];

    let ([op1], [op2]) = (first.ops.as_slice(), second.ops.as_slice()) else {
        return unchanged();
    };
    if !first.meta.same_author(&second.meta) {
        return unchanged();
    }
    if second.meta.start_ts.saturating_sub(first.meta.end_ts) > config.max_time_between_updates_ms {
        return unchanged();
    }

    let size = op1.len().saturating_add(op2.len());
    match (op1, op2) {
        (Op::Insert { position: p1, text: t1 }, Op::Insert { position: p2, text: t2 })
            if p1 <= p2 && *p2 <= p1.saturating_add(char_len(t1)) && size < config.max_update_size =>
        {
            vec![merged(first, second, vec![Op::insert(*p1, inject(t1, p2 - p1, t2))])]
        }
        (Op::Delete { position: p1, text: t1 }, Op::Delete { position: p2, text: t2 })
            if p2 <= p1 && *p1 <= p2.saturating_add(char_len(t2)) && size < config.max_update_size =>
        {
            vec![merged(first, second, vec![Op::delete(*p2, inject(t2, p1 - p2, t1))])]
        }
        (Op::Insert { position: p1, text: t1 }, Op::Delete { position: p2, text: t2 })
            if p1 <= p2 && *p2 <= p1.saturating_add(char_len(t1)) =>
        {
            let offset = p2 - p1;
            let removed_len = char_len(t2);
            if char_slice(t1, offset, offset.saturating_add(removed_len)) != t2.as_str() {
                return unchanged();
            }
            vec![merged(first, second, vec![Op::insert(*p1, remove(t1, offset, removed_len))])]
        }
        (Op::Delete { position: p1, text: t1 }, Op::Insert { position: p2, text: t2 }) if p1 == p2 => {
            let ops = diff_as_ops(*p1, t1, t2);
            if ops.is_empty() {
                return vec![merged(first, second, vec![Op::insert(*p1, "")])];
            }
            ops.into_iter().map(|op| merged(first, second, vec![op])).collect()
        }
        _ => unchanged(),
    }
}

/// Minimal delete/insert turning `before` into `after`, both located at `position`.
///
/// Trims the common prefix and suffix and emits only the changed middle.
fn diff_as_ops(position: usize, before: &str, after: &str) -> Vec<Op> {
    let a: Vec<char> = before.chars().collect();
    let b: Vec<char> = after.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let max_suffix = a.len().min(b.len()) - prefix;
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();

    let deleted = char_slice(before, prefix, a.len() - suffix);
    let inserted = char_slice(after, prefix, b.len() - suffix);

    let mut ops = Vec::new();
    if !deleted.is_empty() {
        ops.push(Op::delete(position.saturating_add(prefix), deleted));
    }
    if !inserted.is_empty() {
        ops.push(Op::insert(position.saturating_add(prefix), inserted));
    }
    ops
}

/// Split every update into single-op updates sharing its version and metadata.
/// Comments are dropped; an update with nothing left becomes one empty insert.
pub fn convert_to_single_op_updates(updates: &[Update]) -> Vec<Update> {
    let mut out = Vec::with_capacity(updates.len());
    for update in updates {
        let mut any = false;
        for op in update.ops.iter().filter(|op| !op.is_comment()) {
            any = true;
            out.push(Update::single(update.doc_id, update.version, op.clone(), update.meta.clone()));
        }
        if !any {
            out.push(Update::single(update.doc_id, update.version, Op::insert(0, ""), update.meta.clone()));
        }
    }
    out
}

/// Regroup consecutive single-op updates that share a version. Empty inserts
/// are dropped from the op list but the update itself is kept.
pub fn concat_updates_with_same_version(updates: Vec<Update>) -> Vec<Update> {
    let mut out: Vec<Update> = Vec::with_capacity(updates.len());
    for update in updates {
        let keep = |op: &Op| !(op.is_insert() && op.is_empty());
        match out.last_mut() {
            Some(last) if last.version == update.version => {
                last.ops.extend(update.ops.into_iter().filter(keep));
            }
            _ => {
                let ops = update.ops.into_iter().filter(keep).collect();
                out.push(Update::new(update.doc_id, update.version, ops, update.meta));
            }
        }
    }
    out
}

/// Merge a chronological run of single-op updates pairwise, left to right.
///
/// The last op of a version that spans several single-op updates is never
/// merged forward into a later version, so every version left in the output
/// still replays to the same content it had before compression.
pub fn compress_updates(updates: Vec<Update>, config: &CompressorConfig) -> Vec<Update> {
    let mut out: Vec<Update> = Vec::with_capacity(updates.len());
    for update in updates {
        let Some(last) = out.pop() else {
            out.push(update);
            continue;
        };
        let closes_group = out.last().is_some_and(|prev| prev.version == last.version);
        if closes_group && update.version != last.version {
            out.push(last);
            out.push(update);
        } else {
            out.extend(compress(&last, &update, config));
        }
    }
    out
}

/// Compress `raw` updates, continuing from the last previously stored update.
///
/// A multi-op predecessor was already regrouped and is left untouched.
pub fn compress_raw_updates(
    last_previous: Option<&Update>,
    raw: &[Update],
    config: &CompressorConfig,
) -> Vec<Update> {
    match last_previous {
        Some(prev) if prev.ops.len() > 1 => {
            let mut out = vec![prev.clone()];
            out.extend(compress_raw_updates(None, raw, config));
            out
        }
        Some(prev) => {
            let mut all = Vec::with_capacity(raw.len() + 1);
            all.push(prev.clone());
            all.extend_from_slice(raw);
            compress_all(&all, config)
        }
        None => compress_all(raw, config),
    }
}

fn compress_all(updates: &[Update], config: &CompressorConfig) -> Vec<Update> {
    let singles = convert_to_single_op_updates(updates);
    concat_updates_with_same_version(compress_updates(singles, config))
}
