//! Diff overlay and rewind.
//!
//! A diff is the content at some base version annotated with what later
//! updates did to it:
//!
//! ```text
//!   [Unchanged "foobar"]  + i"baz"@3
//!     -> [Unchanged "foo"] [Inserted "baz" {meta}] [Unchanged "bar"]
//! ```
//!
//! Deleted spans keep their text but take up no room in the live document,
//! so op positions only count unchanged and inserted spans.
//!
//! Rewinding goes the other way: starting from current content it undoes
//! updates newest first to recover the content at an earlier version.

use serde::{Deserialize, Serialize};

use crate::error::OtError;
use crate::op::{Op, Update, UpdateMeta};
use crate::text::{char_len, char_slice, char_tail, inject, remove};

/// A run of text in a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffSpan {
    Unchanged { text: String },
    Inserted { text: String, meta: UpdateMeta },
    Deleted { text: String, meta: UpdateMeta },
}

impl DiffSpan {
    pub fn unchanged(text: impl Into<String>) -> Self {
        DiffSpan::Unchanged { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            DiffSpan::Unchanged { text } | DiffSpan::Inserted { text, .. } | DiffSpan::Deleted { text, .. } => {
                text
            }
        }
    }

    /// Same span kind and metadata with different text.
    fn with_text(&self, text: &str) -> DiffSpan {
        match self {
            DiffSpan::Unchanged { .. } => DiffSpan::Unchanged { text: text.to_owned() },
            DiffSpan::Inserted { meta, .. } => DiffSpan::Inserted { text: text.to_owned(), meta: meta.clone() },
            DiffSpan::Deleted { meta, .. } => DiffSpan::Deleted { text: text.to_owned(), meta: meta.clone() },
        }
    }

    fn is_deleted(&self) -> bool {
        matches!(self, DiffSpan::Deleted { .. })
    }
}

/// Live content a diff describes (unchanged and inserted spans).
pub fn diff_content(diff: &[DiffSpan]) -> String {
    diff.iter().filter(|s| !s.is_deleted()).map(DiffSpan::text).collect()
}

/// Split `diff` at live offset `offset`. Deleted spans before the split point
/// are always consumed.
fn consume_to_offset(diff: &mut Vec<DiffSpan>, remaining: &mut Vec<DiffSpan>, offset: usize) {
    let mut position = 0;
    while let Some(span) = remaining.pop() {
        if span.is_deleted() {
            diff.push(span);
            continue;
        }
        let len = char_len(span.text());
        if position + len >= offset {
            let split = offset - position;
            if split > 0 {
                diff.push(span.with_text(char_slice(span.text(), 0, split)));
            }
            if split < len {
                remaining.push(span.with_text(char_tail(span.text(), split)));
            }
            return;
        }
        position += len;
        diff.push(span);
    }
}

/// Merge two adjacent inserted spans by the same author.
fn join_inserted(a: &DiffSpan, b: &DiffSpan) -> Option<DiffSpan> {
    match (a, b) {
        (DiffSpan::Inserted { text: ta, meta: ma }, DiffSpan::Inserted { text: tb, meta: mb })
            if ma.same_author(mb) =>
        {
            Some(DiffSpan::Inserted {
                text: format!("{ta}{tb}"),
                meta: ma.widened(mb),
            })
        }
        _ => None,
    }
}

fn apply_op_to_diff(diff: Vec<DiffSpan>, op: &Op, meta: &UpdateMeta) -> Result<Vec<DiffSpan>, OtError> {
    // `remaining` is kept reversed so the next span is popped from the end.
    let mut remaining: Vec<DiffSpan> = diff.into_iter().rev().collect();
    let mut out: Vec<DiffSpan> = Vec::with_capacity(remaining.len() + 2);
    consume_to_offset(&mut out, &mut remaining, op.position());

    match op {
        Op::Insert { text, .. } => {
            let mut span = DiffSpan::Inserted { text: text.clone(), meta: meta.clone() };
            if let Some(joined) = out.last().and_then(|prev| join_inserted(prev, &span)) {
                out.pop();
                span = joined;
            }
            if let Some(joined) = remaining.last().and_then(|next| join_inserted(&span, next)) {
                remaining.pop();
                span = joined;
            }
            out.push(span);
        }
        Op::Delete { text, position } => {
            let mut left: &str = text;
            while !left.is_empty() {
                let Some(span) = remaining.pop() else {
                    return Err(OtError::consistency(
                        format!("diff delete at {position}"),
                        left,
                        "end of document",
                    ));
                };
                if span.is_deleted() {
                    out.push(span);
                    continue;
                }
                let span_len = char_len(span.text());
                let take = span_len.min(char_len(left));
                let covered = char_slice(span.text(), 0, take);
                let claimed = char_slice(left, 0, take);
                if covered != claimed {
                    return Err(OtError::consistency(format!("diff delete at {position}"), claimed, covered));
                }
                if take < span_len {
                    remaining.push(span.with_text(char_tail(span.text(), take)));
                }
                if let DiffSpan::Unchanged { .. } = span {
                    out.push(DiffSpan::Deleted { text: covered.to_owned(), meta: meta.clone() });
                }
                // Deleting inserted text cancels it outright.
                left = char_tail(left, take);
            }
        }
        Op::Comment { .. } => {}
    }

    out.extend(remaining.into_iter().rev());
    Ok(out)
}

/// Apply one update's ops to a diff.
pub fn apply_update_to_diff(diff: Vec<DiffSpan>, update: &Update) -> Result<Vec<DiffSpan>, OtError> {
    update
        .ops
        .iter()
        .try_fold(diff, |diff, op| apply_op_to_diff(diff, op, &update.meta))
}

/// Fold `next` into `last` when both are the same kind by the same author.
fn absorb(last: &mut DiffSpan, next: &DiffSpan) -> bool {
    match (last, next) {
        (DiffSpan::Unchanged { text }, DiffSpan::Unchanged { text: more }) => {
            text.push_str(more);
            true
        }
        (DiffSpan::Inserted { text, meta }, DiffSpan::Inserted { text: more, meta: other })
        | (DiffSpan::Deleted { text, meta }, DiffSpan::Deleted { text: more, meta: other })
            if meta.same_author(other) =>
        {
            text.push_str(more);
            *meta = meta.widened(other);
            true
        }
        _ => false,
    }
}

/// Merge adjacent spans of the same kind and author, widening timestamps.
pub fn compress_diff(diff: Vec<DiffSpan>) -> Vec<DiffSpan> {
    let mut out: Vec<DiffSpan> = Vec::with_capacity(diff.len());
    for span in diff {
        let absorbed = out.last_mut().is_some_and(|last| absorb(last, &span));
        if !absorbed {
            out.push(span);
        }
    }
    out
}

/// Diff of `initial` content against the result of applying `updates` in order.
pub fn build_diff(initial: &str, updates: &[Update]) -> Result<Vec<DiffSpan>, OtError> {
    let mut diff = if initial.is_empty() {
        Vec::new()
    } else {
        vec![DiffSpan::unchanged(initial)]
    };
    for update in updates {
        diff = apply_update_to_diff(diff, update)
            .map_err(|e| e.within(format!("update at version {}", update.version)))?;
    }
    Ok(compress_diff(diff))
}

/// Content before `op` was applied to `content`.
///
/// An insert whose span lies past the end is treated as ending at end-of-content.
pub fn rewind_op(content: &str, op: &Op) -> Result<String, OtError> {
    match op {
        Op::Insert { position, text } => {
            let len = char_len(text);
            let p = (*position).min(char_len(content).saturating_sub(len));
            let found = char_slice(content, p, p + len);
            if found != text.as_str() {
                return Err(OtError::consistency(format!("rewind insert at {position}"), text.clone(), found));
            }
            Ok(remove(content, p, len))
        }
        Op::Delete { position, text } => Ok(inject(content, *position, text)),
        Op::Comment { .. } => Ok(content.to_owned()),
    }
}

/// Content before `update` was applied.
pub fn rewind_update(content: &str, update: &Update) -> Result<String, OtError> {
    update
        .ops
        .iter()
        .rev()
        .try_fold(content.to_owned(), |content, op| rewind_op(&content, op))
}

/// Content before all of `updates` (chronological order) were applied.
pub fn rewind_updates(content: &str, updates: &[Update]) -> Result<String, OtError> {
    updates.iter().rev().try_fold(content.to_owned(), |content, update| {
        rewind_update(&content, update).map_err(|e| e.within(format!("update at version {}", update.version)))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::apply_ops;
    use uuid::Uuid;

    fn update(ops: Vec<Op>, user: Uuid, ts: u64) -> Update {
        Update::new(Uuid::nil(), 0, ops, UpdateMeta::at(Some(user), ts))
    }

    fn inserted(text: &str, user: Uuid, ts: u64) -> DiffSpan {
        DiffSpan::Inserted { text: text.into(), meta: UpdateMeta::at(Some(user), ts) }
    }

    fn deleted(text: &str, user: Uuid, ts: u64) -> DiffSpan {
        DiffSpan::Deleted { text: text.into(), meta: UpdateMeta::at(Some(user), ts) }
    }

    #[test]
    fn test_insert_splits_unchanged() {
        let user = Uuid::new_v4();
        let diff = apply_update_to_diff(vec![DiffSpan::unchanged("foobar")], &update(vec![Op::insert(3, "baz")], user, 1))
            .unwrap();
        assert_eq!(
            diff,
            vec![DiffSpan::unchanged("foo"), inserted("baz", user, 1), DiffSpan::unchanged("bar")]
        );
    }

    #[test]
    fn test_insert_at_edges() {
        let user = Uuid::new_v4();
        let diff = apply_update_to_diff(vec![DiffSpan::unchanged("ab")], &update(vec![Op::insert(0, "X")], user, 1)).unwrap();
        assert_eq!(diff, vec![inserted("X", user, 1), DiffSpan::unchanged("ab")]);

        let diff = apply_update_to_diff(vec![DiffSpan::unchanged("ab")], &update(vec![Op::insert(2, "X")], user, 1)).unwrap();
        assert_eq!(diff, vec![DiffSpan::unchanged("ab"), inserted("X", user, 1)]);
    }

    #[test]
    fn test_insert_inside_own_insert_merges() {
        let user = Uuid::new_v4();
        let diff = vec![DiffSpan::unchanged("ab"), inserted("xyz", user, 1)];
        let diff = apply_update_to_diff(diff, &update(vec![Op::insert(3, "Q")], user, 5)).unwrap();
        assert_eq!(diff[1].text(), "xQyz");
        assert_eq!(diff.len(), 2);
    }

    #[test]
    fn test_insert_inside_other_insert_stays_separate() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let diff = vec![inserted("xyz", alice, 1)];
        let diff = apply_update_to_diff(diff, &update(vec![Op::insert(1, "Q")], bob, 5)).unwrap();
        assert_eq!(diff, vec![inserted("x", alice, 1), inserted("Q", bob, 5), inserted("yz", alice, 1)]);
    }

    #[test]
    fn test_delete_marks_unchanged() {
        let user = Uuid::new_v4();
        let diff = apply_update_to_diff(vec![DiffSpan::unchanged("foobar")], &update(vec![Op::delete(2, "ob")], user, 3))
            .unwrap();
        assert_eq!(
            diff,
            vec![DiffSpan::unchanged("fo"), deleted("ob", user, 3), DiffSpan::unchanged("ar")]
        );
    }

    #[test]
    fn test_delete_of_inserted_cancels() {
        let user = Uuid::new_v4();
        let diff = vec![DiffSpan::unchanged("ab"), inserted("xyz", user, 1), DiffSpan::unchanged("cd")];
        let diff = apply_update_to_diff(diff, &update(vec![Op::delete(1, "bxyzc")], user, 2)).unwrap();
        assert_eq!(
            diff,
            vec![
                DiffSpan::unchanged("a"),
                deleted("b", user, 2),
                deleted("c", user, 2),
                DiffSpan::unchanged("d"),
            ]
        );
        assert_eq!(diff_content(&diff), "ad");
    }

    #[test]
    fn test_positions_skip_deleted_spans() {
        let user = Uuid::new_v4();
        let diff = vec![DiffSpan::unchanged("ab"), deleted("zzz", user, 1), DiffSpan::unchanged("cd")];
        let diff = apply_update_to_diff(diff, &update(vec![Op::delete(2, "c")], user, 2)).unwrap();
        assert_eq!(diff_content(&diff), "abd");
        assert_eq!(diff[1], deleted("zzz", user, 1));
    }

    #[test]
    fn test_delete_mismatch_is_consistency_error() {
        let user = Uuid::new_v4();
        let err = apply_update_to_diff(vec![DiffSpan::unchanged("foobar")], &update(vec![Op::delete(0, "bar")], user, 1))
            .unwrap_err();
        assert!(matches!(err, OtError::Consistency { .. }));

        let err = apply_update_to_diff(vec![DiffSpan::unchanged("foo")], &update(vec![Op::delete(1, "oops")], user, 1))
            .unwrap_err();
        assert!(matches!(err, OtError::Consistency { .. }));
    }

    #[test]
    fn test_compress_diff_merges_same_author() {
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let diff = vec![
            inserted("a", alice, 10),
            inserted("b", alice, 20),
            inserted("c", bob, 30),
            deleted("d", bob, 5),
            deleted("e", bob, 40),
        ];
        let out = compress_diff(diff);
        assert_eq!(out.len(), 3);
        match &out[0] {
            DiffSpan::Inserted { text, meta } => {
                assert_eq!(text, "ab");
                assert_eq!((meta.start_ts, meta.end_ts), (10, 20));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &out[2] {
            DiffSpan::Deleted { text, meta } => {
                assert_eq!(text, "de");
                assert_eq!((meta.start_ts, meta.end_ts), (5, 40));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_build_diff_matches_final_content() {
        let user = Uuid::new_v4();
        let updates = vec![
            update(vec![Op::insert(5, " there")], user, 1),
            update(vec![Op::delete(0, "hello")], user, 2),
            update(vec![Op::insert(0, "hi")], user, 3),
        ];
        let diff = build_diff("hello world", &updates).unwrap();

        let mut content = "hello world".to_string();
        for u in &updates {
            apply_ops(&mut content, &u.ops).unwrap();
        }
        assert_eq!(diff_content(&diff), content);
    }

    #[test]
    fn test_rewind_op_roundtrip() {
        let base = "the quick fox";
        for op in [Op::insert(4, "very "), Op::delete(4, "quick "), Op::insert(13, "!")] {
            let mut applied = base.to_string();
            apply_ops(&mut applied, std::slice::from_ref(&op)).unwrap();
            assert_eq!(rewind_op(&applied, &op).unwrap(), base);
        }
    }

    #[test]
    fn test_rewind_insert_past_end_is_lenient() {
        assert_eq!(rewind_op("abcXY", &Op::insert(10, "XY")).unwrap(), "abc");
        let err = rewind_op("abc", &Op::insert(1, "zz")).unwrap_err();
        assert!(matches!(err, OtError::Consistency { .. }));
    }

    #[test]
    fn test_rewind_updates_newest_first() {
        let user = Uuid::new_v4();
        let mut a = update(vec![Op::insert(0, "ab")], user, 1);
        a.version = 0;
        let mut b = update(vec![Op::delete(0, "a"), Op::insert(1, "c")], user, 2);
        b.version = 1;
        assert_eq!(rewind_updates("bc", &[a.clone(), b.clone()]).unwrap(), "");

        let err = rewind_updates("zz", &[a, b]).unwrap_err();
        match err {
            OtError::Consistency { context, .. } => assert!(context.starts_with("update at version 1")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
