//! Operational transform for concurrent text ops.
//!
//! Given two op lists generated against the same base version, `transform_x`
//! produces the pair that converges from either application order:
//!
//! ```text
//!            base
//!          a /  \ b
//!           /    \
//!     base·a      base·b
//!          \      /
//!        b' \    / a'
//!            \  /
//!        base·a·b' == base·b·a'
//! ```
//!
//! Same-position inserts are ordered by [`Side`]: the `Right` op is considered
//! to have arrived after the `Left` one and lands after it. Both participants
//! must use opposite sides for the same pair.

use crate::error::OtError;
use crate::op::Op;
use crate::text::{char_len, char_slice, char_tail, inject};

/// Which side of a concurrent pair an op is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Wins same-position insert ties (stays in place).
    Left,
    /// Arrived after the reference op: shifted past a same-position insert.
    Right,
}

/// Map a position through `other`.
///
/// `insert_after` decides the tie when `other` inserts exactly at `pos`.
pub fn transform_position(pos: usize, other: &Op, insert_after: bool) -> usize {
    match other {
        Op::Insert { position, text } => {
            if *position < pos || (*position == pos && insert_after) {
                pos.saturating_add(char_len(text))
            } else {
                pos
            }
        }
        Op::Delete { position, text } => {
            let len = char_len(text);
            if pos <= *position {
                pos
            } else if pos <= position.saturating_add(len) {
                *position
            } else {
                pos - len
            }
        }
        Op::Comment { .. } => pos,
    }
}

/// Push `op` onto `dest`, merging it into the last op when contiguous.
/// Empty inserts and deletes are dropped.
pub fn append(dest: &mut Vec<Op>, op: Op) {
    if (op.is_insert() || op.is_delete()) && op.is_empty() {
        return;
    }
    let merged = match (dest.last(), &op) {
        (Some(Op::Insert { position: lp, text: lt }), Op::Insert { position: p, text: t })
            if *lp <= *p && *p <= lp.saturating_add(char_len(lt)) =>
        {
            Some(Op::insert(*lp, inject(lt, p - lp, t)))
        }
        (Some(Op::Delete { position: lp, text: lt }), Op::Delete { position: p, text: t })
            if *p <= *lp && *lp <= p.saturating_add(char_len(t)) =>
        {
            Some(Op::delete(*p, inject(t, lp - p, lt)))
        }
        _ => None,
    };
    match merged {
        Some(m) => {
            if let Some(last) = dest.last_mut() {
                *last = m;
            }
        }
        None => dest.push(op),
    }
}

/// Transform a single component `op` against `other`, appending the result to `dest`.
fn transform_component(dest: &mut Vec<Op>, op: &Op, other: &Op, side: Side) -> Result<(), OtError> {
    match op {
        Op::Insert { position, text } => {
            let p = transform_position(*position, other, side == Side::Right);
            append(dest, Op::insert(p, text.clone()));
        }
        Op::Delete { position, text } => match other {
            Op::Insert { position: op_p, text: ins } => {
                // A delete straddling a concurrent insert splits around it.
                let mut rest: &str = text;
                if position < op_p {
                    let head = op_p - position;
                    append(dest, Op::delete(*position, char_slice(rest, 0, head)));
                    rest = char_tail(rest, head);
                }
                if !rest.is_empty() {
                    append(dest, Op::delete(position.saturating_add(char_len(ins)), rest));
                }
            }
            Op::Delete { position: op_p, text: del } => {
                let end = position.saturating_add(char_len(text));
                let op_end = op_p.saturating_add(char_len(del));
                if *position >= op_end {
                    append(dest, Op::delete(position - (op_end - op_p), text.clone()));
                } else if end <= *op_p {
                    append(dest, op.clone());
                } else {
                    // Overlap: only the part not already deleted survives.
                    let mut remaining = String::new();
                    if position < op_p {
                        remaining.push_str(char_slice(text, 0, op_p - position));
                    }
                    if end > op_end {
                        remaining.push_str(char_tail(text, op_end - position));
                    }

                    let start = (*position).max(*op_p);
                    let stop = end.min(op_end);
                    let ours = char_slice(text, start - position, stop - position);
                    let theirs = char_slice(del, start - op_p, stop - op_p);
                    if ours != theirs {
                        return Err(OtError::TransformPrecondition(format!(
                            "concurrent deletes remove different text in the same region: '{ours}' vs '{theirs}'"
                        )));
                    }

                    if !remaining.is_empty() {
                        let p = transform_position(*position, other, false);
                        append(dest, Op::delete(p, remaining));
                    }
                }
            }
            Op::Comment { .. } => append(dest, op.clone()),
        },
        Op::Comment { position, text } => match other {
            Op::Insert { position: op_p, text: ins } => {
                if position < op_p && *op_p < position.saturating_add(char_len(text)) {
                    // Insert inside the commented range extends it.
                    dest.push(Op::comment(*position, inject(text, op_p - position, ins)));
                } else {
                    dest.push(Op::comment(transform_position(*position, other, true), text.clone()));
                }
            }
            Op::Delete { position: op_p, text: del } => {
                let end = position.saturating_add(char_len(text));
                let op_end = op_p.saturating_add(char_len(del));
                if *position >= op_end {
                    dest.push(Op::comment(position - (op_end - op_p), text.clone()));
                } else if end <= *op_p {
                    dest.push(op.clone());
                } else {
                    let mut remaining = String::new();
                    if position < op_p {
                        remaining.push_str(char_slice(text, 0, op_p - position));
                    }
                    if end > op_end {
                        remaining.push_str(char_tail(text, op_end - position));
                    }
                    dest.push(Op::comment(transform_position(*position, other, false), remaining));
                }
            }
            Op::Comment { .. } => dest.push(op.clone()),
        },
    }
    Ok(())
}

/// Transform two concurrent op lists against each other.
///
/// Returns `(left', right')` such that `base·left·right' == base·right·left'`.
/// `left` wins same-position insert ties.
pub fn transform_x(left: &[Op], right: &[Op]) -> Result<(Vec<Op>, Vec<Op>), OtError> {
    let mut left_ops: Vec<Op> = left.to_vec();
    let mut new_right: Vec<Op> = Vec::new();

    for right_component in right {
        let mut current = Some(right_component.clone());
        let mut new_left: Vec<Op> = Vec::new();
        let mut k = 0;

        while k < left_ops.len() {
            let Some(rc) = current.take() else { break };
            let mut next: Vec<Op> = Vec::new();
            transform_component(&mut new_left, &left_ops[k], &rc, Side::Left)?;
            transform_component(&mut next, &rc, &left_ops[k], Side::Right)?;
            k += 1;

            match next.len() {
                1 => current = next.pop(),
                0 => {
                    // The right component vanished; the rest of left is unaffected.
                    for op in &left_ops[k..] {
                        append(&mut new_left, op.clone());
                    }
                    break;
                }
                _ => {
                    // The right component split; recurse with the pieces.
                    let (l, r) = transform_x(&left_ops[k..], &next)?;
                    for op in l {
                        append(&mut new_left, op);
                    }
                    for op in r {
                        append(&mut new_right, op);
                    }
                    break;
                }
            }
        }

        if let Some(rc) = current {
            append(&mut new_right, rc);
        }
        left_ops = new_left;
    }

    Ok((left_ops, new_right))
}

/// Transform `ops` so they apply after `other`, which was generated against
/// the same base.
pub fn transform(ops: &[Op], other: &[Op], side: Side) -> Result<Vec<Op>, OtError> {
    match side {
        Side::Left => Ok(transform_x(ops, other)?.0),
        Side::Right => Ok(transform_x(other, ops)?.1),
    }
}

/// Single-op form of [`transform`].
pub fn transform_op(op: &Op, other: &Op, side: Side) -> Result<Vec<Op>, OtError> {
    transform(std::slice::from_ref(op), std::slice::from_ref(other), side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::apply_ops;

    fn apply(base: &str, ops: &[Op]) -> String {
        let mut s = base.to_string();
        apply_ops(&mut s, ops).unwrap();
        s
    }

    fn converge(base: &str, a: Vec<Op>, b: Vec<Op>) -> String {
        let (a2, b2) = transform_x(&a, &b).unwrap();
        let via_a = apply(&apply(base, &a), &b2);
        let via_b = apply(&apply(base, &b), &a2);
        assert_eq!(via_a, via_b, "diverged for a={a:?} b={b:?}");
        via_a
    }

    #[test]
    fn test_insert_before_shifts() {
        let out = transform_op(&Op::insert(5, "x"), &Op::insert(2, "abc"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::insert(8, "x")]);
    }

    #[test]
    fn test_insert_after_unaffected() {
        let out = transform_op(&Op::insert(1, "x"), &Op::insert(2, "abc"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::insert(1, "x")]);
    }

    #[test]
    fn test_same_position_tie_break() {
        let x = Op::insert(3, "X");
        let y = Op::insert(3, "Y");
        // Right arrived after the reference op and is shifted past it.
        assert_eq!(transform_op(&y, &x, Side::Right).unwrap(), vec![Op::insert(4, "Y")]);
        assert_eq!(transform_op(&x, &y, Side::Left).unwrap(), vec![Op::insert(3, "X")]);
        assert_eq!(converge("aaabbbccc", vec![x], vec![y]), "aaaXYbbbccc");
    }

    #[test]
    fn test_insert_after_delete_clamps() {
        let out = transform_op(&Op::insert(4, "x"), &Op::delete(2, "abcd"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::insert(2, "x")]);
        let out = transform_op(&Op::insert(9, "x"), &Op::delete(2, "abcd"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::insert(5, "x")]);
    }

    #[test]
    fn test_delete_split_by_insert() {
        let out = transform_op(&Op::delete(1, "bcd"), &Op::insert(2, "XY"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::delete(1, "b"), Op::delete(3, "cd")]);
        assert_eq!(converge("abcde", vec![Op::delete(1, "bcd")], vec![Op::insert(2, "XY")]), "aXYe");
    }

    #[test]
    fn test_overlapping_deletes() {
        let out = transform_op(&Op::delete(1, "bcd"), &Op::delete(2, "cde"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::delete(1, "b")]);
        assert_eq!(converge("abcdef", vec![Op::delete(1, "bcd")], vec![Op::delete(2, "cde")]), "af");
    }

    #[test]
    fn test_covered_delete_vanishes() {
        let out = transform_op(&Op::delete(2, "c"), &Op::delete(1, "bcd"), Side::Right).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_mismatched_overlap_is_precondition_error() {
        let err = transform_op(&Op::delete(1, "bcd"), &Op::delete(2, "zz"), Side::Right).unwrap_err();
        assert!(matches!(err, OtError::TransformPrecondition(_)));
    }

    #[test]
    fn test_comment_extends_over_insert() {
        let out = transform_op(&Op::comment(2, "cdef"), &Op::insert(4, "XX"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::comment(2, "cdXXef")]);
        let out = transform_op(&Op::comment(2, "cdef"), &Op::delete(0, "ab"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::comment(0, "cdef")]);
    }

    #[test]
    fn test_multi_op_lists_converge() {
        let base = "the quick brown fox";
        let a = vec![Op::insert(4, "very "), Op::delete(15, "brown ")];
        let b = vec![Op::delete(0, "the "), Op::insert(15, "!")];
        converge(base, a, b);
    }

    #[test]
    fn test_far_out_positions_do_not_wrap() {
        let out = transform_op(&Op::insert(usize::MAX, "Z"), &Op::insert(0, "a"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::insert(usize::MAX, "Z")]);
        assert_eq!(apply("abc", &[Op::insert(0, "a"), out[0].clone()]), "aabcZ");

        let out = transform_op(&Op::delete(usize::MAX - 1, "zz"), &Op::delete(3, "d"), Side::Right).unwrap();
        assert_eq!(out, vec![Op::delete(usize::MAX - 2, "zz")]);
        assert_eq!(transform_position(usize::MAX, &Op::insert(1, "xy"), false), usize::MAX);
    }

    #[test]
    fn test_transform_against_empty() {
        let ops = vec![Op::insert(0, "a")];
        assert_eq!(transform(&ops, &[], Side::Right).unwrap(), ops);
        assert!(transform(&[], &ops, Side::Right).unwrap().is_empty());
    }

    #[test]
    fn test_append_merges_contiguous() {
        let mut dest = Vec::new();
        append(&mut dest, Op::insert(2, "ab"));
        append(&mut dest, Op::insert(4, "cd"));
        append(&mut dest, Op::insert(0, ""));
        assert_eq!(dest, vec![Op::insert(2, "abcd")]);

        let mut dest = Vec::new();
        append(&mut dest, Op::delete(3, "de"));
        append(&mut dest, Op::delete(1, "bc"));
        assert_eq!(dest, vec![Op::delete(1, "bcde")]);
    }
}
