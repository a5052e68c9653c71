//! Char-indexed string helpers and op application.

use crate::error::OtError;
use crate::op::Op;

/// Length of `s` in chars.
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte offset of char index `idx`, clamped to the end of `s`.
pub fn byte_offset(s: &str, idx: usize) -> usize {
    s.char_indices().nth(idx).map_or(s.len(), |(b, _)| b)
}

/// Chars `start..end` of `s`, clamped to the end.
pub fn char_slice(s: &str, start: usize, end: usize) -> &str {
    let from = byte_offset(s, start);
    let to = byte_offset(s, end.max(start));
    &s[from..to]
}

/// Chars from `start` to the end of `s`.
pub fn char_tail(s: &str, start: usize) -> &str {
    &s[byte_offset(s, start)..]
}

/// `s` with `insert` spliced in at char `idx` (clamped to end).
pub fn inject(s: &str, idx: usize, insert: &str) -> String {
    let at = byte_offset(s, idx);
    let mut out = String::with_capacity(s.len() + insert.len());
    out.push_str(&s[..at]);
    out.push_str(insert);
    out.push_str(&s[at..]);
    out
}

/// `s` with `len` chars removed at char `idx`.
pub fn remove(s: &str, idx: usize, len: usize) -> String {
    let from = byte_offset(s, idx);
    let to = byte_offset(s, idx.saturating_add(len));
    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..from]);
    out.push_str(&s[to..]);
    out
}

/// Apply one op to `content`.
///
/// Inserts past the end land at the end. A delete must match the live text
/// exactly. Comments leave content alone.
pub fn apply_op(content: &mut String, op: &Op) -> Result<(), OtError> {
    match op {
        Op::Insert { position, text } => {
            let at = byte_offset(content, *position);
            content.insert_str(at, text);
        }
        Op::Delete { position, text } => {
            let from = byte_offset(content, *position);
            let to = byte_offset(content, position.saturating_add(char_len(text)));
            if &content[from..to] != text.as_str() {
                return Err(OtError::consistency(
                    format!("delete at {position}"),
                    text.clone(),
                    &content[from..to],
                ));
            }
            content.replace_range(from..to, "");
        }
        Op::Comment { .. } => {}
    }
    Ok(())
}

/// Apply ops left to right. `content` is left untouched if any op fails.
pub fn apply_ops(content: &mut String, ops: &[Op]) -> Result<(), OtError> {
    let mut next = content.clone();
    for op in ops {
        apply_op(&mut next, op)?;
    }
    *content = next;
    Ok(())
}

/// Pull positions past the end of a `len`-char document back to the end,
/// following the length as each op applies in turn.
pub fn clamp_ops(ops: &mut [Op], mut len: usize) {
    for op in ops.iter_mut() {
        if op.position() > len {
            *op = op.at(len);
        }
        match &*op {
            Op::Insert { text, .. } => len = len.saturating_add(char_len(text)),
            Op::Delete { text, .. } => len = len.saturating_sub(char_len(text)),
            Op::Comment { .. } => {}
        }
    }
}

/// Ops with comments removed. Comments never take part in transform or apply.
pub fn strip_comments(ops: &[Op]) -> Vec<Op> {
    ops.iter().filter(|op| !op.is_comment()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_helpers_multibyte() {
        let s = "añb€c";
        assert_eq!(char_len(s), 5);
        assert_eq!(char_slice(s, 1, 4), "ñb€");
        assert_eq!(char_slice(s, 3, 99), "€c");
        assert_eq!(char_tail(s, 4), "c");
        assert_eq!(inject(s, 2, "XY"), "añXYb€c");
        assert_eq!(remove(s, 1, 2), "a€c");
    }

    #[test]
    fn test_apply_insert_clamps_to_end() {
        let mut content = "abc".to_string();
        apply_op(&mut content, &Op::insert(10, "Z")).unwrap();
        assert_eq!(content, "abcZ");
    }

    #[test]
    fn test_apply_delete_checks_text() {
        let mut content = "foobar".to_string();
        apply_op(&mut content, &Op::delete(3, "bar")).unwrap();
        assert_eq!(content, "foo");

        let err = apply_op(&mut content, &Op::delete(0, "xyz")).unwrap_err();
        assert!(matches!(err, OtError::Consistency { .. }));
        assert_eq!(content, "foo");
    }

    #[test]
    fn test_apply_delete_far_past_end_is_consistency_error() {
        let mut content = "abc".to_string();
        let err = apply_op(&mut content, &Op::delete(usize::MAX, "a")).unwrap_err();
        assert!(matches!(err, OtError::Consistency { .. }));
        assert_eq!(content, "abc");
        assert_eq!(remove("abc", 1, usize::MAX), "a");
    }

    #[test]
    fn test_clamp_ops_tracks_length() {
        let mut ops = vec![Op::insert(usize::MAX, "xy"), Op::delete(40, "y"), Op::insert(9, "z")];
        clamp_ops(&mut ops, 3);
        assert_eq!(ops, vec![Op::insert(3, "xy"), Op::delete(5, "y"), Op::insert(4, "z")]);

        let mut content = "abc".to_string();
        apply_ops(&mut content, &ops[..1]).unwrap();
        assert_eq!(content, "abcxy");
    }

    #[test]
    fn test_apply_ops_is_atomic() {
        let mut content = "hello".to_string();
        let ops = vec![Op::insert(5, " world"), Op::delete(0, "nope")];
        assert!(apply_ops(&mut content, &ops).is_err());
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_comment_is_noop() {
        let mut content = "hello".to_string();
        apply_op(&mut content, &Op::comment(0, "hel")).unwrap();
        assert_eq!(content, "hello");
        assert_eq!(strip_comments(&[Op::comment(0, "h"), Op::insert(0, "x")]), vec![Op::insert(0, "x")]);
    }
}
