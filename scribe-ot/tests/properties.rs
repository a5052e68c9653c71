//! Property tests for the OT core.
//!
//! - Round-trip: rewinding an applied op restores the original content
//! - Convergence: both application orders of a concurrent pair agree
//! - Compression: a compressed run replays to the same content as the raw run

use proptest::prelude::*;
use scribe_ot::compress::{compress_raw_updates, compress_updates, convert_to_single_op_updates};
use scribe_ot::text::{char_len, char_slice};
use scribe_ot::{apply_ops, rewind_op, rewind_updates, transform, CompressorConfig, Op, Side, Update, UpdateMeta};
use uuid::Uuid;

// ─── Strategies ─────────────────────────────────────────────

fn arb_content() -> impl Strategy<Value = String> {
    "[a-cé ]{0,24}"
}

/// An op that is valid against `content`.
fn arb_op_for(content: String) -> impl Strategy<Value = Op> {
    let len = char_len(&content);
    let insert = (0..=len, "[x-zé]{1,5}").prop_map(|(p, text)| Op::insert(p, text));
    if len == 0 {
        return insert.boxed();
    }
    let delete = (0..len, 1..=len).prop_map(move |(p, n)| {
        let end = (p + n).min(len);
        Op::delete(p, char_slice(&content, p, end))
    });
    prop_oneof![insert, delete].boxed()
}

fn arb_content_and_op() -> impl Strategy<Value = (String, Op)> {
    arb_content().prop_flat_map(|c| (Just(c.clone()), arb_op_for(c)))
}

fn arb_concurrent_pair() -> impl Strategy<Value = (String, Op, Op)> {
    arb_content().prop_flat_map(|c| (Just(c.clone()), arb_op_for(c.clone()), arb_op_for(c)))
}

/// A chain of ops, each valid against the content left by the previous one.
fn arb_op_chain() -> impl Strategy<Value = (String, Vec<Op>)> {
    (arb_content(), prop::collection::vec((any::<prop::sample::Index>(), any::<bool>(), "[x-z]{1,3}"), 1..12))
        .prop_map(|(base, steps)| {
            let mut content = base.clone();
            let mut ops = Vec::new();
            for (idx, is_insert, text) in steps {
                let len = char_len(&content);
                let op = if is_insert || len == 0 {
                    Op::insert(idx.index(len + 1), text)
                } else {
                    let p = idx.index(len);
                    let end = (p + char_len(&text)).min(len);
                    Op::delete(p, char_slice(&content, p, end))
                };
                apply_ops(&mut content, std::slice::from_ref(&op)).unwrap();
                ops.push(op);
            }
            (base, ops)
        })
}

fn apply(base: &str, ops: &[Op]) -> String {
    let mut s = base.to_string();
    apply_ops(&mut s, ops).unwrap();
    s
}

// ─── Properties ─────────────────────────────────────────────

proptest! {
    #[test]
    fn prop_rewind_roundtrip((content, op) in arb_content_and_op()) {
        let applied = apply(&content, std::slice::from_ref(&op));
        prop_assert_eq!(rewind_op(&applied, &op).unwrap(), content);
    }

    #[test]
    fn prop_transform_converges((content, a, b) in arb_concurrent_pair()) {
        let b_after_a = transform(std::slice::from_ref(&b), std::slice::from_ref(&a), Side::Right);
        let a_after_b = transform(std::slice::from_ref(&a), std::slice::from_ref(&b), Side::Left);

        // Overlapping deletes of different text cannot come from one base.
        if let (Ok(b2), Ok(a2)) = (b_after_a, a_after_b) {
            let via_a = apply(&apply(&content, std::slice::from_ref(&a)), &b2);
            let via_b = apply(&apply(&content, std::slice::from_ref(&b)), &a2);
            prop_assert_eq!(via_a, via_b);
        }
    }

    #[test]
    fn prop_compression_preserves_content((base, ops) in arb_op_chain()) {
        let doc = Uuid::new_v4();
        let user = Some(Uuid::new_v4());
        let raw: Vec<Update> = ops
            .iter()
            .enumerate()
            .map(|(i, op)| Update::single(doc, i as u64, op.clone(), UpdateMeta::at(user, i as u64)))
            .collect();

        let expected = raw.iter().fold(base.clone(), |c, u| apply(&c, &u.ops));
        let compressed = compress_raw_updates(None, &raw, &CompressorConfig::default());
        let replayed = compressed.iter().fold(base.clone(), |c, u| apply(&c, &u.ops));
        prop_assert_eq!(&replayed, &expected);
        prop_assert!(compressed.len() <= raw.len());

        // Every version kept by compression replays to its original content.
        let mut by_version = Vec::with_capacity(raw.len());
        let mut content = base.clone();
        for update in &raw {
            content = apply(&content, &update.ops);
            by_version.push(content.clone());
        }
        content = base.clone();
        for update in &compressed {
            content = apply(&content, &update.ops);
            prop_assert_eq!(&content, &by_version[update.version as usize]);
        }

        let singles = compress_updates(convert_to_single_op_updates(&raw), &CompressorConfig::default());
        let replayed = singles.iter().fold(base.clone(), |c, u| apply(&c, &u.ops));
        prop_assert_eq!(&replayed, &expected);

        // The compressed log rewinds back to the base just like the raw one.
        prop_assert_eq!(rewind_updates(&expected, &compressed).unwrap(), base);
    }
}
