use proptest::prelude::*;
use serde_json::{json, Map, Value};

use docpatch::patch::{apply, apply_all, InsertPosition, Patch, PatchError};
use docpatch::{diff, to_forward_patches, to_inverse_patches, Document, Segment, WorkingState};

// ── Strategies ────────────────────────────────────────────────────────────

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::from),
        (-100i64..100).prop_map(Value::from),
        "[a-z ]{0,12}".prop_map(Value::from),
    ]
}

fn object(inner: impl Strategy<Value = Value>, size: std::ops::Range<usize>) -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-d]", inner, size).prop_map(|fields| Value::Object(fields.into_iter().collect()))
}

fn keyed_items(inner: impl Strategy<Value = Value>) -> impl Strategy<Value = Value> {
    prop::collection::btree_map("[a-f]", inner, 0..5)
        .prop_map(|items| {
            items
                .into_iter()
                .map(|(key, v)| json!({"_key": key, "v": v}))
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
        .prop_map(Value::Array)
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(Value::Array),
            keyed_items(inner.clone()),
            object(inner, 0..4),
        ]
    })
}

fn document() -> impl Strategy<Value = Value> {
    object(value(), 0..5)
}

// ── Helpers ───────────────────────────────────────────────────────────────

fn is_keyed(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|item| item.get("_key").and_then(Value::as_str).is_some())
}

/// Sort keyed arrays by key, recursively.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), normalize(v))).collect()),
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(normalize).collect();
            if is_keyed(&items) {
                items.sort_by(|a, b| a["_key"].as_str().cmp(&b["_key"].as_str()));
            }
            Value::Array(items)
        }
        other => other.clone(),
    }
}

/// Reverse every keyed array, recursively.
fn reorder(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), reorder(v))).collect()),
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(reorder).collect();
            if is_keyed(&items) {
                items.reverse();
            }
            Value::Array(items)
        }
        other => other.clone(),
    }
}

fn keys(items: &Value) -> Vec<&str> {
    items
        .as_array()
        .map(|items| items.iter().filter_map(|item| item["_key"].as_str()).collect())
        .unwrap_or_default()
}

fn with_identity(mut body: Map<String, Value>) -> Value {
    body.insert("_id".into(), json!("doc"));
    body.insert("_type".into(), json!("post"));
    Value::Object(body)
}

// ── Properties ────────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn forward_patches_reach_the_target(a in document(), b in document()) {
        let changes = diff(&a, &b);
        let forward = apply_all(&a, &to_forward_patches(&changes)).unwrap();
        prop_assert_eq!(normalize(&forward), normalize(&b));
    }

    #[test]
    fn inverse_patches_restore_the_source(a in document(), b in document()) {
        let changes = diff(&a, &b);
        let forward = apply_all(&a, &to_forward_patches(&changes)).unwrap();
        let back = apply_all(&forward, &to_inverse_patches(&changes)).unwrap();
        prop_assert_eq!(normalize(&back), normalize(&a));
    }

    #[test]
    fn reordering_keyed_items_is_not_a_change(a in document()) {
        prop_assert!(diff(&a, &reorder(&a)).is_empty());
    }

    #[test]
    fn inserts_never_duplicate_keys(
        initial in prop::collection::btree_set("[a-h]", 0..5),
        inserts in prop::collection::vec(
            (prop::collection::vec("[a-h]", 1..3), 0usize..3, "[a-h]"),
            1..8,
        ),
    ) {
        let mut doc = json!({"items": initial.iter().map(|k| json!({"_key": k})).collect::<Vec<_>>()});
        for (new_keys, position, reference) in inserts {
            let position = [InsertPosition::Before, InsertPosition::After, InsertPosition::Replace][position];
            let items = new_keys.iter().map(|k| json!({"_key": k})).collect();
            let patch = Patch::insert(vec![Segment::field("items")], position, Segment::key(reference), items);
            match apply(&doc, &patch) {
                Ok(next) => doc = next,
                Err(err) => prop_assert!(matches!(err, PatchError::DuplicateKey { .. }), "unexpected {err}"),
            }
            let mut seen = keys(&doc["items"]);
            let total = seen.len();
            seen.sort_unstable();
            seen.dedup();
            prop_assert_eq!(seen.len(), total);
        }
    }

    #[test]
    fn rebase_keeps_unrelated_pending_edits(
        base0 in object(value(), 0..4),
        base1 in object(value(), 0..4),
        first in value(),
        second in value(),
    ) {
        let base0 = Document::new(with_identity(base0.as_object().cloned().unwrap_or_default())).unwrap();
        let base1 = Document::new(with_identity(base1.as_object().cloned().unwrap_or_default())).unwrap();
        let p1 = Patch::set(vec![Segment::field("local_one")], first);
        let p2 = Patch::set(vec![Segment::field("local_two")], second);

        let mut state = WorkingState::new(base0);
        state.local_edit(p1.clone()).unwrap();
        state.local_edit(p2.clone()).unwrap();
        prop_assert!(state.remote_snapshot(base1.clone(), &[]).is_none());
        prop_assert_eq!(state.current(), &base1.apply_all(&[p1, p2]).unwrap());
    }
}
