use indexmap::IndexMap;
use serde_json::{Map, Value};

use docpatch_path::{is_keyed_array, item_key, join, Path, Segment};

use super::{flatten, Change, DiffOptions, ItemPosition};

/// Diff `a` against `b` with default options, as a flat change list.
pub fn diff(a: &Value, b: &Value) -> Vec<Change> {
    Differ::default().diff(a, b)
}

/// Diff with explicit options, as a flat change list.
pub fn diff_with(a: &Value, b: &Value, options: &DiffOptions) -> Vec<Change> {
    flatten(diff_tree_with(a, b, options))
}

/// Diff `a` against `b` with default options, keeping container groups.
pub fn diff_tree(a: &Value, b: &Value) -> Vec<Change> {
    Differ::default().diff_tree(a, b)
}

fn diff_tree_with(a: &Value, b: &Value, options: &DiffOptions) -> Vec<Change> {
    Walker { options }.changes(a, b, &[])
}

/// A configured differ.
#[derive(Debug, Clone, Default)]
pub struct Differ {
    options: DiffOptions,
}

impl Differ {
    pub fn new(options: DiffOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DiffOptions {
        &self.options
    }

    /// Changes turning `a` into `b`, depth first, groups flattened.
    pub fn diff(&self, a: &Value, b: &Value) -> Vec<Change> {
        diff_with(a, b, &self.options)
    }

    /// Changes turning `a` into `b`; containers with changed children appear as
    /// [`Change::Group`].
    pub fn diff_tree(&self, a: &Value, b: &Value) -> Vec<Change> {
        diff_tree_with(a, b, &self.options)
    }
}

// ── Walk ──────────────────────────────────────────────────────────────────

struct Walker<'a> {
    options: &'a DiffOptions,
}

fn type_tag(map: &Map<String, Value>) -> Option<&str> {
    map.get("_type").and_then(Value::as_str)
}

/// Index a keyed array by `_key`; `None` if any element lacks a key or a key
/// repeats.
fn index_by_key(items: &[Value]) -> Option<IndexMap<&str, (usize, &Value)>> {
    if !is_keyed_array(items) {
        return None;
    }
    let mut by_key = IndexMap::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let key = item_key(item)?;
        if by_key.insert(key, (index, item)).is_some() {
            return None;
        }
    }
    Some(by_key)
}

fn position(items: &[Value], index: usize) -> ItemPosition {
    let after = index
        .checked_sub(1)
        .and_then(|prev| item_key(&items[prev]))
        .map(str::to_string);
    ItemPosition { index, after }
}

fn edited(a: &Value, b: &Value, path: &[Segment]) -> Change {
    Change::Edited {
        path: path.to_vec(),
        from: a.clone(),
        to: b.clone(),
        summary: None,
    }
}

impl Walker<'_> {
    /// Changes below `path`. A single change at `path` itself means the value
    /// changed as a whole.
    fn changes(&self, a: &Value, b: &Value, path: &[Segment]) -> Vec<Change> {
        if a == b {
            return Vec::new();
        }
        match (a, b) {
            (Value::Object(a_map), Value::Object(b_map)) => self.objects(a, b, a_map, b_map, path),
            (Value::Array(a_items), Value::Array(b_items)) => {
                match (index_by_key(a_items), index_by_key(b_items)) {
                    (Some(a_keys), Some(b_keys)) => self.keyed_arrays(a_items, b_items, &a_keys, &b_keys, path),
                    _ => vec![edited(a, b, path)],
                }
            }
            _ => vec![edited(a, b, path)],
        }
    }

    fn objects(
        &self,
        a: &Value,
        b: &Value,
        a_map: &Map<String, Value>,
        b_map: &Map<String, Value>,
        path: &[Segment],
    ) -> Vec<Change> {
        let (a_type, b_type) = (type_tag(a_map), type_tag(b_map));
        if a_type.is_some() && b_type.is_some() && a_type != b_type {
            return vec![edited(a, b, path)];
        }
        if let Some(type_name) = a_type.filter(|_| a_type == b_type) {
            if let Some(summarizer) = self.options.summarizers.get(type_name) {
                let schema = self.options.schema.get(type_name);
                if let Some(change) = summarizer.summarize(a, b, path, schema) {
                    return vec![change];
                }
            }
        }

        let ignored = |field: &String| self.options.ignored_fields.contains(field);
        let mut out = Vec::new();
        for (field, old_value) in a_map.iter().filter(|(f, _)| !ignored(f) && !b_map.contains_key(*f)) {
            out.push(Change::Removed {
                path: join(path, field.as_str()),
                old_value: old_value.clone(),
                position: None,
            });
        }
        for (field, value) in b_map.iter().filter(|(f, _)| !ignored(f) && !a_map.contains_key(*f)) {
            out.push(Change::Added {
                path: join(path, field.as_str()),
                value: value.clone(),
                position: None,
            });
        }
        for (field, old_value) in a_map.iter().filter(|(f, _)| !ignored(f)) {
            if let Some(new_value) = b_map.get(field) {
                self.descend(old_value, new_value, join(path, field.as_str()), &mut out);
            }
        }
        out
    }

    fn keyed_arrays(
        &self,
        a_items: &[Value],
        b_items: &[Value],
        a_keys: &IndexMap<&str, (usize, &Value)>,
        b_keys: &IndexMap<&str, (usize, &Value)>,
        path: &[Segment],
    ) -> Vec<Change> {
        let mut out = Vec::new();
        for (key, (index, old_value)) in a_keys.iter().filter(|(k, _)| !b_keys.contains_key(*k)) {
            out.push(Change::Removed {
                path: join(path, Segment::key(*key)),
                old_value: (*old_value).clone(),
                position: Some(position(a_items, *index)),
            });
        }
        for (key, (index, value)) in b_keys.iter().filter(|(k, _)| !a_keys.contains_key(*k)) {
            out.push(Change::Added {
                path: join(path, Segment::key(*key)),
                value: (*value).clone(),
                position: Some(position(b_items, *index)),
            });
        }
        for (key, (_, old_value)) in a_keys {
            if let Some((_, new_value)) = b_keys.get(key) {
                self.descend(old_value, new_value, join(path, Segment::key(*key)), &mut out);
            }
        }
        out
    }

    /// Recurse into a kept child, wrapping its changes in a group unless the
    /// child changed as a whole.
    fn descend(&self, a: &Value, b: &Value, path: Path, out: &mut Vec<Change>) {
        let mut children = self.changes(a, b, &path);
        match children.len() {
            0 => {}
            1 if children[0].path() == path.as_slice() => out.append(&mut children),
            _ => out.push(Change::Group { path, children }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::ReferenceSummarizer;
    use docpatch_path::parse_path;
    use serde_json::json;

    fn p(s: &str) -> Path {
        parse_path(s).unwrap()
    }

    #[test]
    fn identical_values_have_no_changes() {
        let doc = json!({"a": [1, 2], "b": {"c": null}});
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn object_ordering_is_removed_added_edited() {
        let a = json!({"keep": 1, "gone": true, "nested": {"x": 1}});
        let b = json!({"new": "n", "keep": 2, "nested": {"x": 2}});
        let changes = diff(&a, &b);
        let kinds: Vec<(&str, String)> = changes
            .iter()
            .map(|c| (c.kind(), docpatch_path::format_path(c.path())))
            .collect();
        assert_eq!(
            kinds,
            vec![
                ("removed", "gone".to_string()),
                ("added", "new".to_string()),
                ("edited", "keep".to_string()),
                ("edited", "nested.x".to_string()),
            ]
        );
    }

    #[test]
    fn ignored_fields_apply_at_every_level() {
        let a = json!({"_id": "a", "_rev": "1", "child": {"_updatedAt": "t1", "v": 1}});
        let b = json!({"_id": "b", "_rev": "2", "child": {"_updatedAt": "t2", "v": 1}});
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn type_change_is_a_single_edit() {
        let a = json!({"field": {"_type": "image", "asset": "x"}});
        let b = json!({"field": {"_type": "file", "asset": "x"}});
        assert_eq!(diff(&a, &b), vec![edited(&a["field"], &b["field"], &p("field"))]);
        let changes = diff(&json!({"v": 1}), &json!({"v": "1"}));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].kind(), "edited");
    }

    #[test]
    fn keyed_arrays_match_by_key() {
        let a = json!({"items": [{"_key": "a", "v": 1}, {"_key": "b", "v": 1}, {"_key": "c", "v": 1}]});
        let b = json!({"items": [{"_key": "c", "v": 1}, {"_key": "a", "v": 2}, {"_key": "d", "v": 1}]});
        let changes = diff(&a, &b);
        assert_eq!(
            changes,
            vec![
                Change::Removed {
                    path: p(r#"items[_key=="b"]"#),
                    old_value: json!({"_key": "b", "v": 1}),
                    position: Some(ItemPosition { index: 1, after: Some("a".into()) }),
                },
                Change::Added {
                    path: p(r#"items[_key=="d"]"#),
                    value: json!({"_key": "d", "v": 1}),
                    position: Some(ItemPosition { index: 2, after: Some("a".into()) }),
                },
                Change::Edited {
                    path: p(r#"items[_key=="a"].v"#),
                    from: json!(1),
                    to: json!(2),
                    summary: None,
                },
            ]
        );
    }

    #[test]
    fn reordering_keyed_array_is_no_change() {
        let a = json!([{"_key": "x", "n": 1}, {"_key": "y", "n": 2}]);
        let b = json!([{"_key": "y", "n": 2}, {"_key": "x", "n": 1}]);
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn unkeyed_arrays_are_atomic() {
        let a = json!({"tags": ["a", "b"]});
        let b = json!({"tags": ["b", "a"]});
        assert_eq!(diff(&a, &b), vec![edited(&a["tags"], &b["tags"], &p("tags"))]);
        let dup_a = json!([{"_key": "k"}, {"_key": "k", "v": 1}]);
        let dup_b = json!([{"_key": "k"}]);
        assert_eq!(diff(&dup_a, &dup_b), vec![edited(&dup_a, &dup_b, &[])]);
    }

    #[test]
    fn tree_groups_containers() {
        let a = json!({"meta": {"a": 1, "b": 1}});
        let b = json!({"meta": {"a": 2, "b": 2}});
        let tree = diff_tree(&a, &b);
        assert_eq!(tree.len(), 1);
        match &tree[0] {
            Change::Group { path, children } => {
                assert_eq!(path, &p("meta"));
                assert_eq!(children.len(), 2);
            }
            other => panic!("expected group, got {other:?}"),
        }
        assert_eq!(diff(&a, &b).len(), 2);
    }

    #[test]
    fn summarizer_short_circuits_recursion() {
        let a = json!([{"_key": "k1", "_type": "ref", "_ref": "x"}]);
        let b = json!([{"_key": "k1", "_type": "ref", "_ref": "y"}]);
        let plain = diff(&a, &b);
        assert_eq!(plain[0].path(), p(r#"[_key=="k1"]._ref"#).as_slice());

        let differ = Differ::new(DiffOptions::default().with_summarizer("ref", ReferenceSummarizer));
        let changes = differ.diff(&a, &b);
        assert_eq!(changes.len(), 1);
        assert!(matches!(
            &changes[0],
            Change::Edited { path, summary: Some(_), .. } if *path == vec![Segment::key("k1")]
        ));
    }
}
