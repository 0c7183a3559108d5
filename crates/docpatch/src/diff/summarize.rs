//! Type summarizers: coarse changes for values whose field-level diff is noise.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::schema::SchemaType;
use super::Change;
use docpatch_path::Segment;

/// Produces a single coarse [`Change`] for a pair of values sharing a `_type`.
///
/// Returning `None` falls back to field-by-field diffing.
pub trait Summarizer: Send + Sync {
    fn summarize(
        &self,
        from: &Value,
        to: &Value,
        path: &[Segment],
        schema: Option<&SchemaType>,
    ) -> Option<Change>;
}

/// Summarizers keyed by `_type`.
#[derive(Clone, Default)]
pub struct SummarizerRegistry {
    by_type: HashMap<String, Arc<dyn Summarizer>>,
}

impl SummarizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`ReferenceSummarizer`] for `reference` and
    /// [`BlockSummarizer`] for `block`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("reference", ReferenceSummarizer);
        registry.register("block", BlockSummarizer);
        registry
    }

    pub fn register(&mut self, type_name: impl Into<String>, summarizer: impl Summarizer + 'static) {
        self.by_type.insert(type_name.into(), Arc::new(summarizer));
    }

    pub fn remove(&mut self, type_name: &str) -> bool {
        self.by_type.remove(type_name).is_some()
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn Summarizer> {
        self.by_type.get(type_name).map(|s| s.as_ref())
    }
}

impl fmt::Debug for SummarizerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&String> = self.by_type.keys().collect();
        types.sort();
        f.debug_struct("SummarizerRegistry").field("types", &types).finish()
    }
}

fn edited(from: &Value, to: &Value, path: &[Segment], summary: String) -> Change {
    Change::Edited {
        path: path.to_vec(),
        from: from.clone(),
        to: to.clone(),
        summary: Some(summary),
    }
}

/// References change as a whole when their target `_ref` changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceSummarizer;

impl Summarizer for ReferenceSummarizer {
    fn summarize(&self, from: &Value, to: &Value, path: &[Segment], schema: Option<&SchemaType>) -> Option<Change> {
        let before = from.get("_ref").and_then(Value::as_str);
        let after = to.get("_ref").and_then(Value::as_str);
        if before == after {
            return None;
        }
        let title = schema.map_or("Reference", SchemaType::display_title);
        let summary = match (before, after) {
            (Some(before), Some(after)) => format!("{title} changed from {before} to {after}"),
            (None, Some(after)) => format!("{title} set to {after}"),
            (Some(before), None) => format!("{title} {before} cleared"),
            (None, None) => format!("{title} changed"),
        };
        Some(edited(from, to, path, summary))
    }
}

/// Rich-text blocks change as a whole when their plain text changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockSummarizer;

/// Concatenated `text` of a block's span children.
pub fn block_text(block: &Value) -> String {
    block
        .get("children")
        .and_then(Value::as_array)
        .map(|children| {
            children
                .iter()
                .filter_map(|child| child.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

impl Summarizer for BlockSummarizer {
    fn summarize(&self, from: &Value, to: &Value, path: &[Segment], schema: Option<&SchemaType>) -> Option<Change> {
        let before = block_text(from);
        let after = block_text(to);
        if before == after {
            return None;
        }
        let title = schema.map_or("Text", SchemaType::display_title);
        Some(edited(from, to, path, format!("{title} changed from {before:?} to {after:?}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reference_summary() {
        let path = vec![Segment::field("author")];
        let from = json!({"_type": "reference", "_ref": "a"});
        let to = json!({"_type": "reference", "_ref": "b"});
        let change = ReferenceSummarizer.summarize(&from, &to, &path, None).unwrap();
        assert_eq!(
            change,
            Change::Edited {
                path: path.clone(),
                from: from.clone(),
                to: to.clone(),
                summary: Some("Reference changed from a to b".into()),
            }
        );
        assert!(ReferenceSummarizer.summarize(&from, &from, &path, None).is_none());

        let schema = SchemaType::new("reference").with_title("Author");
        let change = ReferenceSummarizer.summarize(&from, &to, &path, Some(&schema)).unwrap();
        assert!(matches!(change, Change::Edited { summary: Some(s), .. } if s == "Author changed from a to b"));
    }

    #[test]
    fn block_summary_uses_plain_text() {
        let from = json!({"_type": "block", "children": [{"_key": "s1", "text": "Hello "}, {"_key": "s2", "text": "world"}]});
        let to = json!({"_type": "block", "children": [{"_key": "s1", "text": "Hello there"}]});
        assert_eq!(block_text(&from), "Hello world");
        assert!(BlockSummarizer.summarize(&from, &to, &[], None).is_some());
        let same = json!({"_type": "block", "style": "h1", "children": [{"_key": "x", "text": "Hello world"}]});
        assert!(BlockSummarizer.summarize(&from, &same, &[], None).is_none());
    }

    #[test]
    fn registry_lookup() {
        let registry = SummarizerRegistry::with_defaults();
        assert!(registry.get("reference").is_some());
        assert!(registry.get("block").is_some());
        assert!(registry.get("image").is_none());
        assert_eq!(format!("{registry:?}"), r#"SummarizerRegistry { types: ["block", "reference"] }"#);
    }
}
