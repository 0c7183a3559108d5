//! Structural diff between two document values.
//!
//! Arrays whose elements all carry a unique `_key` are matched by key, so
//! moving an element produces no change for it. Any other array is compared
//! as a whole.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use docpatch_path::{Path, Segment};

mod differ;
pub mod schema;
pub mod summarize;

pub use differ::{diff, diff_tree, diff_with, Differ};
pub use schema::{Schema, SchemaField, SchemaType};
pub use summarize::{block_text, BlockSummarizer, ReferenceSummarizer, Summarizer, SummarizerRegistry};

/// Fields skipped at every object level by default.
pub const DEFAULT_IGNORED_FIELDS: [&str; 5] = ["_id", "_rev", "_createdAt", "_updatedAt", "_weak"];

// ── Change ────────────────────────────────────────────────────────────────

/// Where a keyed array item sits in the array it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemPosition {
    pub index: usize,
    /// Key of the preceding sibling, `None` for the first item.
    pub after: Option<String>,
}

/// One structural difference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Change {
    #[serde(rename_all = "camelCase")]
    Added {
        path: Path,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<ItemPosition>,
    },
    #[serde(rename_all = "camelCase")]
    Removed {
        path: Path,
        old_value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<ItemPosition>,
    },
    Edited {
        path: Path,
        from: Value,
        to: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    Group {
        path: Path,
        children: Vec<Change>,
    },
}

impl Change {
    pub fn path(&self) -> &[Segment] {
        match self {
            Change::Added { path, .. }
            | Change::Removed { path, .. }
            | Change::Edited { path, .. }
            | Change::Group { path, .. } => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::Added { .. } => "added",
            Change::Removed { .. } => "removed",
            Change::Edited { .. } => "edited",
            Change::Group { .. } => "group",
        }
    }

    /// Replace every group with its children, depth first.
    pub fn flatten(self) -> Vec<Change> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<Change>) {
        match self {
            Change::Group { children, .. } => {
                for child in children {
                    child.flatten_into(out);
                }
            }
            leaf => out.push(leaf),
        }
    }
}

/// Flatten a change tree into its leaves.
pub fn flatten(changes: Vec<Change>) -> Vec<Change> {
    changes.into_iter().flat_map(Change::flatten).collect()
}

// ── Options ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct DiffOptions {
    pub ignored_fields: HashSet<String>,
    pub summarizers: SummarizerRegistry,
    pub schema: Schema,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            ignored_fields: DEFAULT_IGNORED_FIELDS.iter().map(|f| f.to_string()).collect(),
            summarizers: SummarizerRegistry::with_defaults(),
            schema: Schema::default(),
        }
    }
}

impl DiffOptions {
    pub fn with_ignored_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_summarizer(mut self, type_name: impl Into<String>, summarizer: impl Summarizer + 'static) -> Self {
        self.summarizers.register(type_name, summarizer);
        self
    }

    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }
}
