//! Core types for the patch module.

use serde_json::Value;
use thiserror::Error;

use docpatch_path::{AddressingError, ValidationError};
pub use docpatch_path::{Path, Segment};

use crate::keys::patch_id;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatchError {
    /// A value that cannot hold children sits where a container is required.
    #[error("cannot apply deep operations on primitive value at `{path}`")]
    ParentIsPrimitive { path: String },
    #[error("type mismatch at `{path}`: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("duplicate key {key:?} at `{path}`")]
    DuplicateKey { key: String, path: String },
    #[error("text patch did not apply at `{path}`")]
    PatchDidNotApply { path: String },
    #[error("malformed text patch at `{path}`: {reason}")]
    InvalidTextPatch { path: String, reason: String },
    #[error("positional index {index} cannot target keyed array at `{path}`")]
    PositionalTarget { path: String, index: usize },
    #[error("index {index} out of bounds at `{path}`")]
    IndexOutOfBounds { path: String, index: usize },
    #[error("patched value is not a valid document: {0}")]
    InvalidDocument(String),
    #[error("invalid path: {0}")]
    InvalidPath(#[from] ValidationError),
    #[error(transparent)]
    Addressing(#[from] AddressingError),
}

// ── Operation ─────────────────────────────────────────────────────────────

/// Where the items of an [`Operation::Insert`] land relative to the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertPosition {
    Before,
    After,
    Replace,
}

impl InsertPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            InsertPosition::Before => "before",
            InsertPosition::After => "after",
            InsertPosition::Replace => "replace",
        }
    }
}

/// A single mutation, applied at a [`Patch::path`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Set(Value),
    Unset,
    SetIfMissing(Value),
    /// `path` addresses the array; `reference` addresses an element inside it.
    Insert {
        items: Vec<Value>,
        position: InsertPosition,
        reference: Segment,
    },
    /// A diff-match-patch text patch for a string leaf.
    DiffMatchPatch(String),
    Inc(f64),
    Dec(f64),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Set(_) => "set",
            Operation::Unset => "unset",
            Operation::SetIfMissing(_) => "setIfMissing",
            Operation::Insert { .. } => "insert",
            Operation::DiffMatchPatch(_) => "diffMatchPatch",
            Operation::Inc(_) => "inc",
            Operation::Dec(_) => "dec",
        }
    }
}

// ── Patch ─────────────────────────────────────────────────────────────────

/// One atomic mutation plus its target path.
#[derive(Debug, Clone, PartialEq)]
pub struct Patch {
    /// Correlates the local patch with the authority's acknowledgement.
    pub id: String,
    pub path: Path,
    pub op: Operation,
}

impl Patch {
    /// Create a patch with a fresh random id.
    pub fn new(path: Path, op: Operation) -> Self {
        Self {
            id: patch_id(),
            path,
            op,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn set(path: Path, value: Value) -> Self {
        Self::new(path, Operation::Set(value))
    }

    pub fn unset(path: Path) -> Self {
        Self::new(path, Operation::Unset)
    }

    pub fn set_if_missing(path: Path, value: Value) -> Self {
        Self::new(path, Operation::SetIfMissing(value))
    }

    pub fn insert(path: Path, position: InsertPosition, reference: Segment, items: Vec<Value>) -> Self {
        Self::new(
            path,
            Operation::Insert {
                items,
                position,
                reference,
            },
        )
    }

    pub fn diff_match_patch(path: Path, patch: impl Into<String>) -> Self {
        Self::new(path, Operation::DiffMatchPatch(patch.into()))
    }

    pub fn inc(path: Path, amount: f64) -> Self {
        Self::new(path, Operation::Inc(amount))
    }

    pub fn dec(path: Path, amount: f64) -> Self {
        Self::new(path, Operation::Dec(amount))
    }
}

/// Name of a JSON value's type, as used in error messages.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Batch results ─────────────────────────────────────────────────────────

/// Failure of [`apply_all`](super::apply_all): which patch failed and why.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("patch #{index} ({patch_id}) failed: {source}")]
pub struct ApplyAllError {
    pub index: usize,
    pub patch_id: String,
    #[source]
    pub source: PatchError,
}
