//! Patch, diff, revert and optimistic reconciliation for tree-shaped
//! documents whose arrays identify their items by a stable `_key`.
//!
//! - [`patch`]: the patch model, its applicator and wire codec.
//! - [`diff`]: structural, key-aware diffing into a tree of [`Change`]s.
//! - [`changeset`]: turning changes into forward or inverse patches.
//! - [`reconcile`]: a confirmed base plus a queue of local patches, kept in
//!   step with an authority.
//!
//! # Example
//!
//! ```
//! use docpatch::{apply_all, diff, to_forward_patches, to_inverse_patches};
//! use serde_json::json;
//!
//! let a = json!({"title": "Draft", "items": [{"_key": "a"}, {"_key": "b"}]});
//! let b = json!({"title": "Final", "items": [{"_key": "a"}]});
//!
//! let changes = diff(&a, &b);
//! let forward = apply_all(&a, &to_forward_patches(&changes)).unwrap();
//! assert_eq!(forward, b);
//! assert_eq!(apply_all(&forward, &to_inverse_patches(&changes)).unwrap(), a);
//! ```

pub mod changeset;
pub mod config;
pub mod diff;
pub mod document;
pub mod keys;
pub mod patch;
pub mod reconcile;
pub mod text;

pub use docpatch_path::{format_path, parse_path, AddressingError, Path, Segment};

pub use changeset::{to_forward_patches, to_inverse_patches, ChangeSet, ChangeSetOptions, Direction};
pub use config::{ConfigError, EngineConfig};
pub use diff::{diff, diff_with, Change, DiffOptions};
pub use document::{Document, DocumentError};
pub use patch::{apply, apply_all, ApplyAllError, ApplyOptions, InsertPosition, Operation, Patch, PatchError};
pub use reconcile::{
    DocumentSession, MemoryStore, ReconciliationConflict, RemoteEvent, SessionEvent, TransactionSink, WorkingState,
};
