//! Key-aware path addressing for tree-shaped documents.
//!
//! A path is a sequence of [`Segment`]s: object field names, positional array
//! indices, and key selectors that name an array element by its stable `_key`.
//!
//! # Example
//!
//! ```
//! use docpatch_path::{parse_path, format_path, resolve};
//!
//! let doc = serde_json::json!({"items": [{"_key": "a", "title": "One"}]});
//! let path = parse_path(r#"items[_key=="a"].title"#).unwrap();
//! assert_eq!(resolve(&doc, &path).unwrap(), Some(&serde_json::json!("One")));
//! assert_eq!(format_path(&path), r#"items[_key=="a"].title"#);
//! ```

use thiserror::Error;

pub mod types;
pub use types::{Path, Segment};

pub mod parse;
pub use parse::{format_path, parse_path, PathError};

pub mod resolve;
pub use resolve::{
    find_key_index, get, has_keyed_items, is_keyed_array, item_key, resolve, resolve_existing,
    resolve_mut,
};

pub mod validate;
pub use validate::{validate_path, ValidationError};

/// Errors raised while addressing a location inside a document.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressingError {
    /// A key selector matched more than one sibling.
    #[error("duplicate key {key:?} in array at `{path}`")]
    DuplicateKey { key: String, path: String },
    /// The location does not exist. Most callers treat this as "missing".
    #[error("nothing found at `{0}`")]
    NotFound(String),
}

impl AddressingError {
    /// Attach the array path to a [`AddressingError::DuplicateKey`].
    pub fn at(self, path: &[Segment]) -> Self {
        match self {
            AddressingError::DuplicateKey { key, .. } => AddressingError::DuplicateKey {
                key,
                path: format_path(path),
            },
            other => other,
        }
    }
}

/// Check if two paths address the same location.
///
/// Key selectors compare by key, never by the position the element happens to
/// occupy, so `[_key=="a"]` and `[0]` never match.
///
/// # Example
///
/// ```
/// use docpatch_path::{matches, Segment};
///
/// let a = vec![Segment::field("items"), Segment::key("x")];
/// assert!(matches(&a, &a.clone()));
/// assert!(!matches(&a, &[Segment::field("items"), Segment::Index(0)]));
/// ```
pub fn matches(a: &[Segment], b: &[Segment]) -> bool {
    a == b
}

/// Check if the path points to the document root.
pub fn is_root(path: &[Segment]) -> bool {
    path.is_empty()
}

/// Check if `prefix` is a (non-strict) prefix of `path`.
pub fn starts_with(path: &[Segment], prefix: &[Segment]) -> bool {
    path.len() >= prefix.len() && path[..prefix.len()] == *prefix
}

/// Check if `parent` strictly contains `child`.
///
/// # Example
///
/// ```
/// use docpatch_path::{is_child, Segment};
///
/// let parent = vec![Segment::field("foo")];
/// let child = vec![Segment::field("foo"), Segment::key("k")];
/// assert!(is_child(&parent, &child));
/// assert!(!is_child(&child, &parent));
/// ```
pub fn is_child(parent: &[Segment], child: &[Segment]) -> bool {
    parent.len() < child.len() && starts_with(child, parent)
}

/// Split a path into its parent and final segment.
///
/// Returns `None` for the root path.
pub fn split_last(path: &[Segment]) -> Option<(&[Segment], &Segment)> {
    let (last, parent) = path.split_last()?;
    Some((parent, last))
}

/// Get the parent path of a given path, or `None` for the root.
pub fn parent(path: &[Segment]) -> Option<Path> {
    split_last(path).map(|(parent, _)| parent.to_vec())
}

/// Append a segment to a path, returning the new path.
pub fn join(path: &[Segment], segment: impl Into<Segment>) -> Path {
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(path);
    out.push(segment.into());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn segment_strategy() -> impl Strategy<Value = Segment> {
        prop_oneof![
            "[a-z][a-z0-9_]{0,6}".prop_map(Segment::Field),
            (0usize..50).prop_map(Segment::Index),
            "[ -~]{1,8}".prop_map(Segment::Key),
        ]
    }

    proptest! {
        #[test]
        fn format_then_parse_preserves_path(path in prop::collection::vec(segment_strategy(), 0..6)) {
            prop_assert_eq!(parse_path(&format_path(&path)).unwrap(), path);
        }
    }

    #[test]
    fn parent_and_join() {
        let path = vec![Segment::field("a"), Segment::key("k")];
        assert_eq!(parent(&path), Some(vec![Segment::field("a")]));
        assert_eq!(parent(&[]), None);
        assert_eq!(join(&[Segment::field("a")], Segment::key("k")), path);
    }

    #[test]
    fn starts_with_is_non_strict() {
        let path = vec![Segment::field("a"), Segment::field("b")];
        assert!(starts_with(&path, &path));
        assert!(!is_child(&path, &path));
        assert!(is_root(&[]));
    }
}
