//! Documents: identified, typed, revisioned maps.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::patch::{self, ApplyAllError, Patch, PatchError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("document must be a JSON object")]
    NotAnObject,
    #[error("document is missing a string `{0}`")]
    MissingField(&'static str),
    #[error("revision mismatch: expected {expected:?}, document is at {actual:?}")]
    RevisionMismatch {
        expected: String,
        actual: Option<String>,
    },
}

/// A document value carrying a string `_id` and `_type`.
///
/// The revision token lives in `_rev`. It is opaque and set by whichever
/// authority last accepted a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Document(Value);

impl Document {
    pub fn new(value: Value) -> Result<Self, DocumentError> {
        let map = value.as_object().ok_or(DocumentError::NotAnObject)?;
        for field in ["_id", "_type"] {
            if !map.get(field).is_some_and(Value::is_string) {
                return Err(DocumentError::MissingField(field));
            }
        }
        Ok(Self(value))
    }

    pub fn id(&self) -> &str {
        self.str_field("_id").unwrap_or_default()
    }

    pub fn doc_type(&self) -> &str {
        self.str_field("_type").unwrap_or_default()
    }

    pub fn revision(&self) -> Option<&str> {
        self.str_field("_rev")
    }

    pub fn set_revision(&mut self, revision: impl Into<String>) {
        if let Value::Object(map) = &mut self.0 {
            map.insert("_rev".to_string(), Value::String(revision.into()));
        }
    }

    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.set_revision(revision);
        self
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn str_field(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    /// Apply one patch, returning the patched document.
    ///
    /// Fails with [`PatchError::InvalidDocument`] if the result lost its
    /// identity fields.
    pub fn apply(&self, patch: &Patch) -> Result<Document, PatchError> {
        self.apply_with(patch, &patch::ApplyOptions::default())
    }

    pub fn apply_with(&self, patch: &Patch, options: &patch::ApplyOptions) -> Result<Document, PatchError> {
        let mut value = self.0.clone();
        patch::apply_in_place_with(&mut value, patch, options)?;
        Document::new(value).map_err(|err| PatchError::InvalidDocument(err.to_string()))
    }

    /// Apply patches in order, stopping at the first failure.
    pub fn apply_all(&self, patches: &[Patch]) -> Result<Document, ApplyAllError> {
        self.apply_all_with(patches, &patch::ApplyOptions::default())
    }

    pub fn apply_all_with(&self, patches: &[Patch], options: &patch::ApplyOptions) -> Result<Document, ApplyAllError> {
        let value = patch::apply_all_with(&self.0, patches, options)?;
        Document::new(value).map_err(|err| ApplyAllError {
            index: patches.len().saturating_sub(1),
            patch_id: patches.last().map(|p| p.id.clone()).unwrap_or_default(),
            source: PatchError::InvalidDocument(err.to_string()),
        })
    }
}

/// Guard for `ifRevisionID`: the document must currently be at `expected`.
pub fn check_revision(document: &Document, expected: &str) -> Result<(), DocumentError> {
    if document.revision() == Some(expected) {
        Ok(())
    } else {
        Err(DocumentError::RevisionMismatch {
            expected: expected.to_string(),
            actual: document.revision().map(str::to_string),
        })
    }
}

impl TryFrom<Value> for Document {
    type Error = DocumentError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Document::new(value)
    }
}

impl From<Document> for Value {
    fn from(document: Document) -> Self {
        document.0
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Document::new(value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpatch_path::Segment;
    use serde_json::json;

    fn doc() -> Document {
        Document::new(json!({"_id": "d1", "_type": "article", "_rev": "r1", "title": "x"})).unwrap()
    }

    #[test]
    fn requires_identity_fields() {
        assert_eq!(Document::new(json!([])), Err(DocumentError::NotAnObject));
        assert_eq!(
            Document::new(json!({"_type": "a"})),
            Err(DocumentError::MissingField("_id"))
        );
        assert_eq!(
            Document::new(json!({"_id": "a", "_type": 3})),
            Err(DocumentError::MissingField("_type"))
        );
        let d = doc();
        assert_eq!((d.id(), d.doc_type(), d.revision()), ("d1", "article", Some("r1")));
    }

    #[test]
    fn apply_revalidates() {
        let d = doc();
        let out = d.apply(&Patch::set(vec![Segment::field("title")], json!("y"))).unwrap();
        assert_eq!(out.as_value()["title"], json!("y"));
        let err = d.apply(&Patch::unset(vec![Segment::field("_id")])).unwrap_err();
        assert!(matches!(err, PatchError::InvalidDocument(_)));
    }

    #[test]
    fn revision_check() {
        let d = doc();
        assert!(check_revision(&d, "r1").is_ok());
        assert_eq!(
            check_revision(&d, "r0"),
            Err(DocumentError::RevisionMismatch { expected: "r0".into(), actual: Some("r1".into()) })
        );
        assert_eq!(d.with_revision("r2").revision(), Some("r2"));
    }

    #[test]
    fn deserializes_with_validation() {
        let d: Document = serde_json::from_value(json!({"_id": "a", "_type": "t"})).unwrap();
        assert_eq!(d.id(), "a");
        assert!(serde_json::from_value::<Document>(json!({"_id": "a"})).is_err());
    }
}
