//! Events arriving from the authority.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{Document, DocumentError};
use crate::patch::{ApplyAllError, Patch};

/// One event from the realtime stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RemoteEvent {
    /// A mutation accepted by the authority. `patches` keep the ids they were
    /// submitted with, so a local author recognises its own echo.
    #[serde(rename_all = "camelCase")]
    Mutation {
        document_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous_rev: Option<String>,
        result_rev: String,
        patches: Vec<Patch>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_id: Option<String>,
    },
    /// A full document snapshot, optionally confirming pending patch ids.
    #[serde(rename_all = "camelCase")]
    Snapshot {
        document_id: String,
        document: Document,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        confirmed: Vec<String>,
    },
}

impl RemoteEvent {
    pub fn document_id(&self) -> &str {
        match self {
            RemoteEvent::Mutation { document_id, .. } | RemoteEvent::Snapshot { document_id, .. } => document_id,
        }
    }

    pub fn snapshot(document: Document) -> Self {
        RemoteEvent::Snapshot {
            document_id: document.id().to_string(),
            document,
            confirmed: Vec::new(),
        }
    }
}

/// Pending patches dropped because they no longer apply on top of the new base.
///
/// Not fatal: the surviving prefix of the queue stays applied.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("{} pending patch(es) dropped: {reason}", .dropped.len())]
pub struct ReconciliationConflict {
    /// Ids of the dropped patches, in authoring order.
    pub dropped: Vec<String>,
    pub reason: String,
}

/// A remote event that could not be folded into the working state.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RemoteEventError {
    #[error("event for document {got:?} delivered to {expected:?}")]
    WrongDocument { expected: String, got: String },
    #[error("revision gap: base is at {base:?}, mutation expects {previous:?}")]
    RevisionGap { base: Option<String>, previous: String },
    #[error("remote mutation does not apply to base: {0}")]
    MutationFailed(#[source] ApplyAllError),
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(#[from] DocumentError),
}

impl RemoteEventError {
    /// Whether the caller should fetch a fresh snapshot to recover.
    pub fn requires_snapshot(&self) -> bool {
        !matches!(self, RemoteEventError::WrongDocument { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wire_events() {
        let event: RemoteEvent = serde_json::from_value(json!({
            "type": "mutation",
            "documentId": "d1",
            "resultRev": "r2",
            "patches": [{"id": "p1", "path": ["title"], "set": "x"}]
        }))
        .unwrap();
        match &event {
            RemoteEvent::Mutation { previous_rev, result_rev, patches, .. } => {
                assert_eq!(previous_rev, &None);
                assert_eq!(result_rev, "r2");
                assert_eq!(patches[0].id, "p1");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(event.document_id(), "d1");

        let event: RemoteEvent = serde_json::from_value(json!({
            "type": "snapshot",
            "documentId": "d1",
            "document": {"_id": "d1", "_type": "t", "_rev": "r3"}
        }))
        .unwrap();
        assert!(matches!(event, RemoteEvent::Snapshot { ref confirmed, .. } if confirmed.is_empty()));
    }

    #[test]
    fn conflict_message() {
        let conflict = ReconciliationConflict {
            dropped: vec!["a".into(), "b".into()],
            reason: "gone".into(),
        };
        assert_eq!(conflict.to_string(), "2 pending patch(es) dropped: gone");
    }
}
