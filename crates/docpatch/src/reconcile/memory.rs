//! An in-memory authority: accepts transactions and broadcasts the
//! resulting events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::events::RemoteEvent;
use super::sink::{CommitError, CommitResult, MutationResult, PatchOptions, TransactionSink};
use crate::document::Document;
use crate::keys::patch_id;
use crate::patch::Patch;

#[derive(Debug)]
enum Staged {
    CreateOrReplace(Document),
    Patch {
        document_id: String,
        patches: Vec<Patch>,
        options: PatchOptions,
    },
}

#[derive(Debug, Default)]
struct Shared {
    documents: HashMap<String, Document>,
    revisions: u64,
}

impl Shared {
    fn next_revision(&mut self) -> String {
        self.revisions += 1;
        format!("rev-{}", self.revisions)
    }
}

/// Shared document store. Clones see the same documents but stage their own
/// transactions.
#[derive(Debug)]
pub struct MemoryStore {
    shared: Arc<Mutex<Shared>>,
    events: broadcast::Sender<RemoteEvent>,
    staged: Vec<Staged>,
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            events: self.events.clone(),
            staged: Vec::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(256)
    }
}

impl MemoryStore {
    pub fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            shared: Arc::new(Mutex::new(Shared::default())),
            events,
            staged: Vec::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Subscribe to committed mutations and snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<RemoteEvent> {
        self.events.subscribe()
    }

    pub fn get(&self, document_id: &str) -> Option<Document> {
        self.lock().documents.get(document_id).cloned()
    }

    /// Store a document directly, assigning it a fresh revision. No event is
    /// broadcast.
    pub fn seed(&self, document: Document) -> Document {
        let mut shared = self.lock();
        let document = document.with_revision(shared.next_revision());
        shared.documents.insert(document.id().to_string(), document.clone());
        document
    }
}

#[async_trait]
impl TransactionSink for MemoryStore {
    async fn create_or_replace(&mut self, document: Document) -> Result<(), CommitError> {
        self.staged.push(Staged::CreateOrReplace(document));
        Ok(())
    }

    async fn patch(&mut self, document_id: &str, patches: Vec<Patch>, options: PatchOptions) -> Result<(), CommitError> {
        self.staged.push(Staged::Patch {
            document_id: document_id.to_string(),
            patches,
            options,
        });
        Ok(())
    }

    async fn commit(&mut self) -> Result<CommitResult, CommitError> {
        let staged = std::mem::take(&mut self.staged);
        let transaction_id = patch_id();
        let mut shared = self.lock();
        let mut documents = shared.documents.clone();
        let mut revisions = shared.revisions;
        let mut results = Vec::with_capacity(staged.len());
        let mut events = Vec::with_capacity(staged.len());

        for mutation in staged {
            revisions += 1;
            let result_rev = format!("rev-{revisions}");
            match mutation {
                Staged::CreateOrReplace(document) => {
                    let document = document.with_revision(result_rev.clone());
                    let document_id = document.id().to_string();
                    documents.insert(document_id.clone(), document.clone());
                    events.push(RemoteEvent::snapshot(document));
                    results.push(MutationResult { document_id, result_rev });
                }
                Staged::Patch {
                    document_id,
                    patches,
                    options,
                } => {
                    let current = documents
                        .get(&document_id)
                        .ok_or_else(|| CommitError::NotFound(document_id.clone()))?;
                    if let Some(expected) = options.if_revision_id {
                        if current.revision() != Some(expected.as_str()) {
                            return Err(CommitError::RevisionMismatch {
                                document_id,
                                expected,
                                actual: current.revision().map(str::to_string),
                            });
                        }
                    }
                    let previous_rev = current.revision().map(str::to_string);
                    let next = current
                        .apply_all(&patches)
                        .map_err(|source| CommitError::Rejected {
                            document_id: document_id.clone(),
                            source,
                        })?
                        .with_revision(result_rev.clone());
                    documents.insert(document_id.clone(), next);
                    events.push(RemoteEvent::Mutation {
                        document_id: document_id.clone(),
                        previous_rev,
                        result_rev: result_rev.clone(),
                        patches,
                        transaction_id: Some(transaction_id.clone()),
                    });
                    results.push(MutationResult { document_id, result_rev });
                }
            }
        }

        shared.documents = documents;
        shared.revisions = revisions;
        drop(shared);
        debug!(transaction = %transaction_id, mutations = results.len(), "transaction committed");
        for event in events {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        Ok(CommitResult {
            transaction_id,
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpatch_path::Segment;
    use serde_json::json;

    fn doc() -> Document {
        Document::new(json!({"_id": "d", "_type": "t", "n": 1})).unwrap()
    }

    #[tokio::test]
    async fn commit_applies_and_broadcasts() {
        let mut store = MemoryStore::default();
        let mut events = store.subscribe();
        let seeded = store.seed(doc());
        assert_eq!(seeded.revision(), Some("rev-1"));

        let patch = Patch::inc(vec![Segment::field("n")], 1.0).with_id("p1");
        store
            .patch("d", vec![patch], PatchOptions { if_revision_id: Some("rev-1".into()) })
            .await
            .unwrap();
        let result = store.commit().await.unwrap();
        assert_eq!(result.results[0].result_rev, "rev-2");
        assert_eq!(store.get("d").unwrap().as_value()["n"], json!(2));

        match events.recv().await.unwrap() {
            RemoteEvent::Mutation { previous_rev, result_rev, patches, .. } => {
                assert_eq!(previous_rev.as_deref(), Some("rev-1"));
                assert_eq!(result_rev, "rev-2");
                assert_eq!(patches[0].id, "p1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_transaction_changes_nothing() {
        let mut store = MemoryStore::default();
        store.seed(doc());
        store.create_or_replace(Document::new(json!({"_id": "e", "_type": "t"})).unwrap()).await.unwrap();
        store
            .patch("d", vec![Patch::set(vec![Segment::field("n")], json!(5))], PatchOptions { if_revision_id: Some("stale".into()) })
            .await
            .unwrap();
        assert!(matches!(store.commit().await, Err(CommitError::RevisionMismatch { .. })));
        assert!(store.get("e").is_none());
        assert_eq!(store.get("d").unwrap().as_value()["n"], json!(1));

        store.patch("missing", vec![], PatchOptions::default()).await.unwrap();
        assert_eq!(store.commit().await, Err(CommitError::NotFound("missing".into())));
    }
}
