//! The write side of the transport.

use async_trait::async_trait;
use thiserror::Error;

use crate::document::Document;
use crate::patch::{ApplyAllError, Patch};

/// Options for [`TransactionSink::patch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatchOptions {
    /// Reject the mutation unless the document is at this revision.
    pub if_revision_id: Option<String>,
}

/// Outcome of one mutation inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationResult {
    pub document_id: String,
    pub result_rev: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    pub transaction_id: String,
    pub results: Vec<MutationResult>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CommitError {
    /// An `ifRevisionID` guard failed. Recover by fetching a fresh snapshot.
    #[error("document {document_id} is at revision {actual:?}, expected {expected}")]
    RevisionMismatch {
        document_id: String,
        expected: String,
        actual: Option<String>,
    },
    #[error("document {0} does not exist")]
    NotFound(String),
    #[error("patches rejected for document {document_id}: {source}")]
    Rejected {
        document_id: String,
        #[source]
        source: ApplyAllError,
    },
    #[error("transport unavailable: {0}")]
    Unavailable(String),
}

/// Stages mutations and commits them as one transaction.
#[async_trait]
pub trait TransactionSink: Send {
    async fn create_or_replace(&mut self, document: Document) -> Result<(), CommitError>;

    async fn patch(&mut self, document_id: &str, patches: Vec<Patch>, options: PatchOptions) -> Result<(), CommitError>;

    /// Commit everything staged since the last commit, all or nothing.
    async fn commit(&mut self) -> Result<CommitResult, CommitError>;
}
