//! One actor task per document.
//!
//! The task owns the [`WorkingState`]; every transition arrives as a command
//! over an mpsc channel, so there is exactly one writer. The current document
//! is published on a `watch` channel and lifecycle notifications on a
//! broadcast channel.
//!
//! Local edits apply immediately and are then flushed to the
//! [`TransactionSink`] in a spawned task. Successful commits keep their
//! patches pending until the authority echoes them back (or a later snapshot
//! covers them), so the local view never flickers back to the old base.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::events::{ReconciliationConflict, RemoteEvent};
use super::sink::{CommitError, CommitResult, PatchOptions, TransactionSink};
use super::state::WorkingState;
use crate::changeset::{ChangeSet, Direction};
use crate::document::Document;
use crate::patch::{ApplyAllError, ApplyOptions, Patch};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Flush after every accepted edit.
    pub auto_flush: bool,
    /// Guard each flush with the last known revision.
    pub use_if_revision: bool,
    pub command_capacity: usize,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_flush: true,
            use_if_revision: true,
            command_capacity: 64,
            event_capacity: 64,
        }
    }
}

/// Notifications published by a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The current document changed.
    Changed { revision: Option<String>, pending: usize },
    /// Local work conflicted with the authority. `dropped` lists the patches
    /// that were lost; it is empty when a stale commit was only re-queued.
    Conflict(ReconciliationConflict),
    /// The session cannot continue from its base; fetch a snapshot and feed
    /// it back through [`DocumentSession::remote`].
    SnapshotRequired { reason: String },
    Committed { transaction_id: String, patches: usize },
    CommitFailed(CommitError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SessionError {
    #[error("session task has stopped")]
    Closed,
    #[error("edit rejected: {0}")]
    Rejected(#[from] ApplyAllError),
    #[error("local changes were discarded")]
    Discarded,
    #[error("commit failed: {0}")]
    Commit(#[from] CommitError),
}

type FlushReply = oneshot::Sender<Result<Option<CommitResult>, SessionError>>;

enum Command {
    Edit {
        patches: Vec<Patch>,
        reply: oneshot::Sender<Result<Document, SessionError>>,
    },
    Revert {
        changes: ChangeSet,
        direction: Direction,
        reply: oneshot::Sender<Result<Document, SessionError>>,
    },
    Remote(RemoteEvent),
    Detach,
    Attach,
    Discard {
        reply: oneshot::Sender<Vec<Patch>>,
    },
    Flush {
        reply: FlushReply,
    },
    Pending {
        reply: oneshot::Sender<Vec<Patch>>,
    },
}

/// Handle to a running session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DocumentSession {
    document_id: String,
    commands: mpsc::Sender<Command>,
    current: watch::Receiver<Document>,
    events: broadcast::Sender<SessionEvent>,
}

impl DocumentSession {
    /// Start the actor for `base`. The task ends when every handle is dropped.
    pub fn spawn<S>(base: Document, sink: S, config: SessionConfig, apply: ApplyOptions) -> (Self, JoinHandle<()>)
    where
        S: TransactionSink + 'static,
    {
        let (commands, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let (current_tx, current) = watch::channel(base.clone());
        let (flush_done, flush_rx) = mpsc::unbounded_channel();
        let document_id = base.id().to_string();

        let actor = Actor {
            document_id: document_id.clone(),
            state: WorkingState::with_options(base, apply),
            sink: Arc::new(Mutex::new(sink)),
            config,
            attached: true,
            current: current_tx,
            events: events.clone(),
            flush_done,
            in_flight: None,
            queued: Vec::new(),
            generation: 0,
            committed: HashSet::new(),
            expected_rev: None,
        };
        let handle = tokio::spawn(actor.run(command_rx, flush_rx));
        (
            Self {
                document_id,
                commands,
                current,
                events,
            },
            handle,
        )
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    /// The latest published document.
    pub fn current(&self) -> Document {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Document> {
        self.current.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.commands.send(command).await.map_err(|_| SessionError::Closed)
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply)).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    /// Apply a batch of local patches; all or none are accepted.
    pub async fn edit(&self, patches: Vec<Patch>) -> Result<Document, SessionError> {
        self.request(|reply| Command::Edit { patches, reply }).await?
    }

    pub async fn revert(&self, changes: ChangeSet, direction: Direction) -> Result<Document, SessionError> {
        self.request(|reply| Command::Revert {
            changes,
            direction,
            reply,
        })
        .await?
    }

    /// Deliver one event from the realtime stream.
    pub async fn remote(&self, event: RemoteEvent) -> Result<(), SessionError> {
        self.send(Command::Remote(event)).await
    }

    /// Stop applying remote events. Pending patches are kept.
    pub async fn detach(&self) -> Result<(), SessionError> {
        self.send(Command::Detach).await
    }

    /// Resume after [`detach`](Self::detach); emits `SnapshotRequired`.
    pub async fn attach(&self) -> Result<(), SessionError> {
        self.send(Command::Attach).await
    }

    /// Drop all pending patches and abort any in-flight flush.
    pub async fn discard_local_changes(&self) -> Result<Vec<Patch>, SessionError> {
        self.request(|reply| Command::Discard { reply }).await
    }

    /// Submit unsubmitted patches now. Resolves with `None` when there was
    /// nothing to send.
    pub async fn flush(&self) -> Result<Option<CommitResult>, SessionError> {
        self.request(|reply| Command::Flush { reply }).await?
    }

    pub async fn pending(&self) -> Result<Vec<Patch>, SessionError> {
        self.request(|reply| Command::Pending { reply }).await
    }

    /// Forward events for this document from a realtime stream, in order.
    pub fn follow(&self, mut stream: broadcast::Receiver<RemoteEvent>) -> JoinHandle<()> {
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                match stream.recv().await {
                    Ok(event) => {
                        if event.document_id() != session.document_id {
                            continue;
                        }
                        if session.remote(event).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(document = %session.document_id, missed, "remote stream lagged");
                        let _ = session.events.send(SessionEvent::SnapshotRequired {
                            reason: format!("missed {missed} remote events"),
                        });
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!(document = %session.document_id, "stopped following remote stream");
        })
    }
}

// ── Actor ────────────────────────────────────────────────────────────────

struct FlushOutcome {
    generation: u64,
    ids: Vec<String>,
    result: Result<CommitResult, CommitError>,
}

struct InFlight {
    handle: JoinHandle<()>,
    waiters: Vec<FlushReply>,
}

struct Actor<S> {
    document_id: String,
    state: WorkingState,
    sink: Arc<Mutex<S>>,
    config: SessionConfig,
    attached: bool,
    current: watch::Sender<Document>,
    events: broadcast::Sender<SessionEvent>,
    flush_done: mpsc::UnboundedSender<FlushOutcome>,
    in_flight: Option<InFlight>,
    /// Flush requests that arrived while another flush was running.
    queued: Vec<FlushReply>,
    /// Bumped on discard so outcomes of aborted flushes are ignored.
    generation: u64,
    /// Pending ids the authority has accepted but not yet echoed.
    committed: HashSet<String>,
    /// Revision produced by our last commit, until the base catches up.
    expected_rev: Option<String>,
}

impl<S: TransactionSink + 'static> Actor<S> {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>, mut flushes: mpsc::UnboundedReceiver<FlushOutcome>) {
        debug!(document = %self.document_id, "session started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(outcome) = flushes.recv() => self.flush_finished(outcome),
            }
        }
        debug!(document = %self.document_id, pending = self.state.pending().len(), "session closed");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Edit { patches, reply } => {
                let result = self.state.local_edits(patches).map(Document::clone);
                self.after_local(result, reply);
            }
            Command::Revert {
                changes,
                direction,
                reply,
            } => {
                let result = self.state.revert(&changes, direction).map(Document::clone);
                self.after_local(result, reply);
            }
            Command::Remote(event) => self.remote(event),
            Command::Detach => {
                debug!(document = %self.document_id, pending = self.state.pending().len(), "detached");
                self.attached = false;
            }
            Command::Attach => {
                debug!(document = %self.document_id, "attached");
                self.attached = true;
                self.emit(SessionEvent::SnapshotRequired {
                    reason: "session re-attached".to_string(),
                });
            }
            Command::Discard { reply } => {
                let dropped = self.discard();
                let _ = reply.send(dropped);
            }
            Command::Flush { reply } => {
                if self.in_flight.is_some() {
                    self.queued.push(reply);
                } else {
                    self.start_flush(vec![reply]);
                }
            }
            Command::Pending { reply } => {
                let _ = reply.send(self.state.pending().to_vec());
            }
        }
    }

    fn after_local(
        &mut self,
        result: Result<Document, ApplyAllError>,
        reply: oneshot::Sender<Result<Document, SessionError>>,
    ) {
        match result {
            Ok(document) => {
                self.publish();
                let _ = reply.send(Ok(document));
                if self.config.auto_flush && self.attached && self.in_flight.is_none() {
                    self.start_flush(Vec::new());
                }
            }
            Err(err) => {
                debug!(document = %self.document_id, error = %err, "local edit rejected");
                let _ = reply.send(Err(SessionError::Rejected(err)));
            }
        }
    }

    fn remote(&mut self, event: RemoteEvent) {
        if !self.attached {
            debug!(document = %self.document_id, "ignoring remote event while detached");
            return;
        }
        let event = match event {
            RemoteEvent::Snapshot {
                document_id,
                document,
                mut confirmed,
            } => {
                // A snapshot taken after a successful commit already contains it.
                confirmed.extend(self.committed.iter().cloned());
                self.expected_rev = None;
                RemoteEvent::Snapshot {
                    document_id,
                    document,
                    confirmed,
                }
            }
            mutation => mutation,
        };
        let is_snapshot = matches!(event, RemoteEvent::Snapshot { .. });

        match self.state.apply_remote_event(&event) {
            Ok(conflict) => {
                let pending: HashSet<&str> = self.state.pending().iter().map(|p| p.id.as_str()).collect();
                self.committed.retain(|id| pending.contains(id.as_str()));
                if self.expected_rev.is_some() && self.expected_rev.as_deref() == self.state.base().revision() {
                    self.expected_rev = None;
                }
                if let Some(conflict) = conflict {
                    self.emit(SessionEvent::Conflict(conflict));
                }
                self.publish();
                if is_snapshot && self.config.auto_flush && self.in_flight.is_none() {
                    self.start_flush(Vec::new());
                }
            }
            Err(err) if err.requires_snapshot() => {
                warn!(document = %self.document_id, error = %err, "remote event needs a fresh snapshot");
                self.emit(SessionEvent::SnapshotRequired { reason: err.to_string() });
            }
            Err(err) => {
                warn!(document = %self.document_id, error = %err, "ignoring remote event");
            }
        }
    }

    fn discard(&mut self) -> Vec<Patch> {
        self.generation += 1;
        if let Some(flight) = self.in_flight.take() {
            flight.handle.abort();
            for waiter in flight.waiters {
                let _ = waiter.send(Err(SessionError::Discarded));
            }
        }
        for waiter in self.queued.drain(..) {
            let _ = waiter.send(Err(SessionError::Discarded));
        }
        self.committed.clear();
        self.expected_rev = None;
        let dropped = self.state.discard_local_changes();
        debug!(document = %self.document_id, dropped = dropped.len(), "discarded local changes");
        self.publish();
        dropped
    }

    // ── Flushing ─────────────────────────────────────────────────────────

    fn start_flush(&mut self, waiters: Vec<FlushReply>) {
        let patches = self.state.mark_submitted();
        if patches.is_empty() {
            for waiter in waiters {
                let _ = waiter.send(Ok(None));
            }
            return;
        }

        let ids: Vec<String> = patches.iter().map(|p| p.id.clone()).collect();
        let options = PatchOptions {
            if_revision_id: if self.config.use_if_revision {
                self.expected_rev
                    .clone()
                    .or_else(|| self.state.base().revision().map(str::to_string))
            } else {
                None
            },
        };
        debug!(
            document = %self.document_id,
            patches = ids.len(),
            if_revision = ?options.if_revision_id,
            "flushing pending patches"
        );

        let sink = Arc::clone(&self.sink);
        let done = self.flush_done.clone();
        let generation = self.generation;
        let document_id = self.document_id.clone();
        let handle = tokio::spawn(async move {
            let result = async {
                let mut sink = sink.lock().await;
                sink.patch(&document_id, patches, options).await?;
                sink.commit().await
            }
            .await;
            let _ = done.send(FlushOutcome {
                generation,
                ids,
                result,
            });
        });
        self.in_flight = Some(InFlight { handle, waiters });
    }

    fn flush_finished(&mut self, outcome: FlushOutcome) {
        if outcome.generation != self.generation {
            return;
        }
        let waiters = self.in_flight.take().map(|f| f.waiters).unwrap_or_default();

        let retry = match outcome.result {
            Ok(result) => {
                debug!(
                    document = %self.document_id,
                    transaction = %result.transaction_id,
                    patches = outcome.ids.len(),
                    "flush committed"
                );
                if let Some(mine) = result.results.iter().find(|r| r.document_id == self.document_id) {
                    if self.state.base().revision() != Some(mine.result_rev.as_str()) {
                        self.expected_rev = Some(mine.result_rev.clone());
                    }
                }
                // The echo may already have confirmed some of them.
                let pending: HashSet<&str> = self.state.pending().iter().map(|p| p.id.as_str()).collect();
                self.committed
                    .extend(outcome.ids.iter().filter(|id| pending.contains(id.as_str())).cloned());
                self.emit(SessionEvent::Committed {
                    transaction_id: result.transaction_id.clone(),
                    patches: outcome.ids.len(),
                });
                for waiter in waiters {
                    let _ = waiter.send(Ok(Some(result.clone())));
                }
                true
            }
            Err(err @ CommitError::RevisionMismatch { .. }) => {
                warn!(document = %self.document_id, error = %err, "flush rejected as stale");
                self.state.unmark_submitted(&outcome.ids);
                self.expected_rev = None;
                // Nothing is dropped: the patches wait for the snapshot rebase.
                self.emit(SessionEvent::Conflict(ReconciliationConflict {
                    dropped: Vec::new(),
                    reason: err.to_string(),
                }));
                self.emit(SessionEvent::SnapshotRequired { reason: err.to_string() });
                self.emit(SessionEvent::CommitFailed(err.clone()));
                self.fail_waiters(waiters, &err);
                false
            }
            Err(err) => {
                let conflict = self.state.submission_failed(&outcome.ids, err.to_string());
                self.emit(SessionEvent::Conflict(conflict));
                self.emit(SessionEvent::CommitFailed(err.clone()));
                self.publish();
                self.fail_waiters(waiters, &err);
                false
            }
        };

        // Explicit flush requests still go out while detached.
        if retry && (!self.queued.is_empty() || (self.config.auto_flush && self.attached)) {
            let queued = std::mem::take(&mut self.queued);
            self.start_flush(queued);
        }
    }

    fn fail_waiters(&mut self, waiters: Vec<FlushReply>, err: &CommitError) {
        for waiter in waiters.into_iter().chain(self.queued.drain(..)) {
            let _ = waiter.send(Err(SessionError::Commit(err.clone())));
        }
    }

    // ── Publishing ───────────────────────────────────────────────────────

    fn publish(&mut self) {
        self.current.send_replace(self.state.current().clone());
        self.emit(SessionEvent::Changed {
            revision: self.state.base().revision().map(str::to_string),
            pending: self.state.pending().len(),
        });
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
