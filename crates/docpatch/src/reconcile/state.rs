//! The working state: a confirmed base plus a queue of local patches.

use std::collections::HashSet;

use tracing::{debug, warn};

use super::events::{ReconciliationConflict, RemoteEvent, RemoteEventError};
use crate::changeset::{ChangeSet, Direction};
use crate::document::Document;
use crate::patch::{ApplyAllError, ApplyOptions, Patch, PatchError};

/// `current` always equals `base` with `pending` applied in order.
#[derive(Debug, Clone)]
pub struct WorkingState {
    base: Document,
    pending: Vec<Patch>,
    /// Ids of pending patches already handed to the transport.
    submitted: HashSet<String>,
    current: Document,
    options: ApplyOptions,
}

impl WorkingState {
    pub fn new(base: Document) -> Self {
        Self::with_options(base, ApplyOptions::default())
    }

    pub fn with_options(base: Document, options: ApplyOptions) -> Self {
        Self {
            current: base.clone(),
            base,
            pending: Vec::new(),
            submitted: HashSet::new(),
            options,
        }
    }

    pub fn base(&self) -> &Document {
        &self.base
    }

    pub fn current(&self) -> &Document {
        &self.current
    }

    pub fn pending(&self) -> &[Patch] {
        &self.pending
    }

    /// True when no local patch is waiting for confirmation.
    pub fn is_consistent(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending patches not yet handed to the transport.
    pub fn unsubmitted(&self) -> Vec<&Patch> {
        self.pending
            .iter()
            .filter(|p| !self.submitted.contains(&p.id))
            .collect()
    }

    // ── Local edits ──────────────────────────────────────────────────────

    /// Apply `patch` to the current document and queue it.
    ///
    /// On error nothing changes.
    pub fn local_edit(&mut self, patch: Patch) -> Result<&Document, PatchError> {
        let next = self.current.apply_with(&patch, &self.options)?;
        self.pending.push(patch);
        self.current = next;
        Ok(&self.current)
    }

    /// Apply a batch of patches; either all are queued or none.
    pub fn local_edits(&mut self, patches: Vec<Patch>) -> Result<&Document, ApplyAllError> {
        let next = self.current.apply_all_with(&patches, &self.options)?;
        self.pending.extend(patches);
        self.current = next;
        Ok(&self.current)
    }

    /// Queue the patches of `changes` in `direction` as local edits.
    ///
    /// The batch is checked against the current document first, so a revert
    /// that cannot apply in full leaves the state untouched.
    pub fn revert(&mut self, changes: &ChangeSet, direction: Direction) -> Result<&Document, ApplyAllError> {
        let patches = changes.patches(direction);
        debug!(
            document = %self.base.id(),
            ?direction,
            patches = patches.len(),
            "reverting changes"
        );
        self.local_edits(patches)
    }

    /// Drop every pending patch and fall back to the base.
    pub fn discard_local_changes(&mut self) -> Vec<Patch> {
        self.submitted.clear();
        self.current = self.base.clone();
        std::mem::take(&mut self.pending)
    }

    // ── Transport bookkeeping ───────────────────────────────────────────

    /// Mark every unsubmitted patch as submitted and return them, in order.
    pub fn mark_submitted(&mut self) -> Vec<Patch> {
        let batch: Vec<Patch> = self.unsubmitted().into_iter().cloned().collect();
        self.submitted.extend(batch.iter().map(|p| p.id.clone()));
        batch
    }

    /// Make submitted patches eligible for submission again.
    pub fn unmark_submitted(&mut self, ids: &[String]) {
        for id in ids {
            self.submitted.remove(id);
        }
    }

    /// The authority rejected `ids`: drop them and rebuild the current document.
    pub fn submission_failed(&mut self, ids: &[String], reason: impl Into<String>) -> ReconciliationConflict {
        let reason = reason.into();
        let before = self.pending.len();
        self.pending.retain(|p| !ids.contains(&p.id));
        let mut dropped: Vec<String> = ids.to_vec();
        for id in ids {
            self.submitted.remove(id);
        }
        warn!(
            document = %self.base.id(),
            dropped = before - self.pending.len(),
            %reason,
            "submission failed"
        );
        if let Some(conflict) = self.rebuild() {
            dropped.extend(conflict.dropped);
        }
        ReconciliationConflict { dropped, reason }
    }

    // ── Remote state ─────────────────────────────────────────────────────

    /// Replace the base, forget confirmed patches, and replay the rest.
    ///
    /// A pending patch that no longer applies is dropped together with every
    /// patch after it; the dropped ids are reported in the returned conflict.
    pub fn remote_snapshot(&mut self, new_base: Document, confirmed: &[String]) -> Option<ReconciliationConflict> {
        self.pending.retain(|p| !confirmed.contains(&p.id));
        for id in confirmed {
            self.submitted.remove(id);
        }
        self.base = new_base;
        debug!(
            document = %self.base.id(),
            revision = ?self.base.revision(),
            confirmed = confirmed.len(),
            pending = self.pending.len(),
            "rebasing pending patches"
        );
        self.rebuild()
    }

    /// Fold one realtime event into the state.
    pub fn apply_remote_event(&mut self, event: &RemoteEvent) -> Result<Option<ReconciliationConflict>, RemoteEventError> {
        if event.document_id() != self.base.id() {
            return Err(RemoteEventError::WrongDocument {
                expected: self.base.id().to_string(),
                got: event.document_id().to_string(),
            });
        }
        match event {
            RemoteEvent::Mutation {
                previous_rev,
                result_rev,
                patches,
                ..
            } => {
                if let Some(previous) = previous_rev {
                    if self.base.revision() != Some(previous.as_str()) {
                        return Err(RemoteEventError::RevisionGap {
                            base: self.base.revision().map(str::to_string),
                            previous: previous.clone(),
                        });
                    }
                }
                let next = self
                    .base
                    .apply_all_with(patches, &self.options)
                    .map_err(RemoteEventError::MutationFailed)?
                    .with_revision(result_rev.clone());
                let confirmed: Vec<String> = patches
                    .iter()
                    .filter(|p| self.pending.iter().any(|q| q.id == p.id))
                    .map(|p| p.id.clone())
                    .collect();
                Ok(self.remote_snapshot(next, &confirmed))
            }
            RemoteEvent::Snapshot {
                document,
                confirmed,
                ..
            } => Ok(self.remote_snapshot(document.clone(), confirmed)),
        }
    }

    /// Recompute `current` from `base` and `pending`, truncating the queue at
    /// the first patch that fails.
    fn rebuild(&mut self) -> Option<ReconciliationConflict> {
        let mut current = self.base.clone();
        let mut failure = None;
        for (index, patch) in self.pending.iter().enumerate() {
            match current.apply_with(patch, &self.options) {
                Ok(next) => current = next,
                Err(err) => {
                    failure = Some((index, err));
                    break;
                }
            }
        }
        self.current = current;

        let (index, err) = failure?;
        let dropped: Vec<String> = self.pending.split_off(index).into_iter().map(|p| p.id).collect();
        for id in &dropped {
            self.submitted.remove(id);
        }
        let conflict = ReconciliationConflict {
            dropped,
            reason: err.to_string(),
        };
        warn!(
            document = %self.base.id(),
            dropped = conflict.dropped.len(),
            reason = %conflict.reason,
            "pending patches no longer apply"
        );
        Some(conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;
    use docpatch_path::{parse_path, Segment};
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Document {
        Document::new(value).unwrap()
    }

    fn p(s: &str) -> Vec<Segment> {
        parse_path(s).unwrap()
    }

    fn base() -> Document {
        doc(json!({"_id": "d", "_type": "t", "_rev": "r1", "title": "a", "items": [{"_key": "k1", "v": 1}]}))
    }

    #[test]
    fn local_edit_updates_current() {
        let mut state = WorkingState::new(base());
        state.local_edit(Patch::set(p("title"), json!("b"))).unwrap();
        assert_eq!(state.current().as_value()["title"], json!("b"));
        assert_eq!(state.base().as_value()["title"], json!("a"));
        assert_eq!(state.pending().len(), 1);
        assert!(!state.is_consistent());
    }

    #[test]
    fn failed_local_edit_changes_nothing() {
        let mut state = WorkingState::new(base());
        let err = state.local_edit(Patch::set(p("title.deep"), json!(1))).unwrap_err();
        assert!(matches!(err, PatchError::ParentIsPrimitive { .. }));
        assert!(state.pending().is_empty());
        assert_eq!(state.current(), &base());

        let batch = vec![Patch::set(p("x"), json!(1)), Patch::inc(p("title"), 1.0)];
        assert_eq!(state.local_edits(batch).unwrap_err().index, 1);
        assert!(state.pending().is_empty());
    }

    #[test]
    fn snapshot_confirms_and_replays() {
        let mut state = WorkingState::new(base());
        let mine = Patch::set(p("title"), json!("mine")).with_id("p1");
        let other = Patch::set(p("subtitle"), json!("s")).with_id("p2");
        state.local_edit(mine).unwrap();
        state.local_edit(other).unwrap();

        let remote = doc(json!({"_id": "d", "_type": "t", "_rev": "r2", "title": "mine", "items": [], "extra": 1}));
        assert!(state.remote_snapshot(remote, &["p1".to_string()]).is_none());
        assert_eq!(state.pending().len(), 1);
        assert_eq!(state.pending()[0].id, "p2");
        assert_eq!(state.current().as_value()["extra"], json!(1));
        assert_eq!(state.current().as_value()["subtitle"], json!("s"));
    }

    #[test]
    fn conflicting_patch_truncates_queue() {
        let mut state = WorkingState::new(base());
        state.local_edit(Patch::set(p("title"), json!("x")).with_id("ok")).unwrap();
        state.local_edit(Patch::inc(p(r#"items[_key=="k1"].v"#), 1.0).with_id("bad")).unwrap();
        state.local_edit(Patch::set(p("after"), json!(true)).with_id("later")).unwrap();

        let remote = doc(json!({"_id": "d", "_type": "t", "_rev": "r2", "title": "a", "items": [{"_key": "k1", "v": "text"}]}));
        let conflict = state.remote_snapshot(remote, &[]).unwrap();
        assert_eq!(conflict.dropped, vec!["bad".to_string(), "later".to_string()]);
        assert_eq!(state.pending().len(), 1);
        assert_eq!(state.current().as_value()["title"], json!("x"));
        assert!(state.current().as_value().get("after").is_none());
    }

    #[test]
    fn own_mutation_echo_is_confirmed() {
        let mut state = WorkingState::new(base());
        let patch = Patch::set(p("title"), json!("b")).with_id("p1");
        state.local_edit(patch.clone()).unwrap();
        let event = RemoteEvent::Mutation {
            document_id: "d".into(),
            previous_rev: Some("r1".into()),
            result_rev: "r2".into(),
            patches: vec![patch],
            transaction_id: Some("tx".into()),
        };
        assert_eq!(state.apply_remote_event(&event).unwrap(), None);
        assert!(state.is_consistent());
        assert_eq!(state.base().revision(), Some("r2"));
        assert_eq!(state.current().as_value()["title"], json!("b"));
    }

    #[test]
    fn mutation_with_revision_gap_needs_snapshot() {
        let mut state = WorkingState::new(base());
        let event = RemoteEvent::Mutation {
            document_id: "d".into(),
            previous_rev: Some("r7".into()),
            result_rev: "r8".into(),
            patches: vec![],
            transaction_id: None,
        };
        let err = state.apply_remote_event(&event).unwrap_err();
        assert!(err.requires_snapshot());
        let other = RemoteEvent::snapshot(doc(json!({"_id": "other", "_type": "t"})));
        assert!(!state.apply_remote_event(&other).unwrap_err().requires_snapshot());
    }

    #[test]
    fn submission_lifecycle() {
        let mut state = WorkingState::new(base());
        state.local_edit(Patch::set(p("a"), json!(1)).with_id("p1")).unwrap();
        assert_eq!(state.mark_submitted().len(), 1);
        state.local_edit(Patch::set(p("b"), json!(2)).with_id("p2")).unwrap();
        assert_eq!(state.unsubmitted().len(), 1);

        let conflict = state.submission_failed(&["p1".to_string()], "rejected");
        assert_eq!(conflict.dropped, vec!["p1".to_string()]);
        assert!(state.current().as_value().get("a").is_none());
        assert_eq!(state.current().as_value()["b"], json!(2));

        state.mark_submitted();
        state.unmark_submitted(&["p2".to_string()]);
        assert_eq!(state.unsubmitted().len(), 1);

        let dropped = state.discard_local_changes();
        assert_eq!(dropped.len(), 1);
        assert_eq!(state.current(), state.base());
    }

    #[test]
    fn revert_goes_through_the_queue() {
        let before = base();
        let mut state = WorkingState::new(before.clone());
        state.local_edit(Patch::set(p("title"), json!("changed"))).unwrap();
        let changes = ChangeSet::new(diff(before.as_value(), state.current().as_value()));
        state.revert(&changes, Direction::Inverse).unwrap();
        assert_eq!(state.pending().len(), 2);
        assert_eq!(state.current().as_value()["title"], json!("a"));
    }
}
