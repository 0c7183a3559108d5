//! Turning changes into patches, forward (`a → b`) or inverse (`b → a`).
//!
//! Keyed array items are restored next to their original predecessor
//! (`insert after [_key==prev]`), or at the front when they had none. This
//! recovers the original order when the surrounding items are unchanged, but
//! it does not promise the exact original index once other insertions and
//! removals have interleaved.
//!
//! When a change set knows the documents it was computed from (see
//! [`ChangeSet::with_documents`]), undoing an addition also removes the
//! furthest ancestor that only existed to hold it: one that is missing from
//! the document being restored and holds nothing but stubs once the
//! addition is gone. Stubs are `null`, empty containers, objects with only
//! `_type`/`_key`, and anything else the same change set removes.

use serde::Deserialize;
use serde_json::Value;

use docpatch_path::{get, item_key, split_last, starts_with, Path, Segment};

use crate::diff::{self, flatten, Change, DiffOptions, ItemPosition};
use crate::patch::{InsertPosition, Patch};
use crate::text::make_patch_text;

/// Which way to replay a change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Inverse,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ChangeSetOptions {
    /// Emit `diffMatchPatch` instead of `set` for long string edits.
    pub text_patches: bool,
    /// New text must be longer than this many characters.
    pub text_min_length: usize,
    /// Patch text must be shorter than this multiple of the new text.
    pub text_max_ratio: f64,
}

impl Default for ChangeSetOptions {
    fn default() -> Self {
        Self {
            text_patches: false,
            text_min_length: 30,
            text_max_ratio: 1.2,
        }
    }
}

/// An ordered list of changes plus the rules for turning them into patches.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
    options: ChangeSetOptions,
    /// `(a, b)` for changes describing `a → b`, when known.
    documents: Option<(Value, Value)>,
}

impl ChangeSet {
    pub fn new(changes: Vec<Change>) -> Self {
        Self {
            changes,
            options: ChangeSetOptions::default(),
            documents: None,
        }
    }

    pub fn with_options(mut self, options: ChangeSetOptions) -> Self {
        self.options = options;
        self
    }

    /// Record the documents the changes lead from and to, enabling the
    /// removal of emptied ancestors.
    pub fn with_documents(mut self, source: Value, target: Value) -> Self {
        self.documents = Some((source, target));
        self
    }

    /// Diff `a` against `b` and wrap the result.
    pub fn between(a: &Value, b: &Value, options: &DiffOptions) -> Self {
        Self::new(diff::diff_with(a, b, options)).with_documents(a.clone(), b.clone())
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Keep only the leaf changes matching `keep`.
    pub fn select(&self, mut keep: impl FnMut(&Change) -> bool) -> ChangeSet {
        let changes = flatten(self.changes.clone()).into_iter().filter(|c| keep(c)).collect();
        ChangeSet {
            changes,
            options: self.options.clone(),
            documents: self.documents.clone(),
        }
    }

    pub fn forward(&self) -> Vec<Patch> {
        self.patches(Direction::Forward)
    }

    pub fn inverse(&self) -> Vec<Patch> {
        self.patches(Direction::Inverse)
    }

    pub fn patches(&self, direction: Direction) -> Vec<Patch> {
        let mut emitter = Emitter {
            set: self,
            direction,
            removed: self.removed_paths(direction),
            unset: Vec::new(),
            out: Vec::new(),
        };
        for change in &self.changes {
            emitter.emit(change);
        }
        emitter.out
    }

    /// Paths this set deletes when replayed in `direction`.
    fn removed_paths(&self, direction: Direction) -> Vec<Path> {
        flatten(self.changes.clone())
            .into_iter()
            .filter_map(|change| match (change, direction) {
                (Change::Added { path, .. }, Direction::Inverse) | (Change::Removed { path, .. }, Direction::Forward) => {
                    Some(path)
                }
                _ => None,
            })
            .collect()
    }

    /// The documents as `(from, to)` for replaying in `direction`.
    fn endpoints(&self, direction: Direction) -> Option<(&Value, &Value)> {
        self.documents.as_ref().map(|(a, b)| match direction {
            Direction::Forward => (a, b),
            Direction::Inverse => (b, a),
        })
    }

    /// `set` to `to`, or a text patch when that is worthwhile.
    fn replace(&self, path: &[Segment], from: &Value, to: &Value) -> Patch {
        if let (true, Value::String(from), Value::String(to)) = (self.options.text_patches, from, to) {
            let length = to.chars().count();
            if length > self.options.text_min_length {
                let text = make_patch_text(from, to);
                if (text.chars().count() as f64) < length as f64 * self.options.text_max_ratio {
                    return Patch::diff_match_patch(path.to_vec(), text);
                }
            }
        }
        Patch::set(path.to_vec(), to.clone())
    }
}

struct Emitter<'a> {
    set: &'a ChangeSet,
    direction: Direction,
    removed: Vec<Path>,
    /// Paths already unset, so nothing beneath them is unset twice.
    unset: Vec<Path>,
    out: Vec<Patch>,
}

impl Emitter<'_> {
    fn emit(&mut self, change: &Change) {
        match (change, self.direction) {
            (Change::Group { children, .. }, _) => {
                for child in children {
                    self.emit(child);
                }
            }
            (Change::Added { path, value, position }, Direction::Forward)
            | (
                Change::Removed {
                    path,
                    old_value: value,
                    position,
                },
                Direction::Inverse,
            ) => self.out.push(restore(path, value, position.as_ref())),
            (Change::Added { path, .. }, Direction::Inverse) | (Change::Removed { path, .. }, Direction::Forward) => {
                self.remove(path)
            }
            (Change::Edited { path, from, to, .. }, Direction::Forward) => self.out.push(self.set.replace(path, from, to)),
            (Change::Edited { path, from, to, .. }, Direction::Inverse) => self.out.push(self.set.replace(path, to, from)),
        }
    }

    fn remove(&mut self, path: &[Segment]) {
        let target = match self.set.endpoints(self.direction) {
            Some((from, to)) => furthest_stub_ancestor(from, to, path, &self.removed),
            None => path.to_vec(),
        };
        if self.unset.iter().any(|done| starts_with(&target, done)) {
            return;
        }
        self.out.push(Patch::unset(target.clone()));
        self.unset.push(target);
    }
}

// ── Emptied ancestors ─────────────────────────────────────────────────────

/// Climb from `path` while the parent is missing from `to` and is a stub in
/// `from`. Never reaches the root or steps out of a positional index.
fn furthest_stub_ancestor(from: &Value, to: &Value, path: &[Segment], removed: &[Path]) -> Path {
    let mut ignored: Vec<Path> = removed.to_vec();
    let mut current = path.to_vec();
    while current.len() > 1 {
        let parent = &current[..current.len() - 1];
        if matches!(parent.last(), Some(Segment::Index(_))) || !is_absent(get(to, parent)) {
            break;
        }
        if !is_stub(get(from, parent), parent, &ignored) {
            break;
        }
        ignored.retain(|p| !starts_with(p, parent));
        ignored.push(parent.to_vec());
        current.truncate(current.len() - 1);
    }
    current
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

fn is_stub(value: Option<&Value>, path: &[Segment], ignored: &[Path]) -> bool {
    if ignored.iter().any(|p| p.as_slice() == path) {
        return true;
    }
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "_type" | "_key"))
            .all(|(name, child)| {
                let mut child_path = path.to_vec();
                child_path.push(Segment::field(name.clone()));
                is_stub(Some(child), &child_path, ignored)
            }),
        Some(Value::Array(items)) => items.iter().enumerate().all(|(index, item)| {
            let mut child_path = path.to_vec();
            child_path.push(match item_key(item) {
                Some(key) => Segment::key(key),
                None => Segment::Index(index),
            });
            is_stub(Some(item), &child_path, ignored)
        }),
        Some(_) => false,
    }
}

/// Put `value` back at `path`: next to its recorded predecessor for keyed
/// items, a plain `set` otherwise.
fn restore(path: &[Segment], value: &Value, position: Option<&ItemPosition>) -> Patch {
    if let (Some(position), Some((parent, Segment::Key(_)))) = (position, split_last(path)) {
        let (at, reference) = match &position.after {
            Some(prev) => (InsertPosition::After, Segment::key(prev.clone())),
            None => (InsertPosition::Before, Segment::Index(0)),
        };
        return Patch::insert(parent.to_vec(), at, reference, vec![value.clone()]);
    }
    Patch::set(path.to_vec(), value.clone())
}

/// Patches replaying `a → b` for changes computed by `diff(a, b)`.
pub fn to_forward_patches(changes: &[Change]) -> Vec<Patch> {
    ChangeSet::new(changes.to_vec()).forward()
}

/// Patches replaying `b → a` for changes computed by `diff(a, b)`.
pub fn to_inverse_patches(changes: &[Change]) -> Vec<Patch> {
    ChangeSet::new(changes.to_vec()).inverse()
}
