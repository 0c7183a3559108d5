//! Patch application.

use serde_json::{Map, Number, Value};

use docpatch_path::{
    find_key_index, format_path, has_keyed_items, item_key, resolve, split_last, validate_path,
};

use super::types::{
    type_name, ApplyAllError, InsertPosition, Operation, Patch, PatchError, Segment,
};
use crate::keys::{assign_missing_keys, first_duplicate_key, DEFAULT_KEY_LENGTH};
use crate::text::{apply_patch_text, TextPatchError};

/// Knobs for [`apply_in_place_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Length of keys generated for inserted items that lack one.
    pub key_length: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_KEY_LENGTH,
        }
    }
}

// ── Navigation ────────────────────────────────────────────────────────────

fn positional(at: &[Segment], index: usize) -> PatchError {
    PatchError::PositionalTarget {
        path: format_path(at),
        index,
    }
}

fn duplicate(key: &str, at: &[Segment]) -> PatchError {
    PatchError::DuplicateKey {
        key: key.to_string(),
        path: format_path(at),
    }
}

fn key_stub(key: &str) -> Value {
    let mut map = Map::new();
    map.insert("_key".to_string(), Value::String(key.to_string()));
    Value::Object(map)
}

/// Make `value` able to hold a child addressed by `segment`.
///
/// `null` turns into an empty object or array; a scalar is an error.
fn prepare_container(value: &mut Value, segment: &Segment, at: &[Segment]) -> Result<(), PatchError> {
    if value.is_null() {
        *value = if segment.is_array_step() {
            Value::Array(Vec::new())
        } else {
            Value::Object(Map::new())
        };
        return Ok(());
    }
    match (&*value, segment) {
        (Value::Object(_), Segment::Field(_)) => Ok(()),
        (Value::Array(_), Segment::Index(_) | Segment::Key(_)) => Ok(()),
        (Value::Object(_), _) => Err(PatchError::TypeMismatch {
            path: format_path(at),
            expected: "array",
            found: "object",
        }),
        (Value::Array(_), _) => Err(PatchError::TypeMismatch {
            path: format_path(at),
            expected: "object",
            found: "array",
        }),
        _ => Err(PatchError::ParentIsPrimitive {
            path: format_path(at),
        }),
    }
}

/// Step from `current` into the child named by `segment`.
///
/// With `create`, missing fields become `null` placeholders and missing key
/// selectors become `{_key}` stubs.
fn step_mut<'a>(
    current: &'a mut Value,
    segment: &Segment,
    at: &[Segment],
    create: bool,
) -> Result<Option<&'a mut Value>, PatchError> {
    Ok(match (current, segment) {
        (Value::Object(map), Segment::Field(name)) => {
            if create {
                Some(map.entry(name.clone()).or_insert(Value::Null))
            } else {
                map.get_mut(name)
            }
        }
        (Value::Array(items), Segment::Index(index)) => {
            if has_keyed_items(items) {
                return Err(positional(at, *index));
            }
            if create && *index >= items.len() {
                return Err(PatchError::IndexOutOfBounds {
                    path: format_path(at),
                    index: *index,
                });
            }
            items.get_mut(*index)
        }
        (Value::Array(items), Segment::Key(key)) => {
            match find_key_index(items, key).map_err(|err| err.at(at))? {
                Some(index) => items.get_mut(index),
                None if create => {
                    items.push(key_stub(key));
                    items.last_mut()
                }
                None => None,
            }
        }
        _ => None,
    })
}

fn descend<'a>(
    doc: &'a mut Value,
    path: &[Segment],
    create: bool,
) -> Result<Option<&'a mut Value>, PatchError> {
    let mut current = doc;
    for (depth, segment) in path.iter().enumerate() {
        let at = &path[..depth];
        if create {
            prepare_container(current, segment, at)?;
        }
        current = match step_mut(current, segment, at, create)? {
            Some(child) => child,
            None => return Ok(None),
        };
    }
    Ok(Some(current))
}

fn lookup<'a>(doc: &'a Value, path: &[Segment]) -> Result<Option<&'a Value>, PatchError> {
    Ok(resolve(doc, path)?)
}

// ── Individual operation applicators ─────────────────────────────────────

fn write_child(parent: &mut Value, segment: &Segment, value: Value, at: &[Segment]) -> Result<(), PatchError> {
    prepare_container(parent, segment, at)?;
    match (parent, segment) {
        (Value::Object(map), Segment::Field(name)) => {
            map.insert(name.clone(), value);
        }
        (Value::Array(items), Segment::Index(index)) => {
            if has_keyed_items(items) {
                return Err(positional(at, *index));
            }
            let slot = items.get_mut(*index).ok_or_else(|| PatchError::IndexOutOfBounds {
                path: format_path(at),
                index: *index,
            })?;
            *slot = value;
        }
        (Value::Array(items), Segment::Key(key)) => {
            let mut value = value;
            match find_key_index(items, key).map_err(|err| err.at(at))? {
                Some(index) => {
                    if let Value::Object(map) = &mut value {
                        map.entry("_key").or_insert_with(|| Value::String(key.clone()));
                    }
                    if let Some(new_key) = item_key(&value) {
                        let taken = items
                            .iter()
                            .enumerate()
                            .any(|(i, item)| i != index && item_key(item) == Some(new_key));
                        if taken {
                            return Err(duplicate(new_key, at));
                        }
                    }
                    items[index] = value;
                }
                None => {
                    if let Value::Object(map) = &mut value {
                        map.insert("_key".to_string(), Value::String(key.clone()));
                    }
                    items.push(value);
                }
            }
        }
        (other, _) => {
            return Err(PatchError::TypeMismatch {
                path: format_path(at),
                expected: "container",
                found: type_name(other),
            })
        }
    }
    Ok(())
}

fn apply_set(doc: &mut Value, path: &[Segment], value: Value) -> Result<(), PatchError> {
    let Some((parent_path, last)) = split_last(path) else {
        *doc = value;
        return Ok(());
    };
    let parent = descend(doc, parent_path, true)?.ok_or_else(|| PatchError::ParentIsPrimitive {
        path: format_path(parent_path),
    })?;
    write_child(parent, last, value, parent_path)
}

fn apply_unset(doc: &mut Value, path: &[Segment]) -> Result<(), PatchError> {
    let Some((parent_path, last)) = split_last(path) else {
        *doc = Value::Null;
        return Ok(());
    };
    let Some(parent) = descend(doc, parent_path, false)? else {
        return Ok(());
    };
    match (parent, last) {
        (Value::Object(map), Segment::Field(name)) => {
            map.shift_remove(name);
        }
        (Value::Array(items), Segment::Key(key)) => {
            if let Some(index) = find_key_index(items, key).map_err(|err| err.at(parent_path))? {
                items.remove(index);
            }
        }
        (Value::Array(items), Segment::Index(index)) => {
            if has_keyed_items(items) {
                return Err(positional(parent_path, *index));
            }
            if *index < items.len() {
                items.remove(*index);
            }
        }
        _ => {}
    }
    Ok(())
}

fn apply_set_if_missing(doc: &mut Value, path: &[Segment], value: Value) -> Result<(), PatchError> {
    match lookup(doc, path)? {
        Some(existing) if !existing.is_null() => Ok(()),
        _ => apply_set(doc, path, value),
    }
}

fn locate_reference(
    items: &[Value],
    reference: &Segment,
    position: InsertPosition,
    at: &[Segment],
) -> Result<Option<usize>, PatchError> {
    match reference {
        Segment::Key(key) => Ok(find_key_index(items, key).map_err(|err| err.at(at))?),
        Segment::Index(index) if *index < items.len() => Ok(Some(*index)),
        Segment::Index(index) if *index == items.len() && position == InsertPosition::Before => {
            Ok(Some(*index))
        }
        Segment::Index(_) => Ok(None),
        Segment::Field(_) => Err(PatchError::TypeMismatch {
            path: format_path(at),
            expected: "key selector or index",
            found: "field",
        }),
    }
}

fn apply_insert(
    doc: &mut Value,
    path: &[Segment],
    items: &[Value],
    position: InsertPosition,
    reference: &Segment,
    options: &ApplyOptions,
) -> Result<(), PatchError> {
    let target = descend(doc, path, true)?.ok_or_else(|| PatchError::ParentIsPrimitive {
        path: format_path(path),
    })?;
    if target.is_null() {
        *target = Value::Array(Vec::new());
    }
    let array = match target {
        Value::Array(array) => array,
        other => {
            return Err(PatchError::TypeMismatch {
                path: format_path(path),
                expected: "array",
                found: type_name(other),
            })
        }
    };

    let anchor = locate_reference(array, reference, position, path)?;
    let mut items = items.to_vec();
    if has_keyed_items(array) || has_keyed_items(&items) {
        assign_missing_keys(&mut items, array, options.key_length);
        if let Some(key) = first_duplicate_key(&items) {
            return Err(duplicate(key, path));
        }
        let replaced = match (position, anchor) {
            (InsertPosition::Replace, Some(index)) => Some(index),
            _ => None,
        };
        for key in items.iter().filter_map(item_key) {
            let taken = array
                .iter()
                .enumerate()
                .any(|(i, sibling)| Some(i) != replaced && item_key(sibling) == Some(key));
            if taken {
                return Err(duplicate(key, path));
            }
        }
    }

    match (position, anchor) {
        (_, None) => array.extend(items),
        (InsertPosition::Before, Some(index)) => {
            array.splice(index..index, items);
        }
        (InsertPosition::After, Some(index)) => {
            array.splice(index + 1..index + 1, items);
        }
        (InsertPosition::Replace, Some(index)) => {
            array.splice(index..index + 1, items);
        }
    }
    Ok(())
}

fn apply_diff_match_patch(doc: &mut Value, path: &[Segment], patch: &str) -> Result<(), PatchError> {
    let Some(target) = descend(doc, path, false)? else {
        return Ok(());
    };
    let text = match target {
        Value::String(text) => text,
        other => {
            return Err(PatchError::TypeMismatch {
                path: format_path(path),
                expected: "string",
                found: type_name(other),
            })
        }
    };
    *text = apply_patch_text(patch, text.as_str()).map_err(|err| match err {
        TextPatchError::DidNotApply { .. } => PatchError::PatchDidNotApply {
            path: format_path(path),
        },
        other => PatchError::InvalidTextPatch {
            path: format_path(path),
            reason: other.to_string(),
        },
    })?;
    Ok(())
}

fn add_to_number(current: Option<&Number>, amount: f64, path: &[Segment]) -> Result<Value, PatchError> {
    if amount.fract() == 0.0 && amount.abs() < i64::MAX as f64 {
        let base = match current {
            None => Some(0),
            Some(number) => number.as_i64(),
        };
        if let Some(sum) = base.and_then(|base| base.checked_add(amount as i64)) {
            return Ok(Value::from(sum));
        }
    }
    let base = current.and_then(Number::as_f64).unwrap_or(0.0);
    Number::from_f64(base + amount)
        .map(Value::Number)
        .ok_or_else(|| PatchError::TypeMismatch {
            path: format_path(path),
            expected: "finite number",
            found: "number",
        })
}

fn apply_inc(doc: &mut Value, path: &[Segment], amount: f64) -> Result<(), PatchError> {
    let next = match lookup(doc, path)? {
        None => add_to_number(None, amount, path)?,
        Some(Value::Number(number)) => add_to_number(Some(number), amount, path)?,
        Some(other) => {
            return Err(PatchError::TypeMismatch {
                path: format_path(path),
                expected: "number",
                found: type_name(other),
            })
        }
    };
    apply_set(doc, path, next)
}

// ── Main apply functions ──────────────────────────────────────────────────

/// Apply a patch to `doc` in place, using default [`ApplyOptions`].
///
/// On error `doc` may hold containers created on the way to the target; use
/// [`apply`] when the original must stay untouched.
pub fn apply_in_place(doc: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    apply_in_place_with(doc, patch, &ApplyOptions::default())
}

pub fn apply_in_place_with(doc: &mut Value, patch: &Patch, options: &ApplyOptions) -> Result<(), PatchError> {
    validate_path(&patch.path)?;
    let path = patch.path.as_slice();
    match &patch.op {
        Operation::Set(value) => apply_set(doc, path, value.clone()),
        Operation::Unset => apply_unset(doc, path),
        Operation::SetIfMissing(value) => apply_set_if_missing(doc, path, value.clone()),
        Operation::Insert {
            items,
            position,
            reference,
        } => apply_insert(doc, path, items, *position, reference, options),
        Operation::DiffMatchPatch(text) => apply_diff_match_patch(doc, path, text),
        Operation::Inc(amount) => apply_inc(doc, path, *amount),
        Operation::Dec(amount) => apply_inc(doc, path, -*amount),
    }
}

/// Apply a patch, returning the patched copy. `doc` is never modified.
pub fn apply(doc: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut out = doc.clone();
    apply_in_place(&mut out, patch)?;
    Ok(out)
}

/// Apply patches strictly in order, stopping at the first failure.
pub fn apply_all(doc: &Value, patches: &[Patch]) -> Result<Value, ApplyAllError> {
    apply_all_with(doc, patches, &ApplyOptions::default())
}

pub fn apply_all_with(doc: &Value, patches: &[Patch], options: &ApplyOptions) -> Result<Value, ApplyAllError> {
    let mut out = doc.clone();
    for (index, patch) in patches.iter().enumerate() {
        apply_in_place_with(&mut out, patch, options).map_err(|source| ApplyAllError {
            index,
            patch_id: patch.id.clone(),
            source,
        })?;
    }
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────
