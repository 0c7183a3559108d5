//! JSON wire codec for patches.
//!
//! One patch serializes as
//! `{"id": "...", "path": [...], "<op>": <argument>}` where `<op>` is exactly
//! one of `set`, `unset`, `setIfMissing`, `insert`, `diffMatchPatch`, `inc`,
//! `dec`. `insert` carries `{"items": [...], "before"|"after"|"replace": <segment>}`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use thiserror::Error;

use docpatch_path::parse_path;

use super::types::{InsertPosition, Operation, Patch, Path, Segment};
use crate::keys::patch_id;

const OPERATION_KEYS: [&str; 7] = ["set", "unset", "setIfMissing", "insert", "diffMatchPatch", "inc", "dec"];
const POSITIONS: [InsertPosition; 3] = [InsertPosition::Before, InsertPosition::After, InsertPosition::Replace];

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("patch must be a JSON object")]
    NotAnObject,
    #[error("patch has no operation")]
    MissingOperation,
    #[error("patch has more than one operation: {0:?}")]
    MultipleOperations(Vec<String>),
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidField {
        field,
        reason: reason.into(),
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────

// Segments carry their own serde form (`"name"`, `3`, `{"_key": "k"}`).
fn decode_segment(value: &Value, field: &'static str) -> Result<Segment, CodecError> {
    Segment::deserialize(value).map_err(|err| invalid(field, format!("unexpected segment {value}: {err}")))
}

/// Paths are segment arrays; the textual form (`a[_key=="k"].b`) is accepted
/// on input too.
fn decode_path(value: &Value) -> Result<Path, CodecError> {
    match value {
        Value::Array(_) => Path::deserialize(value).map_err(|err| invalid("path", err.to_string())),
        Value::String(text) => parse_path(text).map_err(|err| invalid("path", err.to_string())),
        _ => Err(invalid("path", "must be an array or a string")),
    }
}

fn decode_number(value: &Value, field: &'static str) -> Result<f64, CodecError> {
    value
        .as_f64()
        .ok_or_else(|| invalid(field, "must be a number"))
}

/// Integral amounts go out as JSON integers.
fn encode_number(amount: f64) -> Value {
    if amount.fract() == 0.0 && amount.abs() < (1u64 << 53) as f64 {
        Value::from(amount as i64)
    } else {
        json!(amount)
    }
}

// ── Serialization ─────────────────────────────────────────────────────────

/// Serialize a patch to its wire form.
pub fn to_wire(patch: &Patch) -> Value {
    let mut map = Map::new();
    map.insert("id".into(), Value::String(patch.id.clone()));
    map.insert("path".into(), json!(patch.path));
    let (key, argument) = match &patch.op {
        Operation::Set(value) => ("set", value.clone()),
        Operation::Unset => ("unset", Value::Bool(true)),
        Operation::SetIfMissing(value) => ("setIfMissing", value.clone()),
        Operation::Insert {
            items,
            position,
            reference,
        } => {
            let mut insert = Map::new();
            insert.insert("items".into(), Value::Array(items.clone()));
            insert.insert(position.as_str().into(), json!(reference));
            ("insert", Value::Object(insert))
        }
        Operation::DiffMatchPatch(text) => ("diffMatchPatch", Value::String(text.clone())),
        Operation::Inc(amount) => ("inc", encode_number(*amount)),
        Operation::Dec(amount) => ("dec", encode_number(*amount)),
    };
    map.insert(key.into(), argument);
    Value::Object(map)
}

fn decode_insert(value: &Value) -> Result<Operation, CodecError> {
    let map = value
        .as_object()
        .ok_or_else(|| invalid("insert", "must be an object"))?;
    let items = map
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("insert", "`items` must be an array"))?
        .clone();
    let mut anchors = POSITIONS
        .iter()
        .filter_map(|position| map.get(position.as_str()).map(|segment| (*position, segment)));
    let (position, segment) = anchors
        .next()
        .ok_or_else(|| invalid("insert", "needs one of `before`, `after`, `replace`"))?;
    if anchors.next().is_some() {
        return Err(invalid("insert", "only one of `before`, `after`, `replace` is allowed"));
    }
    Ok(Operation::Insert {
        items,
        position,
        reference: decode_segment(segment, "insert")?,
    })
}

/// Deserialize a patch from its wire form. A missing `id` gets a fresh one.
pub fn from_wire(value: &Value) -> Result<Patch, CodecError> {
    let map = value.as_object().ok_or(CodecError::NotAnObject)?;
    let id = match map.get("id") {
        None | Some(Value::Null) => patch_id(),
        Some(Value::String(id)) => id.clone(),
        Some(_) => return Err(invalid("id", "must be a string")),
    };
    let path = match map.get("path") {
        Some(path) => decode_path(path)?,
        None => Vec::new(),
    };

    let present: Vec<&str> = OPERATION_KEYS
        .iter()
        .copied()
        .filter(|key| map.contains_key(*key))
        .collect();
    let key = match present.as_slice() {
        [] => return Err(CodecError::MissingOperation),
        [key] => *key,
        _ => {
            return Err(CodecError::MultipleOperations(
                present.iter().map(|key| key.to_string()).collect(),
            ))
        }
    };
    let argument = &map[key];
    let op = match key {
        "set" => Operation::Set(argument.clone()),
        "unset" => Operation::Unset,
        "setIfMissing" => Operation::SetIfMissing(argument.clone()),
        "insert" => decode_insert(argument)?,
        "diffMatchPatch" => Operation::DiffMatchPatch(
            argument
                .as_str()
                .ok_or_else(|| invalid("diffMatchPatch", "must be a string"))?
                .to_string(),
        ),
        "inc" => Operation::Inc(decode_number(argument, "inc")?),
        _ => Operation::Dec(decode_number(argument, "dec")?),
    };
    Ok(Patch { id, path, op })
}

impl Serialize for Patch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_wire(self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Patch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_wire(&value).map_err(D::Error::custom)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────
