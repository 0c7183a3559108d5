use serde_json::Value;

use crate::parse::format_path;
use crate::types::Segment;
use crate::AddressingError;

/// Returns `true` when every element of `items` is an object carrying a
/// string `_key`. Empty arrays count as keyed.
pub fn is_keyed_array(items: &[Value]) -> bool {
    items.iter().all(|item| item_key(item).is_some())
}

/// Returns `true` when at least one element of `items` carries a `_key`.
pub fn has_keyed_items(items: &[Value]) -> bool {
    items.iter().any(|item| item_key(item).is_some())
}

/// The `_key` of an array element, if it has one.
pub fn item_key(item: &Value) -> Option<&str> {
    item.as_object()?.get("_key")?.as_str()
}

/// Locate the single element of `items` whose `_key` equals `key`.
///
/// Returns `Ok(None)` when no element matches and
/// [`AddressingError::DuplicateKey`] when more than one does.
pub fn find_key_index(items: &[Value], key: &str) -> Result<Option<usize>, AddressingError> {
    let mut found = None;
    for (index, item) in items.iter().enumerate() {
        if item_key(item) == Some(key) {
            if found.is_some() {
                return Err(AddressingError::DuplicateKey {
                    key: key.to_string(),
                    path: String::new(),
                });
            }
            found = Some(index);
        }
    }
    Ok(found)
}

/// Resolve `path` against `doc` for reading.
///
/// `Ok(None)` means the location is missing: a field is absent, a key selector
/// matches nothing, an index is out of range, or the walk hits a value that
/// cannot hold children.
pub fn resolve<'a>(doc: &'a Value, path: &[Segment]) -> Result<Option<&'a Value>, AddressingError> {
    let mut current = doc;
    for (depth, segment) in path.iter().enumerate() {
        let next = match (current, segment) {
            (Value::Object(map), Segment::Field(name)) => map.get(name),
            (Value::Array(items), Segment::Index(index)) => items.get(*index),
            (Value::Array(items), Segment::Key(key)) => find_key_index(items, key)
                .map_err(|err| err.at(&path[..depth]))?
                .map(|index| &items[index]),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Resolve `path`, treating a missing location as [`AddressingError::NotFound`].
pub fn resolve_existing<'a>(doc: &'a Value, path: &[Segment]) -> Result<&'a Value, AddressingError> {
    resolve(doc, path)?.ok_or_else(|| AddressingError::NotFound(format_path(path)))
}

/// Like [`resolve`], but silently maps addressing errors to `None`.
pub fn get<'a>(doc: &'a Value, path: &[Segment]) -> Option<&'a Value> {
    resolve(doc, path).ok().flatten()
}

/// Mutable counterpart of [`resolve`].
pub fn resolve_mut<'a>(
    doc: &'a mut Value,
    path: &[Segment],
) -> Result<Option<&'a mut Value>, AddressingError> {
    let mut current = doc;
    for (depth, segment) in path.iter().enumerate() {
        let next = match (current, segment) {
            (Value::Object(map), Segment::Field(name)) => map.get_mut(name),
            (Value::Array(items), Segment::Index(index)) => items.get_mut(*index),
            (Value::Array(items), Segment::Key(key)) => {
                match find_key_index(items, key).map_err(|err| err.at(&path[..depth]))? {
                    Some(index) => items.get_mut(index),
                    None => None,
                }
            }
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}
