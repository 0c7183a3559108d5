//! Array item keys and patch identifiers.

use std::collections::HashSet;

use rand::Rng;
use serde_json::Value;

use docpatch_path::item_key;

/// Default length of generated array item keys.
pub const DEFAULT_KEY_LENGTH: usize = 12;

/// Collisions tolerated at one length before generated keys get longer.
const MAX_COLLISIONS: usize = 16;

/// Generate a random lowercase-hex key of `length` characters.
pub fn random_key(length: usize) -> String {
    let mut rng = rand::thread_rng();
    let mut key = String::with_capacity(length + 1);
    while key.len() < length {
        let byte: u8 = rng.gen();
        key.push_str(&format!("{byte:02x}"));
    }
    key.truncate(length);
    key
}

/// Generate a fresh patch identifier.
pub fn patch_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Return the first `_key` that occurs more than once among `items`.
pub fn first_duplicate_key(items: &[Value]) -> Option<&str> {
    let mut seen = HashSet::new();
    items
        .iter()
        .filter_map(item_key)
        .find(|key| !seen.insert(*key))
}

/// Give every object in `items` that lacks a `_key` a fresh random one.
///
/// Generated keys never collide with keys already present in `siblings` or
/// `items`. Keys are at least one character long, and grow by one character
/// whenever the current length keeps colliding.
pub fn assign_missing_keys(items: &mut [Value], siblings: &[Value], length: usize) {
    let mut length = length.max(1);
    let mut taken: HashSet<String> = siblings
        .iter()
        .chain(items.iter())
        .filter_map(item_key)
        .map(str::to_string)
        .collect();
    for item in items.iter_mut() {
        if let Value::Object(map) = item {
            if map.get("_key").and_then(Value::as_str).is_some() {
                continue;
            }
            let mut key = random_key(length);
            let mut collisions = 0;
            while taken.contains(&key) {
                collisions += 1;
                if collisions % MAX_COLLISIONS == 0 {
                    length += 1;
                }
                key = random_key(length);
            }
            taken.insert(key.clone());
            map.insert("_key".to_string(), Value::String(key));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn random_key_has_requested_length() {
        for len in [1, 7, 12, 31] {
            let key = random_key(len);
            assert_eq!(key.len(), len);
            assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn finds_duplicate_keys() {
        let items = vec![json!({"_key": "a"}), json!({"_key": "b"}), json!({"_key": "a"})];
        assert_eq!(first_duplicate_key(&items), Some("a"));
        assert_eq!(first_duplicate_key(&items[..2]), None);
    }

    #[test]
    fn assigns_keys_only_to_unkeyed_objects() {
        let siblings = vec![json!({"_key": "a"})];
        let mut items = vec![json!({"_key": "b"}), json!({"title": "x"}), json!("plain")];
        assign_missing_keys(&mut items, &siblings, 8);
        assert_eq!(items[0]["_key"], json!("b"));
        assert_eq!(items[1]["_key"].as_str().map(str::len), Some(8));
        assert_eq!(items[2], json!("plain"));
    }

    #[test]
    fn zero_length_and_crowded_keys_still_terminate() {
        let mut items = vec![json!({"t": 1}), json!({"t": 2})];
        assign_missing_keys(&mut items, &[], 0);
        let first = items[0]["_key"].as_str().unwrap();
        let second = items[1]["_key"].as_str().unwrap();
        assert!(!first.is_empty() && !second.is_empty());
        assert_ne!(first, second);

        // Sixteen one-character hex keys exist; the rest must be longer.
        let mut crowded: Vec<Value> = (0..40).map(|t| json!({"t": t})).collect();
        assign_missing_keys(&mut crowded, &[], 1);
        let mut seen: Vec<&str> = crowded.iter().filter_map(item_key).collect();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 40);
    }
}
