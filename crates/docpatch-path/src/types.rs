//! Type definitions for document paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A step in a document path.
///
/// Array elements are normally addressed by [`Segment::Key`], which names the
/// element whose `_key` equals the selector wherever it currently sits.
/// [`Segment::Index`] is positional and only stable for reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "RawSegment", into = "RawSegment")]
pub enum Segment {
    /// Object field name.
    Field(String),
    /// Positional array index.
    Index(usize),
    /// Keyed array selector, `[_key=="..."]`.
    Key(String),
}

/// A document path.
pub type Path = Vec<Segment>;

impl Segment {
    pub fn field(name: impl Into<String>) -> Self {
        Segment::Field(name.into())
    }

    pub fn key(key: impl Into<String>) -> Self {
        Segment::Key(key.into())
    }

    /// True for segments that step into an array (index or key selector).
    pub fn is_array_step(&self) -> bool {
        matches!(self, Segment::Index(_) | Segment::Key(_))
    }

    pub fn as_field(&self) -> Option<&str> {
        match self {
            Segment::Field(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&str> {
        match self {
            Segment::Key(key) => Some(key),
            _ => None,
        }
    }
}

impl From<&str> for Segment {
    fn from(name: &str) -> Self {
        Segment::Field(name.to_string())
    }
}

impl From<String> for Segment {
    fn from(name: String) -> Self {
        Segment::Field(name)
    }
}

impl From<usize> for Segment {
    fn from(index: usize) -> Self {
        Segment::Index(index)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Field(name) => f.write_str(name),
            Segment::Index(index) => write!(f, "[{index}]"),
            Segment::Key(key) => write!(f, "[_key=={key:?}]"),
        }
    }
}

/// Wire shape of a segment: `"name"`, `3`, or `{"_key": "k"}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawSegment {
    Field(String),
    Index(usize),
    Key {
        #[serde(rename = "_key")]
        key: String,
    },
}

impl From<RawSegment> for Segment {
    fn from(raw: RawSegment) -> Self {
        match raw {
            RawSegment::Field(name) => Segment::Field(name),
            RawSegment::Index(index) => Segment::Index(index),
            RawSegment::Key { key } => Segment::Key(key),
        }
    }
}

impl From<Segment> for RawSegment {
    fn from(segment: Segment) -> Self {
        match segment {
            Segment::Field(name) => RawSegment::Field(name),
            Segment::Index(index) => RawSegment::Index(index),
            Segment::Key(key) => RawSegment::Key { key },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn segment_serializes_to_wire_shape() {
        let path: Path = vec![Segment::field("items"), Segment::key("k1"), Segment::Index(2)];
        let encoded = serde_json::to_value(&path).unwrap();
        assert_eq!(encoded, json!(["items", {"_key": "k1"}, 2]));
    }

    #[test]
    fn segment_deserializes_from_wire_shape() {
        let path: Path = serde_json::from_value(json!(["a", {"_key": "x"}, 0])).unwrap();
        assert_eq!(path, vec![Segment::field("a"), Segment::key("x"), Segment::Index(0)]);
    }

    #[test]
    fn display_uses_selector_syntax() {
        assert_eq!(Segment::key("abc").to_string(), "[_key==\"abc\"]");
        assert_eq!(Segment::Index(4).to_string(), "[4]");
        assert_eq!(Segment::field("title").to_string(), "title");
    }
}
