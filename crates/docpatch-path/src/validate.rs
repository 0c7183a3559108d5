//! Validation functions for document paths.

use thiserror::Error;

use crate::types::Segment;

/// Maximum allowed path depth.
const MAX_PATH_LENGTH: usize = 256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Path too long")]
    PathTooLong,
}

/// Validate a path.
///
/// # Errors
///
/// Returns an error if the path exceeds the maximum depth (256 steps).
/// Empty field names and key selectors are valid: `""` is a legal JSON
/// object key and a legal `_key`.
///
/// # Example
///
/// ```
/// use docpatch_path::{validate_path, Segment};
///
/// validate_path(&[Segment::field("items"), Segment::key("a")]).unwrap();
/// validate_path(&[Segment::field(""), Segment::key("")]).unwrap();
/// ```
pub fn validate_path(path: &[Segment]) -> Result<(), ValidationError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(ValidationError::PathTooLong);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_short_path() {
        let path = vec![Segment::field("foo"), Segment::Index(0)];
        assert!(validate_path(&path).is_ok());
    }

    #[test]
    fn test_validate_long_path() {
        let path: Vec<Segment> = (0..300).map(Segment::Index).collect();
        assert_eq!(validate_path(&path), Err(ValidationError::PathTooLong));
    }

    #[test]
    fn test_validate_max_length_path() {
        let path: Vec<Segment> = (0..256).map(Segment::Index).collect();
        assert!(validate_path(&path).is_ok());
    }

    #[test]
    fn test_validate_empty_steps() {
        assert!(validate_path(&[Segment::key("")]).is_ok());
        assert!(validate_path(&[Segment::field("a"), Segment::field("")]).is_ok());
    }
}
