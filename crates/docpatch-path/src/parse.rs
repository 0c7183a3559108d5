//! Textual path syntax.
//!
//! Fields are joined with `.`, array steps are bracketed:
//! `body[_key=="a1"].children[0].text`.

use thiserror::Error;

use crate::types::{Path, Segment};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("empty field name at offset {0}")]
    EmptyField(usize),
    #[error("unterminated bracket starting at offset {0}")]
    UnterminatedBracket(usize),
    #[error("invalid bracket expression `{0}`")]
    InvalidBracket(String),
    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },
}

/// Parse a textual path.
///
/// # Example
///
/// ```
/// use docpatch_path::{parse_path, Segment};
///
/// let path = parse_path(r#"items[_key=="k1"].title"#).unwrap();
/// assert_eq!(path, vec![Segment::field("items"), Segment::key("k1"), Segment::field("title")]);
/// assert!(parse_path("").unwrap().is_empty());
/// ```
pub fn parse_path(input: &str) -> Result<Path, PathError> {
    let chars: Vec<char> = input.chars().collect();
    let mut path = Vec::new();
    let mut pos = 0;
    let mut expect_field = true;

    while pos < chars.len() {
        match chars[pos] {
            '[' => {
                let (segment, next) = parse_bracket(&chars, pos)?;
                path.push(segment);
                pos = next;
                expect_field = false;
            }
            '.' if !expect_field => {
                pos += 1;
                if pos >= chars.len() || chars[pos] == '.' {
                    return Err(PathError::EmptyField(pos));
                }
                if chars[pos] == '[' {
                    return Err(PathError::UnexpectedChar { ch: '[', offset: pos });
                }
                expect_field = true;
            }
            ch if expect_field => {
                if ch == '.' || ch == ']' {
                    return Err(PathError::UnexpectedChar { ch, offset: pos });
                }
                let start = pos;
                while pos < chars.len() && !matches!(chars[pos], '.' | '[' | ']') {
                    pos += 1;
                }
                path.push(Segment::Field(chars[start..pos].iter().collect()));
                expect_field = false;
            }
            ch => return Err(PathError::UnexpectedChar { ch, offset: pos }),
        }
    }
    Ok(path)
}

fn parse_bracket(chars: &[char], open: usize) -> Result<(Segment, usize), PathError> {
    let mut pos = open + 1;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    while pos < chars.len() {
        let ch = chars[pos];
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                }
            }
            None if ch == '"' || ch == '\'' => quote = Some(ch),
            None if ch == ']' => break,
            None => {}
        }
        pos += 1;
    }
    if pos >= chars.len() {
        return Err(PathError::UnterminatedBracket(open));
    }
    let inner: String = chars[open + 1..pos].iter().collect();
    Ok((parse_bracket_body(inner.trim())?, pos + 1))
}

fn parse_bracket_body(body: &str) -> Result<Segment, PathError> {
    if !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit()) {
        return body
            .parse()
            .map(Segment::Index)
            .map_err(|_| PathError::InvalidBracket(body.to_string()));
    }
    let literal = body
        .strip_prefix("_key")
        .map(str::trim_start)
        .and_then(|rest| rest.strip_prefix("=="))
        .map(str::trim)
        .ok_or_else(|| PathError::InvalidBracket(body.to_string()))?;
    unquote(literal)
        .map(Segment::Key)
        .ok_or_else(|| PathError::InvalidBracket(body.to_string()))
}

fn unquote(literal: &str) -> Option<String> {
    if literal.len() >= 2 && literal.starts_with('"') && literal.ends_with('"') {
        return serde_json::from_str(literal).ok();
    }
    if literal.len() >= 2 && literal.starts_with('\'') && literal.ends_with('\'') {
        let inner = &literal[1..literal.len() - 1];
        return Some(inner.replace("\\'", "'"));
    }
    None
}

/// Format a path in the textual syntax accepted by [`parse_path`].
///
/// # Example
///
/// ```
/// use docpatch_path::{format_path, Segment};
///
/// let path = vec![Segment::field("body"), Segment::key("a1"), Segment::Index(0)];
/// assert_eq!(format_path(&path), r#"body[_key=="a1"][0]"#);
/// ```
pub fn format_path(path: &[Segment]) -> String {
    let mut out = String::new();
    for segment in path {
        match segment {
            Segment::Field(name) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(name);
            }
            Segment::Index(index) => {
                out.push('[');
                out.push_str(&index.to_string());
                out.push(']');
            }
            Segment::Key(key) => {
                out.push_str("[_key==");
                out.push_str(&serde_json::to_string(key).unwrap_or_else(|_| format!("{key:?}")));
                out.push(']');
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_and_indices() {
        assert_eq!(
            parse_path("a.b[3].c").unwrap(),
            vec![Segment::field("a"), Segment::field("b"), Segment::Index(3), Segment::field("c")]
        );
    }

    #[test]
    fn parses_single_quoted_keys() {
        assert_eq!(
            parse_path("items[_key == 'x y']").unwrap(),
            vec![Segment::field("items"), Segment::key("x y")]
        );
    }

    #[test]
    fn keys_may_contain_brackets_and_dots() {
        let path = vec![Segment::field("items"), Segment::key("a].b[c")];
        assert_eq!(parse_path(&format_path(&path)).unwrap(), path);
    }

    #[test]
    fn leading_bracket_is_allowed() {
        assert_eq!(parse_path("[0].a").unwrap(), vec![Segment::Index(0), Segment::field("a")]);
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_path("a..b"), Err(PathError::EmptyField(2)));
        assert_eq!(parse_path("a[1"), Err(PathError::UnterminatedBracket(1)));
        assert!(matches!(parse_path("a[foo]"), Err(PathError::InvalidBracket(_))));
        assert!(matches!(parse_path("a."), Err(PathError::EmptyField(_))));
    }
}
