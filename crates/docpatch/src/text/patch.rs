//! diff-match-patch compatible text patches.
//!
//! The textual form is the one produced by `patch_toText`:
//!
//! ```text
//! @@ -1,11 +1,12 @@
//!  safas
//! +a
//!  dfsadf
//! ```
//!
//! Coordinates and lengths count Unicode scalar values. Hunk bodies are
//! percent-encoded the way `encodeURI` does it, with spaces left literal.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use super::diff::{diff_text, find_chars, DiffOp, Edit};

/// Characters of context kept around each hunk.
pub const PATCH_MARGIN: usize = 4;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TextPatchError {
    #[error("invalid hunk header on line {line}: {header:?}")]
    InvalidHeader { line: usize, header: String },
    #[error("invalid hunk body on line {line}: {reason}")]
    InvalidBody { line: usize, reason: String },
    #[error("hunk #{index} did not match the text")]
    DidNotApply { index: usize },
}

/// One hunk of a text patch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TextPatch {
    pub start1: usize,
    pub start2: usize,
    pub length1: usize,
    pub length2: usize,
    pub edits: Vec<Edit>,
}

impl TextPatch {
    fn push(&mut self, op: DiffOp, run: String) {
        let len = run.chars().count();
        match op {
            DiffOp::Equal => {
                self.length1 += len;
                self.length2 += len;
            }
            DiffOp::Delete => self.length1 += len,
            DiffOp::Insert => self.length2 += len,
        }
        self.edits.push((op, run));
    }

    fn source(&self) -> Vec<char> {
        self.edits
            .iter()
            .filter(|(op, _)| *op != DiffOp::Insert)
            .flat_map(|(_, run)| run.chars())
            .collect()
    }

    fn target(&self) -> Vec<char> {
        self.edits
            .iter()
            .filter(|(op, _)| *op != DiffOp::Delete)
            .flat_map(|(_, run)| run.chars())
            .collect()
    }
}

fn coords(start: usize, length: usize) -> String {
    match length {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, length),
    }
}

impl fmt::Display for TextPatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "@@ -{} +{} @@",
            coords(self.start1, self.length1),
            coords(self.start2, self.length2)
        )?;
        for (op, run) in &self.edits {
            let sign = match op {
                DiffOp::Equal => ' ',
                DiffOp::Delete => '-',
                DiffOp::Insert => '+',
            };
            writeln!(f, "{sign}{}", encode_uri(run))?;
        }
        Ok(())
    }
}

// ── Encoding ──────────────────────────────────────────────────────────────

fn is_uri_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || " ;,/?:@&=+$-_.!~*'()#".contains(c)
}

fn encode_uri(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut buf = [0u8; 4];
    for c in text.chars() {
        if is_uri_safe(c) {
            out.push(c);
        } else {
            out.push_str(&urlencoding::encode(c.encode_utf8(&mut buf)));
        }
    }
    out
}

// ── Make ──────────────────────────────────────────────────────────────────

/// Build the hunks that turn `src` into `dst`.
pub fn make_patches(src: &str, dst: &str) -> Vec<TextPatch> {
    patches_from_edits(&diff_text(src, dst), PATCH_MARGIN)
}

/// Build hunks and serialize them in one go.
pub fn make_patch_text(src: &str, dst: &str) -> String {
    patches_to_text(&make_patches(src, dst))
}

fn patches_from_edits(edits: &[Edit], margin: usize) -> Vec<TextPatch> {
    let mut patches = Vec::new();
    let mut current: Option<TextPatch> = None;
    let mut context: Vec<char> = Vec::new();
    let (mut pos1, mut pos2) = (0usize, 0usize);

    for (i, (op, run)) in edits.iter().enumerate() {
        let chars: Vec<char> = run.chars().collect();
        match op {
            DiffOp::Equal => {
                if let Some(mut patch) = current.take() {
                    let is_last = i + 1 == edits.len();
                    if chars.len() <= 2 * margin && !is_last {
                        patch.push(DiffOp::Equal, run.clone());
                        current = Some(patch);
                    } else {
                        let take = chars.len().min(margin);
                        patch.push(DiffOp::Equal, chars[..take].iter().collect());
                        patches.push(patch);
                    }
                }
                let keep = chars.len().min(margin);
                context = chars[chars.len() - keep..].to_vec();
                pos1 += chars.len();
                pos2 += chars.len();
            }
            DiffOp::Delete | DiffOp::Insert => {
                let patch = current.get_or_insert_with(|| {
                    let mut patch = TextPatch {
                        start1: pos1 - context.len(),
                        start2: pos2 - context.len(),
                        ..TextPatch::default()
                    };
                    if !context.is_empty() {
                        patch.push(DiffOp::Equal, context.iter().collect());
                    }
                    patch
                });
                patch.push(*op, run.clone());
                if *op == DiffOp::Delete {
                    pos1 += chars.len();
                } else {
                    pos2 += chars.len();
                }
            }
        }
    }
    if let Some(patch) = current {
        patches.push(patch);
    }
    patches
}

/// Serialize hunks to the diff-match-patch text form.
pub fn patches_to_text(patches: &[TextPatch]) -> String {
    patches.iter().map(ToString::to_string).collect()
}

// ── Parse ─────────────────────────────────────────────────────────────────

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| Regex::new(r"^@@ -(\d+),?(\d*) \+(\d+),?(\d*) @@$").expect("static pattern"))
}

fn parse_coords(start: &str, length: &str) -> Option<(usize, usize)> {
    let start: usize = start.parse().ok()?;
    match length {
        "" => Some((start.checked_sub(1)?, 1)),
        "0" => Some((start, 0)),
        _ => Some((start.checked_sub(1)?, length.parse().ok()?)),
    }
}

/// Parse the diff-match-patch text form back into hunks.
pub fn parse_patches(text: &str) -> Result<Vec<TextPatch>, TextPatchError> {
    let mut patches: Vec<TextPatch> = Vec::new();
    for (line_no, line) in text.split('\n').enumerate() {
        let line_no = line_no + 1;
        if line.is_empty() {
            continue;
        }
        if line.starts_with("@@") {
            let invalid = || TextPatchError::InvalidHeader {
                line: line_no,
                header: line.to_string(),
            };
            let caps = header_regex().captures(line).ok_or_else(invalid)?;
            let (start1, length1) = parse_coords(&caps[1], &caps[2]).ok_or_else(invalid)?;
            let (start2, length2) = parse_coords(&caps[3], &caps[4]).ok_or_else(invalid)?;
            patches.push(TextPatch {
                start1,
                start2,
                length1,
                length2,
                edits: Vec::new(),
            });
            continue;
        }

        let patch = patches.last_mut().ok_or_else(|| TextPatchError::InvalidBody {
            line: line_no,
            reason: "body line before any hunk header".to_string(),
        })?;
        let mut chars = line.chars();
        let op = match chars.next() {
            Some(' ') => DiffOp::Equal,
            Some('-') => DiffOp::Delete,
            Some('+') => DiffOp::Insert,
            Some(other) => {
                return Err(TextPatchError::InvalidBody {
                    line: line_no,
                    reason: format!("unknown mode {other:?}"),
                })
            }
            None => continue,
        };
        let run = urlencoding::decode(chars.as_str()).map_err(|err| TextPatchError::InvalidBody {
            line: line_no,
            reason: err.to_string(),
        })?;
        patch.edits.push((op, run.into_owned()));
    }
    Ok(patches)
}

// ── Apply ─────────────────────────────────────────────────────────────────

/// Apply hunks to `text`.
///
/// Each hunk's source side must occur verbatim in the text; the occurrence
/// nearest the hunk's expected location wins. A hunk that matches nowhere
/// fails the whole application.
pub fn apply_patches(patches: &[TextPatch], text: &str) -> Result<String, TextPatchError> {
    let mut chars: Vec<char> = text.chars().collect();
    let mut delta: i64 = 0;
    for (index, patch) in patches.iter().enumerate() {
        let source = patch.source();
        let expected = (patch.start2 as i64 + delta).max(0) as usize;
        let found = nearest_match(&chars, &source, expected).ok_or(TextPatchError::DidNotApply { index })?;
        delta = found as i64 - patch.start2 as i64;
        chars.splice(found..found + source.len(), patch.target());
    }
    Ok(chars.into_iter().collect())
}

/// Parse `patch_text` and apply it to `text`.
pub fn apply_patch_text(patch_text: &str, text: &str) -> Result<String, TextPatchError> {
    apply_patches(&parse_patches(patch_text)?, text)
}

fn nearest_match(haystack: &[char], needle: &[char], expected: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(expected.min(haystack.len()));
    }
    let mut best: Option<usize> = None;
    let mut offset = 0;
    while let Some(at) = find_chars(&haystack[offset..], needle) {
        let pos = offset + at;
        let closer = best.map_or(true, |b| pos.abs_diff(expected) < b.abs_diff(expected));
        if closer {
            best = Some(pos);
        }
        if pos >= expected {
            break;
        }
        offset = pos + 1;
    }
    best
}
