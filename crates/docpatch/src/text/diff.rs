//! Character diff - Myers O(ND) difference algorithm.
//!
//! All lengths and positions are in Unicode scalar values (Rust `char`s).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffOp {
    Delete,
    Equal,
    Insert,
}

pub type Edit = (DiffOp, String);

/// Compute the edit script turning `src` into `dst`.
///
/// Equal runs are included for context; adjacent runs of the same kind are
/// merged.
pub fn diff_text(src: &str, dst: &str) -> Vec<Edit> {
    let src: Vec<char> = src.chars().collect();
    let dst: Vec<char> = dst.chars().collect();
    let mut edits = diff_chars(&src, &dst);
    cleanup_merge(&mut edits);
    edits
}

/// Text of the source side of an edit script.
pub fn source_text(edits: &[Edit]) -> String {
    edits
        .iter()
        .filter(|(op, _)| *op != DiffOp::Insert)
        .map(|(_, text)| text.as_str())
        .collect()
}

/// Text of the destination side of an edit script.
pub fn target_text(edits: &[Edit]) -> String {
    edits
        .iter()
        .filter(|(op, _)| *op != DiffOp::Delete)
        .map(|(_, text)| text.as_str())
        .collect()
}

pub(crate) fn common_prefix(a: &[char], b: &[char]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

pub(crate) fn common_suffix(a: &[char], b: &[char]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

pub(crate) fn find_chars(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn text(chars: &[char]) -> String {
    chars.iter().collect()
}

fn diff_chars(src: &[char], dst: &[char]) -> Vec<Edit> {
    if src == dst {
        return if src.is_empty() {
            Vec::new()
        } else {
            vec![(DiffOp::Equal, text(src))]
        };
    }

    let prefix = common_prefix(src, dst);
    let (head, src, dst) = (&src[..prefix], &src[prefix..], &dst[prefix..]);
    let suffix = common_suffix(src, dst);
    let tail = &src[src.len() - suffix..];
    let (src, dst) = (&src[..src.len() - suffix], &dst[..dst.len() - suffix]);

    let mut edits = Vec::new();
    if !head.is_empty() {
        edits.push((DiffOp::Equal, text(head)));
    }
    edits.extend(diff_middle(src, dst));
    if !tail.is_empty() {
        edits.push((DiffOp::Equal, text(tail)));
    }
    edits
}

/// Diff two texts that share no common prefix or suffix.
fn diff_middle(src: &[char], dst: &[char]) -> Vec<Edit> {
    if src.is_empty() {
        return vec![(DiffOp::Insert, text(dst))];
    }
    if dst.is_empty() {
        return vec![(DiffOp::Delete, text(src))];
    }

    let src_longer = src.len() > dst.len();
    let (long, short) = if src_longer { (src, dst) } else { (dst, src) };
    if let Some(at) = find_chars(long, short) {
        let edge = if src_longer { DiffOp::Delete } else { DiffOp::Insert };
        let mut edits = Vec::with_capacity(3);
        if at > 0 {
            edits.push((edge, text(&long[..at])));
        }
        edits.push((DiffOp::Equal, text(short)));
        if at + short.len() < long.len() {
            edits.push((edge, text(&long[at + short.len()..])));
        }
        return edits;
    }

    if short.len() == 1 {
        return vec![(DiffOp::Delete, text(src)), (DiffOp::Insert, text(dst))];
    }

    bisect(src, dst)
}

// ── Middle snake ──────────────────────────────────────────────────────────

/// Furthest x reached on each diagonal `k = x - y` by one search direction.
/// The reverse search counts x and y from the end of both strings.
struct Frontier {
    reach: Vec<i64>,
    offset: i64,
    reversed: bool,
    /// Diagonals dropped from either end once they ran off the grid.
    skip_low: i64,
    skip_high: i64,
}

impl Frontier {
    fn new(max_d: i64, reversed: bool) -> Self {
        let mut reach = vec![-1; (2 * max_d + 2) as usize];
        reach[(max_d + 1) as usize] = 0;
        Self {
            reach,
            offset: max_d,
            reversed,
            skip_low: 0,
            skip_high: 0,
        }
    }

    fn at(&self, k: i64) -> Option<i64> {
        let i = usize::try_from(self.offset + k).ok()?;
        self.reach.get(i).copied().filter(|x| *x >= 0)
    }

    fn same(&self, src: &[char], dst: &[char], x: i64, y: i64) -> bool {
        let (x, y) = (x as usize, y as usize);
        if self.reversed {
            src[src.len() - x - 1] == dst[dst.len() - y - 1]
        } else {
            src[x] == dst[y]
        }
    }

    /// Step diagonal `k` to edit distance `d` and slide along the snake.
    /// `None` once the path leaves the grid.
    fn extend(&mut self, d: i64, k: i64, src: &[char], dst: &[char]) -> Option<i64> {
        let (n, m) = (src.len() as i64, dst.len() as i64);
        let i = (self.offset + k) as usize;
        let mut x = if k == -d || (k != d && self.reach[i - 1] < self.reach[i + 1]) {
            self.reach[i + 1]
        } else {
            self.reach[i - 1] + 1
        };
        while x < n && x - k < m && self.same(src, dst, x, x - k) {
            x += 1;
        }
        self.reach[i] = x;
        if x > n {
            self.skip_high += 2;
            None
        } else if x - k > m {
            self.skip_low += 2;
            None
        } else {
            Some(x)
        }
    }
}

/// Find the middle snake of the edit graph and recurse on both halves.
fn bisect(src: &[char], dst: &[char]) -> Vec<Edit> {
    let (n, m) = (src.len() as i64, dst.len() as i64);
    let max_d = (n + m + 1) / 2;
    let delta = n - m;
    let mut ahead = Frontier::new(max_d, false);
    let mut behind = Frontier::new(max_d, true);

    for d in 0..max_d {
        for reversed in [false, true] {
            let (mover, other) = if reversed {
                (&mut behind, &ahead)
            } else {
                (&mut ahead, &behind)
            };
            // Only one direction can close the gap first: the forward one
            // when delta is odd, the reverse one when it is even.
            let checks = (delta % 2 != 0) != reversed;
            let mut k = -d + mover.skip_low;
            while k <= d - mover.skip_high {
                if let Some(x) = mover.extend(d, k, src, dst) {
                    let met = if checks { other.at(delta - k) } else { None };
                    if let Some(x_other) = met {
                        // Both ends in forward coordinates.
                        let (fx, fk, rx) = if reversed {
                            (x_other, delta - k, x)
                        } else {
                            (x, k, x_other)
                        };
                        if fx >= n - rx {
                            return bisect_split(src, dst, fx as usize, (fx - fk) as usize);
                        }
                    }
                }
                k += 2;
            }
        }
    }

    vec![(DiffOp::Delete, text(src)), (DiffOp::Insert, text(dst))]
}

fn bisect_split(src: &[char], dst: &[char], x: usize, y: usize) -> Vec<Edit> {
    let mut edits = diff_chars(&src[..x], &dst[..y]);
    edits.extend(diff_chars(&src[x..], &dst[y..]));
    edits
}

/// Merge adjacent runs, factor shared affixes out of delete/insert pairs, and
/// drop empty runs.
pub(crate) fn cleanup_merge(edits: &mut Vec<Edit>) {
    let mut merged: Vec<Edit> = Vec::with_capacity(edits.len());
    let mut deleted = String::new();
    let mut inserted = String::new();

    let flush = |merged: &mut Vec<Edit>, deleted: &mut String, inserted: &mut String| {
        if deleted.is_empty() && inserted.is_empty() {
            return;
        }
        let del: Vec<char> = deleted.chars().collect();
        let ins: Vec<char> = inserted.chars().collect();
        let (mut del, mut ins) = (&del[..], &ins[..]);
        let mut suffix = String::new();
        if !del.is_empty() && !ins.is_empty() {
            let prefix = common_prefix(del, ins);
            if prefix > 0 {
                push_run(merged, DiffOp::Equal, text(&del[..prefix]));
                del = &del[prefix..];
                ins = &ins[prefix..];
            }
            let tail = common_suffix(del, ins);
            if tail > 0 {
                suffix = text(&del[del.len() - tail..]);
                del = &del[..del.len() - tail];
                ins = &ins[..ins.len() - tail];
            }
        }
        if !del.is_empty() {
            push_run(merged, DiffOp::Delete, text(del));
        }
        if !ins.is_empty() {
            push_run(merged, DiffOp::Insert, text(ins));
        }
        if !suffix.is_empty() {
            push_run(merged, DiffOp::Equal, suffix);
        }
        deleted.clear();
        inserted.clear();
    };

    for (op, run) in edits.drain(..) {
        match op {
            DiffOp::Delete => deleted.push_str(&run),
            DiffOp::Insert => inserted.push_str(&run),
            DiffOp::Equal => {
                flush(&mut merged, &mut deleted, &mut inserted);
                push_run(&mut merged, DiffOp::Equal, run);
            }
        }
    }
    flush(&mut merged, &mut deleted, &mut inserted);
    *edits = merged;
}

fn push_run(edits: &mut Vec<Edit>, op: DiffOp, run: String) {
    if run.is_empty() {
        return;
    }
    match edits.last_mut() {
        Some((last_op, last)) if *last_op == op => last.push_str(&run),
        _ => edits.push((op, run)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_texts() {
        assert_eq!(diff_text("hello", "hello"), vec![(DiffOp::Equal, "hello".to_string())]);
        assert!(diff_text("", "").is_empty());
    }

    #[test]
    fn pure_insert_and_delete() {
        assert_eq!(diff_text("", "abc"), vec![(DiffOp::Insert, "abc".to_string())]);
        assert_eq!(diff_text("abc", ""), vec![(DiffOp::Delete, "abc".to_string())]);
    }

    #[test]
    fn middle_insert() {
        assert_eq!(
            diff_text("ac", "abc"),
            vec![
                (DiffOp::Equal, "a".to_string()),
                (DiffOp::Insert, "b".to_string()),
                (DiffOp::Equal, "c".to_string()),
            ]
        );
    }

    #[test]
    fn both_sides_reconstruct() {
        let cases = [
            ("the quick brown fox", "the slow green fox"),
            ("abcd", "aXd"),
            ("kitten", "sitting"),
            ("hello wörld", "hallo welt ✓"),
            ("abc", "xyz"),
        ];
        for (src, dst) in cases {
            let edits = diff_text(src, dst);
            assert_eq!(source_text(&edits), src);
            assert_eq!(target_text(&edits), dst);
        }
    }

    fn lcs_len(a: &[char], b: &[char]) -> usize {
        let mut row = vec![0; b.len() + 1];
        for x in a {
            let mut diag = 0;
            for (j, y) in b.iter().enumerate() {
                let up = row[j + 1];
                row[j + 1] = if x == y { diag + 1 } else { up.max(row[j]) };
                diag = up;
            }
        }
        row[b.len()]
    }

    #[test]
    fn middle_snake_finds_a_shortest_script() {
        // Odd and even length differences meet from opposite directions.
        let cases = [("cat", "map"), ("abcxdef", "abydefz"), ("xaxcxabc", "abcy"), ("banana", "atana")];
        for (src, dst) in cases {
            let (a, b): (Vec<char>, Vec<char>) = (src.chars().collect(), dst.chars().collect());
            let edits = bisect(&a, &b);
            assert_eq!(source_text(&edits), src);
            assert_eq!(target_text(&edits), dst);
            let kept: usize = edits
                .iter()
                .filter(|(op, _)| *op == DiffOp::Equal)
                .map(|(_, run)| run.chars().count())
                .sum();
            assert_eq!(kept, lcs_len(&a, &b), "{src} -> {dst}");
        }
    }

    #[test]
    fn runs_are_merged() {
        let mut edits = vec![
            (DiffOp::Insert, "a".to_string()),
            (DiffOp::Insert, "b".to_string()),
            (DiffOp::Equal, String::new()),
            (DiffOp::Equal, "c".to_string()),
        ];
        cleanup_merge(&mut edits);
        assert_eq!(
            edits,
            vec![(DiffOp::Insert, "ab".to_string()), (DiffOp::Equal, "c".to_string())]
        );
    }
}
