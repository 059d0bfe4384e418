//! Line-level diff of a single file between two revisions.
//!
//! Built on `similar`'s Myers implementation. Used to show what changed in a
//! document body or a table file between two commits.

use std::fmt::Write as _;

use similar::{ChangeTag, TextDiff};

/// Number of unchanged lines kept around each change.
pub const DEFAULT_CONTEXT: usize = 3;

/// Line-level diff of one file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobDiff {
    pub hunks: Vec<DiffHunk>,
    /// Line count of the old content.
    pub old_lines: usize,
    /// Line count of the new content.
    pub new_lines: usize,
    /// Either side was not valid UTF-8.
    pub binary: bool,
}

impl BlobDiff {
    /// Returns `true` if both sides are identical.
    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Lines added across all hunks.
    pub fn additions(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Added(_)))
    }

    /// Lines removed across all hunks.
    pub fn deletions(&self) -> usize {
        self.count(|l| matches!(l, DiffLine::Removed(_)))
    }

    fn count(&self, pred: impl Fn(&DiffLine) -> bool) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| pred(l))
            .count()
    }

    /// Render in unified-diff form with `---`/`+++` headers.
    pub fn to_unified(&self, old_label: &str, new_label: &str) -> String {
        let mut out = String::new();
        if self.is_empty() {
            return out;
        }
        let _ = writeln!(out, "--- {old_label}");
        let _ = writeln!(out, "+++ {new_label}");
        if self.binary {
            out.push_str("Binary files differ\n");
            return out;
        }
        for hunk in &self.hunks {
            let _ = writeln!(
                out,
                "@@ -{},{} +{},{} @@",
                hunk.old_start, hunk.old_count, hunk.new_start, hunk.new_count
            );
            for line in &hunk.lines {
                let (sigil, text) = match line {
                    DiffLine::Context(t) => (' ', t),
                    DiffLine::Added(t) => ('+', t),
                    DiffLine::Removed(t) => ('-', t),
                };
                let _ = writeln!(out, "{sigil}{text}");
            }
        }
        out
    }
}

/// A contiguous region of changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffHunk {
    /// 1-based first line in the old content.
    pub old_start: usize,
    pub old_count: usize,
    /// 1-based first line in the new content.
    pub new_start: usize,
    pub new_count: usize,
    pub lines: Vec<DiffLine>,
}

/// One line of a hunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DiffLine {
    Context(String),
    Added(String),
    Removed(String),
}

/// Diff two file contents with [`DEFAULT_CONTEXT`] lines of context.
///
/// Content that is not valid UTF-8 produces a single summary hunk and sets
/// [`BlobDiff::binary`].
pub fn diff_blobs(old: &[u8], new: &[u8]) -> BlobDiff {
    diff_blobs_with_context(old, new, DEFAULT_CONTEXT)
}

/// Diff two file contents keeping `context` unchanged lines around changes.
pub fn diff_blobs_with_context(old: &[u8], new: &[u8], context: usize) -> BlobDiff {
    let (Ok(old_text), Ok(new_text)) = (std::str::from_utf8(old), std::str::from_utf8(new)) else {
        return binary_diff(old, new);
    };

    let mut diff = BlobDiff {
        hunks: Vec::new(),
        old_lines: old_text.lines().count(),
        new_lines: new_text.lines().count(),
        binary: false,
    };
    if old_text == new_text {
        return diff;
    }

    let text_diff = TextDiff::from_lines(old_text, new_text);
    for group in text_diff.grouped_ops(context) {
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        let old_range = first.old_range().start..last.old_range().end;
        let new_range = first.new_range().start..last.new_range().end;

        let lines = group
            .iter()
            .flat_map(|op| text_diff.iter_changes(op))
            .map(|change| {
                let text = change.value().trim_end_matches('\n').to_string();
                match change.tag() {
                    ChangeTag::Equal => DiffLine::Context(text),
                    ChangeTag::Delete => DiffLine::Removed(text),
                    ChangeTag::Insert => DiffLine::Added(text),
                }
            })
            .collect();

        diff.hunks.push(DiffHunk {
            old_start: old_range.start + 1,
            old_count: old_range.len(),
            new_start: new_range.start + 1,
            new_count: new_range.len(),
            lines,
        });
    }
    diff
}

fn binary_diff(old: &[u8], new: &[u8]) -> BlobDiff {
    let mut diff = BlobDiff {
        hunks: Vec::new(),
        old_lines: 0,
        new_lines: 0,
        binary: true,
    };
    if old == new {
        return diff;
    }
    let mut lines = Vec::new();
    if !old.is_empty() {
        lines.push(DiffLine::Removed(format!("(binary, {} bytes)", old.len())));
    }
    if !new.is_empty() {
        lines.push(DiffLine::Added(format!("(binary, {} bytes)", new.len())));
    }
    diff.hunks.push(DiffHunk {
        old_start: 1,
        old_count: usize::from(!old.is_empty()),
        new_start: 1,
        new_count: usize::from(!new.is_empty()),
        lines,
    });
    diff
}
