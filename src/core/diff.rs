//! Structured unified-diff parser for the manual fallback writer.
//!
//! The fallback applier only ever reconstructs brand-new files, so the parser
//! classifies hunk shapes explicitly: a file is reconstructable when every one
//! of its hunks inserts at line 0 and contains nothing but added lines.
//! Anything else is reported as an unsupported shape rather than silently
//! mis-applied.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static HUNK_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk range regex")
});

/// Kind of a single line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Added,
    Removed,
    Context,
}

/// One line of a hunk with its leading marker stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HunkLine {
    pub kind: LineKind,
    pub content: String,
}

/// One contiguous change block with its originating line ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: u32,
    pub old_count: u32,
    pub new_start: u32,
    pub new_count: u32,
    pub lines: Vec<HunkLine>,
}

impl Hunk {
    /// True when this hunk creates content from nothing: insert at line 0,
    /// nothing removed, only added lines.
    pub fn is_pure_addition(&self) -> bool {
        self.old_start == 0
            && self.old_count == 0
            && self.lines.iter().all(|l| l.kind == LineKind::Added)
    }
}

/// Per-file section of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Path from the `---` header, `None` for `/dev/null` (file creation).
    pub old_path: Option<String>,
    /// Path from the `+++` header, `None` for `/dev/null` (file deletion).
    pub new_path: Option<String>,
    pub hunks: Vec<Hunk>,
}

/// Structural parse failure with the offending 1-indexed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "diff parse error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// A file whose hunks the manual fallback cannot reproduce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedHunkShape {
    pub path: String,
}

impl fmt::Display for UnsupportedHunkShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unsupported hunk shape for '{}': manual application handles pure-addition hunks only",
            self.path
        )
    }
}

impl std::error::Error for UnsupportedHunkShape {}

/// Parse a sanitized unified diff into per-file hunk records.
///
/// Git noise lines (`diff --git`, `index`, mode lines) are skipped. Hunk body
/// lines are `+`/`-`/` ` prefixed; a `\ No newline at end of file` marker is
/// ignored.
pub fn parse(diff_text: &str) -> Result<Vec<FilePatch>, ParseError> {
    let mut files: Vec<FilePatch> = Vec::new();
    let mut pending_old: Option<Option<String>> = None;

    for (idx, line) in diff_text.lines().enumerate() {
        let line_no = idx + 1;

        if line.starts_with("diff --git ")
            || line.starts_with("index ")
            || line.starts_with("new file mode")
            || line.starts_with("deleted file mode")
            || line.starts_with("similarity index")
            || line.starts_with("rename from")
            || line.starts_with("rename to")
        {
            continue;
        }

        if let Some(rest) = line.strip_prefix("--- ") {
            pending_old = Some(header_path(rest, "a/"));
            continue;
        }

        if let Some(rest) = line.strip_prefix("+++ ") {
            let old_path = pending_old.take().unwrap_or(None);
            files.push(FilePatch {
                old_path,
                new_path: header_path(rest, "b/"),
                hunks: Vec::new(),
            });
            continue;
        }

        if line.starts_with("@@") {
            let caps = HUNK_RANGE_RE.captures(line).ok_or_else(|| ParseError {
                line: line_no,
                message: format!("malformed hunk header '{line}'"),
            })?;
            let file = files.last_mut().ok_or_else(|| ParseError {
                line: line_no,
                message: "hunk header before any file headers".to_string(),
            })?;
            file.hunks.push(Hunk {
                old_start: range_field(&caps, 1),
                old_count: range_field_or(&caps, 2, 1),
                new_start: range_field(&caps, 3),
                new_count: range_field_or(&caps, 4, 1),
                lines: Vec::new(),
            });
            continue;
        }

        let Some(hunk) = files.last_mut().and_then(|f| f.hunks.last_mut()) else {
            // Prose between file sections; the sanitizer keeps this possible.
            continue;
        };

        if line.starts_with('\\') {
            continue;
        }
        let (kind, content) = if let Some(rest) = line.strip_prefix('+') {
            (LineKind::Added, rest)
        } else if let Some(rest) = line.strip_prefix('-') {
            (LineKind::Removed, rest)
        } else if let Some(rest) = line.strip_prefix(' ') {
            (LineKind::Context, rest)
        } else if line.is_empty() {
            // Tolerate a bare empty line where strict diffs would use " ".
            (LineKind::Context, "")
        } else {
            return Err(ParseError {
                line: line_no,
                message: format!("unexpected line inside hunk: '{line}'"),
            });
        };
        hunk.lines.push(HunkLine {
            kind,
            content: content.to_string(),
        });
    }

    if files.is_empty() {
        return Err(ParseError {
            line: 0,
            message: "no file sections found".to_string(),
        });
    }
    Ok(files)
}

/// Reconstruct the full content of a newly created file from its hunks.
///
/// Fails closed: any hunk that is not a pure addition (context lines, removed
/// lines, or a non-zero old range) is rejected rather than partially applied.
pub fn additive_content(patch: &FilePatch) -> Result<String, UnsupportedHunkShape> {
    let path = patch
        .new_path
        .clone()
        .unwrap_or_else(|| "/dev/null".to_string());
    if patch.hunks.is_empty() || !patch.hunks.iter().all(Hunk::is_pure_addition) {
        return Err(UnsupportedHunkShape { path });
    }
    let lines: Vec<&str> = patch
        .hunks
        .iter()
        .flat_map(|h| h.lines.iter().map(|l| l.content.as_str()))
        .collect();
    Ok(lines.join("\n"))
}

fn header_path(raw: &str, strip: &str) -> Option<String> {
    // `--- a/path` may carry a timestamp after a tab.
    let path = raw.split('\t').next().unwrap_or(raw).trim();
    if path == "/dev/null" {
        return None;
    }
    Some(path.strip_prefix(strip).unwrap_or(path).to_string())
}

fn range_field(caps: &regex::Captures<'_>, idx: usize) -> u32 {
    caps.get(idx)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

fn range_field_or(caps: &regex::Captures<'_>, idx: usize, default: u32) -> u32 {
    caps.get(idx)
        .map(|m| m.as_str().parse().unwrap_or(default))
        .unwrap_or(default)
}
