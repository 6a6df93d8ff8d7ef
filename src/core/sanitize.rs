//! Sanitization of generated diff text before anything touches disk.
//!
//! Model output is untrusted: it often wraps the diff in a markdown fence,
//! prepends commentary, or echoes the prompt back instead of producing a diff
//! at all. Extraction pulls the most plausible diff candidate out of the raw
//! text; validation decides whether that candidate is structurally safe to
//! hand to the applier.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

static FENCED_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:diff)?\n(.*?)\n```").expect("fence regex"));
static HUNK_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^@@.*@@").expect("hunk regex"));
static CHANGE_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[+-][^+-]").expect("change line regex"));

/// Markers the prompt envelope wraps sections in. Their literal presence in a
/// candidate diff means the model echoed its prompt instead of answering.
pub const PROMPT_MARKERS: [&str; 3] = ["<SYSTEM>", "<CONTEXT>", "<TASK>"];

const DIFF_START_MARKERS: [&str; 2] = ["diff --git ", "--- a/"];

/// Why a candidate diff was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Empty or whitespace-only text.
    Empty,
    /// Neither recognizable file-header pairs nor any change lines.
    MissingFileMarkers,
    /// Hunk headers absent and no change lines either.
    NoChangeLines,
    /// Literal prompt-section markers present; never salvaged.
    PromptMarkers,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Empty => write!(f, "empty diff"),
            RejectReason::MissingFileMarkers => {
                write!(f, "diff missing file markers (--- and +++)")
            }
            RejectReason::NoChangeLines => {
                write!(f, "diff has no change lines (lines starting with + or -)")
            }
            RejectReason::PromptMarkers => {
                write!(f, "diff contains prompt markers - agent did not generate a proper diff")
            }
        }
    }
}

impl std::error::Error for RejectReason {}

/// Extract the most plausible unified diff from raw agent output.
///
/// Prefers the first fenced code block whose body looks like a diff, then
/// discards leading commentary before the first diff-start marker. The result
/// always ends with exactly one trailing newline.
pub fn extract(raw: &str) -> String {
    let mut text = raw;

    for caps in FENCED_BLOCK_RE.captures_iter(raw) {
        let body = caps.get(1).expect("fence body").as_str();
        if looks_like_diff(body) {
            debug!("extracted diff from fenced code block");
            text = body;
            break;
        }
    }

    if let Some(start) = DIFF_START_MARKERS.iter().filter_map(|m| text.find(m)).min() {
        if start > 0 {
            debug!(start, "discarding commentary before diff start");
        }
        text = &text[start..];
    }

    let mut out = text.trim().to_string();
    out.push('\n');
    out
}

/// Validate that the candidate has enough unified-diff structure to attempt
/// an apply. Pure; side effects are logging only.
pub fn validate(diff_text: &str) -> Result<(), RejectReason> {
    if diff_text.trim().is_empty() {
        return Err(RejectReason::Empty);
    }

    if PROMPT_MARKERS.iter().any(|m| diff_text.contains(m)) {
        return Err(RejectReason::PromptMarkers);
    }

    let has_file_headers = (diff_text.contains("--- ") && diff_text.contains("+++ "))
        || diff_text.contains("diff --git");
    let has_changes = CHANGE_LINE_RE.is_match(diff_text);

    if !has_file_headers {
        if !has_changes {
            return Err(RejectReason::MissingFileMarkers);
        }
        warn!("diff has minimal structure, may not apply cleanly");
    }

    if !HUNK_HEADER_RE.is_match(diff_text) {
        // Some legitimate minimal diffs omit hunk headers; only reject when
        // there is nothing that looks like a change at all.
        if !has_changes {
            return Err(RejectReason::NoChangeLines);
        }
        warn!("diff missing hunk headers (@@), may not apply cleanly");
    }

    if diff_text.contains("```") {
        warn!("diff still contains markdown fence markers");
    }

    Ok(())
}

fn looks_like_diff(body: &str) -> bool {
    DIFF_START_MARKERS.iter().any(|m| body.contains(m))
        || HUNK_HEADER_RE.is_match(body)
        || CHANGE_LINE_RE.is_match(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_FILE_DIFF: &str = "--- /dev/null\n+++ b/tests/test_add.py\n@@ -0,0 +1,2 @@\n+def test_add():\n+    assert add(1, 2) == 3\n";

    #[test]
    fn extract_returns_fenced_body_with_trailing_newline() {
        let raw = format!("Here is the patch you asked for:\n\n```diff\n{NEW_FILE_DIFF}```\n\nLet me know if it helps.");
        assert_eq!(extract(&raw), NEW_FILE_DIFF);
    }

    #[test]
    fn extract_skips_fenced_block_that_is_not_a_diff() {
        let raw = "```python\nprint('hi')\n```\n\ndiff --git a/x b/x\n--- a/x\n+++ b/x\n@@ -1 +1 @@\n-old\n+new";
        let got = extract(raw);
        assert!(got.starts_with("diff --git a/x b/x\n"));
        assert!(got.ends_with("+new\n"));
    }

    #[test]
    fn extract_discards_prose_before_diff_start() {
        let diff = "--- a/src/calc.py\n+++ b/src/calc.py\n@@ -1 +1 @@\n-def add(a, b):\n+def add(a: int, b: int):\n";
        let raw = format!("Sure! I'll write the tests first.\n\n{diff}");
        assert_eq!(extract(&raw), diff);
    }

    #[test]
    fn extract_normalizes_to_single_trailing_newline() {
        let raw = "--- a/f\n+++ b/f\n@@ -1 +1 @@\n-a\n+b\n\n\n";
        assert!(extract(raw).ends_with("+b\n"));
        assert!(!extract(raw).ends_with("\n\n"));
    }

    #[test]
    fn validate_rejects_empty() {
        assert_eq!(validate("   \n  \n"), Err(RejectReason::Empty));
    }

    #[test]
    fn validate_rejects_prompt_markers_even_with_valid_structure() {
        let text = format!("<TASK>\nwrite tests\n</TASK>\n{NEW_FILE_DIFF}");
        assert_eq!(validate(&text), Err(RejectReason::PromptMarkers));
    }

    #[test]
    fn validate_rejects_prose_without_markers_or_changes() {
        assert_eq!(
            validate("I could not produce a diff for this task.\n"),
            Err(RejectReason::MissingFileMarkers)
        );
    }

    #[test]
    fn validate_accepts_diff_without_hunk_headers_when_changes_exist() {
        let text = "--- a/src/lib.rs\n+++ b/src/lib.rs\n-fn old() {}\n+fn new() {}\n";
        assert_eq!(validate(text), Ok(()));
    }

    #[test]
    fn validate_rejects_headers_without_any_change_lines() {
        let text = "--- a/src/lib.rs\n+++ b/src/lib.rs\nno changes here\n";
        assert_eq!(validate(text), Err(RejectReason::NoChangeLines));
    }

    #[test]
    fn validate_accepts_well_formed_new_file_diff() {
        assert_eq!(validate(NEW_FILE_DIFF), Ok(()));
    }
}
