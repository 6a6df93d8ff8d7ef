//! Patch application for sanitized agent diffs.
//!
//! The applier tries `git apply` first (after repairing a common model
//! mistake in new-file headers) and falls back to a constrained manual writer
//! that only reconstructs brand-new files from pure-addition hunks. A diff is
//! never partially applied: either git applies it atomically, or the fallback
//! writes whole new files, or the outcome reports rejection.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::core::diff::{additive_content, parse};
use crate::core::sanitize;
use crate::core::types::{PatchMethod, PatchOutcome};
use crate::io::git::Git;

/// `--- a/path` followed by `+++ b/path` and an insert-at-zero hunk header.
/// Models frequently emit this for brand-new files where git expects
/// `--- /dev/null`.
static NEW_FILE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^--- a/.*\n(\+\+\+ b/.*)\n(@@ -0,0 \+.*@@)").expect("new file header regex")
});

/// Apply a generated diff to `project`.
///
/// The raw text is sanitized and validated first (idempotent if the caller
/// already did so). With `dry_run` the diff is only checked, never applied.
/// The scratch patch file is removed on every exit path.
#[instrument(skip_all, fields(project = %project.display(), dry_run))]
pub fn apply(project: &Path, raw: &str, dry_run: bool) -> Result<PatchOutcome> {
    let diff_text = sanitize::extract(raw);
    if let Err(reason) = sanitize::validate(&diff_text) {
        warn!(%reason, "rejecting invalid diff");
        return Ok(PatchOutcome {
            applied: false,
            method: PatchMethod::Rejected,
            message: reason.to_string(),
        });
    }

    let diff_text = fix_new_file_headers(&diff_text);
    debug!(bytes = diff_text.len(), "diff ready for apply");

    // NamedTempFile removes the scratch file when dropped, on every exit path.
    let scratch = write_scratch(&diff_text)?;
    let git = Git::new(project);

    let check = git.apply_check(scratch.path())?;
    if !check.ok {
        warn!(error = %check.message, "git apply --check failed, trying manual fallback");
        return apply_manually(project, &diff_text, &check.message);
    }

    if dry_run {
        info!("dry run successful - diff would apply cleanly");
        return Ok(PatchOutcome {
            applied: true,
            method: PatchMethod::VcsApply,
            message: "dry-run OK".to_string(),
        });
    }

    let applied = git.apply(scratch.path())?;
    if !applied.ok {
        warn!(error = %applied.message, "git apply failed");
        return Ok(PatchOutcome {
            applied: false,
            method: PatchMethod::Rejected,
            message: applied.message,
        });
    }

    info!("diff applied");
    Ok(PatchOutcome {
        applied: true,
        method: PatchMethod::VcsApply,
        message: "applied".to_string(),
    })
}

/// Rewrite ambiguous new-file removal headers to the null-device form.
fn fix_new_file_headers(diff_text: &str) -> String {
    NEW_FILE_HEADER_RE
        .replace_all(diff_text, "--- /dev/null\n$1\n$2")
        .into_owned()
}

/// Manual fallback: reconstruct whole new files from pure-addition hunks.
///
/// Anything the parser cannot prove to be a pure addition is rejected, with
/// the original `git apply --check` error retained for diagnostics. Writes
/// are committed file-by-file only after every file passed shape checks.
fn apply_manually(project: &Path, diff_text: &str, check_error: &str) -> Result<PatchOutcome> {
    let files = match parse(diff_text) {
        Ok(files) => files,
        Err(err) => {
            return Ok(PatchOutcome {
                applied: false,
                method: PatchMethod::Rejected,
                message: format!("git apply --check failed: {check_error}; {err}"),
            });
        }
    };

    let mut planned: Vec<(String, String)> = Vec::new();
    for file in &files {
        let Some(path) = file.new_path.clone() else {
            return Ok(PatchOutcome {
                applied: false,
                method: PatchMethod::Rejected,
                message: format!(
                    "git apply --check failed: {check_error}; manual fallback cannot delete files"
                ),
            });
        };
        match additive_content(file) {
            Ok(content) => planned.push((path, content)),
            Err(shape) => {
                return Ok(PatchOutcome {
                    applied: false,
                    method: PatchMethod::Rejected,
                    message: format!("git apply --check failed: {check_error}; {shape}"),
                });
            }
        }
    }

    for (rel_path, content) in &planned {
        let full = project.join(rel_path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        fs::write(&full, content).with_context(|| format!("write file {}", full.display()))?;
        debug!(path = %full.display(), "manually wrote file");
    }

    info!(files = planned.len(), "manual diff application completed");
    Ok(PatchOutcome {
        applied: true,
        method: PatchMethod::Manual,
        message: format!("manually applied {} file(s)", planned.len()),
    })
}

fn write_scratch(diff_text: &str) -> Result<NamedTempFile> {
    let mut scratch = tempfile::Builder::new()
        .prefix("redgreen-")
        .suffix(".patch")
        .tempfile()
        .context("create scratch patch file")?;
    scratch
        .write_all(diff_text.as_bytes())
        .context("write scratch patch file")?;
    scratch.flush().context("flush scratch patch file")?;
    Ok(scratch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    const NEW_FILE_DIFF: &str = "--- /dev/null\n+++ b/tests/test_math.py\n@@ -0,0 +1,2 @@\n+def test_add():\n+    assert 1 + 2 == 3\n";

    #[test]
    fn rewrites_ambiguous_new_file_header() {
        let diff = "--- a/notes.txt\n+++ b/notes.txt\n@@ -0,0 +1,1 @@\n+hello\n";
        let fixed = fix_new_file_headers(diff);
        assert!(fixed.starts_with("--- /dev/null\n+++ b/notes.txt\n@@ -0,0 +1,1 @@"));
    }

    #[test]
    fn leaves_modification_headers_alone() {
        let diff = "--- a/notes.txt\n+++ b/notes.txt\n@@ -1,1 +1,1 @@\n-old\n+new\n";
        assert_eq!(fix_new_file_headers(diff), diff);
    }

    #[test]
    fn applies_new_file_via_git() {
        let repo = TestRepo::new().expect("repo");
        let outcome = apply(repo.path(), NEW_FILE_DIFF, false).expect("apply");
        assert!(outcome.applied);
        assert_eq!(outcome.method, PatchMethod::VcsApply);
        let written =
            fs::read_to_string(repo.path().join("tests/test_math.py")).expect("read");
        assert_eq!(written, "def test_add():\n    assert 1 + 2 == 3\n");
    }

    #[test]
    fn dry_run_checks_without_mutating() {
        let repo = TestRepo::new().expect("repo");
        let outcome = apply(repo.path(), NEW_FILE_DIFF, true).expect("apply");
        assert!(outcome.applied);
        assert!(!repo.path().join("tests/test_math.py").exists());
    }

    #[test]
    fn falls_back_to_manual_writer_when_check_rejects() {
        let repo = TestRepo::new().expect("repo");
        // Hunk header promises 5 lines but carries 2: git rejects the patch
        // as corrupt, yet the manual writer can still reconstruct the file.
        let diff = "--- /dev/null\n+++ b/notes/new.txt\n@@ -0,0 +1,5 @@\n+alpha\n+beta\n";
        let outcome = apply(repo.path(), diff, false).expect("apply");
        assert!(outcome.applied);
        assert_eq!(outcome.method, PatchMethod::Manual);
        let written = fs::read_to_string(repo.path().join("notes/new.txt")).expect("read");
        assert_eq!(written, "alpha\nbeta");
    }

    #[test]
    fn rejects_mixed_hunks_in_manual_fallback() {
        let repo = TestRepo::new().expect("repo");
        // Modifies a file that does not exist: check fails, and the mixed
        // hunk shape means the fallback must fail closed.
        let diff =
            "--- a/missing.py\n+++ b/missing.py\n@@ -1,2 +1,2 @@\n context\n-old\n+new\n";
        let outcome = apply(repo.path(), diff, false).expect("apply");
        assert!(!outcome.applied);
        assert_eq!(outcome.method, PatchMethod::Rejected);
        assert!(outcome.message.contains("unsupported hunk shape"));
        assert!(outcome.message.contains("git apply --check failed"));
        assert!(!repo.path().join("missing.py").exists());
    }

    #[test]
    fn rejects_prompt_leakage_before_touching_git() {
        let repo = TestRepo::new().expect("repo");
        let raw = format!("<TASK>\nwrite tests\n</TASK>\n{NEW_FILE_DIFF}");
        let outcome = apply(repo.path(), &raw, false).expect("apply");
        assert!(!outcome.applied);
        assert_eq!(outcome.method, PatchMethod::Rejected);
        assert!(outcome.message.contains("prompt markers"));
    }

    #[test]
    fn applies_diff_wrapped_in_markdown_fence() {
        let repo = TestRepo::new().expect("repo");
        let raw = format!("Here you go:\n\n```diff\n{NEW_FILE_DIFF}```\n");
        let outcome = apply(repo.path(), &raw, false).expect("apply");
        assert!(outcome.applied);
        assert!(repo.path().join("tests/test_math.py").exists());
    }

    #[test]
    fn scratch_patch_files_are_cleaned_up() {
        let before = scratch_files();
        let repo = TestRepo::new().expect("repo");
        apply(repo.path(), NEW_FILE_DIFF, false).expect("apply ok");
        apply(repo.path(), "<TASK>leak</TASK>", false).expect("apply rejected");
        let after = scratch_files();
        assert_eq!(before, after, "scratch .patch files must not persist");
    }

    fn scratch_files() -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(std::env::temp_dir())
            .expect("read temp dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("redgreen-") && n.ends_with(".patch"))
            .collect();
        names.sort();
        names
    }
}
