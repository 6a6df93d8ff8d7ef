//! Git adapter for the pipeline.
//!
//! The pipeline refuses to mutate trees it cannot roll back from, and applies
//! generated patches through `git apply`, so we keep a small, explicit wrapper
//! around `git` subprocess calls.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Result of a `git apply` (or `--check`) invocation.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub ok: bool,
    /// stderr (preferred) or stdout from git, trimmed.
    pub message: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// True when the working directory is inside a git work tree.
    pub fn is_work_tree(&self) -> bool {
        self.run(&["rev-parse", "--is-inside-work-tree"])
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Ensure the worktree is clean, allowing entries with any of the given prefixes.
    #[instrument(skip_all)]
    pub fn ensure_clean_except_prefixes(&self, allowed_prefixes: &[&str]) -> Result<()> {
        let entries = self.status_porcelain()?;
        let mut disallowed = Vec::new();
        for entry in entries {
            if allowed_prefixes
                .iter()
                .any(|prefix| entry.path.starts_with(prefix))
            {
                continue;
            }
            disallowed.push(entry);
        }
        if disallowed.is_empty() {
            debug!("worktree is clean");
            return Ok(());
        }
        warn!(disallowed_count = disallowed.len(), "worktree not clean");
        let mut msg = String::new();
        msg.push_str("working tree not clean (uncommitted changes):\n");
        for entry in disallowed {
            msg.push_str(&format!("{} {}\n", entry.code, entry.path));
        }
        Err(anyhow!(msg.trim_end().to_string()))
    }

    /// Dry-run a patch file: would it apply cleanly?
    #[instrument(skip_all)]
    pub fn apply_check(&self, patch_path: &Path) -> Result<ApplyResult> {
        self.apply_patch_file(patch_path, true)
    }

    /// Apply a patch file for real.
    #[instrument(skip_all)]
    pub fn apply(&self, patch_path: &Path) -> Result<ApplyResult> {
        self.apply_patch_file(patch_path, false)
    }

    fn apply_patch_file(&self, patch_path: &Path, check: bool) -> Result<ApplyResult> {
        let path_arg = patch_path
            .to_str()
            .ok_or_else(|| anyhow!("patch path is not valid UTF-8: {}", patch_path.display()))?;
        let mut args = vec!["apply"];
        if check {
            args.push("--check");
        }
        args.push("--whitespace=nowarn");
        args.push(path_arg);

        let out = self.run(&args)?;
        let stderr = String::from_utf8_lossy(&out.stderr);
        let stdout = String::from_utf8_lossy(&out.stdout);
        let message = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            stderr.trim().to_string()
        };
        debug!(check, ok = out.status.success(), "git apply finished");
        Ok(ApplyResult {
            ok: out.status.success(),
            message,
        })
    }

    fn run_capture(&self, args: &[&str]) -> Result<String> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: path.trim().to_string(),
        });
    }
    if line.len() < 4 {
        return Err(anyhow!("unexpected porcelain line: '{line}'"));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry { code, path })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestRepo;

    #[test]
    fn parses_untracked_line() {
        let e = parse_status_line("?? foo.txt").expect("parse");
        assert_eq!(
            e,
            StatusEntry {
                code: "??".to_string(),
                path: "foo.txt".to_string()
            }
        );
    }

    #[test]
    fn parses_modified_line() {
        let e = parse_status_line(" M src/main.rs").expect("parse");
        assert_eq!(e.code, " M");
        assert_eq!(e.path, "src/main.rs");
    }

    #[test]
    fn parses_rename_line_uses_new_path() {
        let e = parse_status_line("R  old.txt -> new.txt").expect("parse");
        assert_eq!(e.path, "new.txt");
    }

    #[test]
    fn detects_work_tree() {
        let repo = TestRepo::new().expect("repo");
        assert!(Git::new(repo.path()).is_work_tree());

        let plain = tempfile::tempdir().expect("tempdir");
        assert!(!Git::new(plain.path()).is_work_tree());
    }

    #[test]
    fn clean_tree_passes_and_dirty_tree_fails() {
        let repo = TestRepo::new().expect("repo");
        let git = Git::new(repo.path());
        git.ensure_clean_except_prefixes(&[]).expect("clean");

        std::fs::write(repo.path().join("scratch.txt"), "dirt").expect("write");
        let err = git.ensure_clean_except_prefixes(&[]).unwrap_err();
        assert!(err.to_string().contains("scratch.txt"));

        git.ensure_clean_except_prefixes(&["scratch.txt"])
            .expect("allowed prefix");
    }
}
