//! Test-only helpers: a disposable git repository and scripted collaborator
//! doubles for the iteration loop.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use tempfile::TempDir;

use crate::core::types::{GateCommand, GateRunResult};
use crate::io::agent::{AgentInvoker, AgentRequest};
use crate::io::gates::GateRunner;

/// A temporary git repository with one initial commit.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new().context("create temp dir")?;
        git(dir.path(), &["init", "--quiet"])?;
        git(dir.path(), &["config", "user.email", "test@example.com"])?;
        git(dir.path(), &["config", "user.name", "Test"])?;
        fs::write(dir.path().join("README.md"), "# fixture\n").context("write README")?;
        git(dir.path(), &["add", "."])?;
        git(dir.path(), &["commit", "--quiet", "-m", "init"])?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file relative to the repository root, creating parents.
    pub fn write_file(&self, rel: &str, contents: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("create parent dirs")?;
        }
        fs::write(&path, contents).with_context(|| format!("write {rel}"))?;
        Ok(path)
    }

    /// Stage and commit everything, leaving the tree clean.
    pub fn commit_all(&self, message: &str) -> Result<()> {
        git(self.dir.path(), &["add", "."])?;
        git(self.dir.path(), &["commit", "--quiet", "-m", message])
    }
}

fn git(workdir: &Path, args: &[&str]) -> Result<()> {
    let status = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .status()
        .with_context(|| format!("spawn git {args:?}"))?;
    if !status.success() {
        return Err(anyhow!("git {args:?} failed with {status}"));
    }
    Ok(())
}

/// Invoker double that replays queued responses and records every request.
pub struct ScriptedInvoker {
    responses: Mutex<Vec<String>>,
    requests: Mutex<Vec<AgentRequest>>,
}

impl ScriptedInvoker {
    /// Responses are consumed in the given order, one per invocation.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut queue: Vec<String> = responses.into_iter().map(Into::into).collect();
        queue.reverse();
        Self {
            responses: Mutex::new(queue),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request seen so far, in invocation order.
    pub fn requests(&self) -> Vec<AgentRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn invocation_count(&self) -> usize {
        self.requests.lock().expect("requests lock").len()
    }
}

impl AgentInvoker for ScriptedInvoker {
    fn invoke(&self, request: &AgentRequest) -> Result<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        self.responses
            .lock()
            .expect("responses lock")
            .pop()
            .ok_or_else(|| anyhow!("scripted invoker exhausted (role {})", request.role))
    }
}

/// Gate runner double that replays queued results without running anything.
pub struct ScriptedGateRunner {
    results: Mutex<Vec<GateRunResult>>,
    runs: Mutex<Vec<Vec<String>>>,
}

impl ScriptedGateRunner {
    pub fn new(results: Vec<GateRunResult>) -> Self {
        let mut queue = results;
        queue.reverse();
        Self {
            results: Mutex::new(queue),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Shorthand: queue of pass/fail outcomes with canned transcripts.
    pub fn from_outcomes(outcomes: &[bool]) -> Self {
        Self::new(
            outcomes
                .iter()
                .map(|&ok| GateRunResult {
                    ok,
                    transcript: if ok {
                        "$ gates\nall green\n".to_string()
                    } else {
                        "$ gates\n1 failed\n".to_string()
                    },
                })
                .collect(),
        )
    }

    /// Rendered command lists for each recorded run.
    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().expect("runs lock").clone()
    }

    pub fn run_count(&self) -> usize {
        self.runs.lock().expect("runs lock").len()
    }
}

impl GateRunner for ScriptedGateRunner {
    fn run(&self, _workdir: &Path, commands: &[GateCommand]) -> Result<GateRunResult> {
        self.runs
            .lock()
            .expect("runs lock")
            .push(commands.iter().map(GateCommand::render).collect());
        self.results
            .lock()
            .expect("results lock")
            .pop()
            .ok_or_else(|| anyhow!("scripted gate runner exhausted"))
    }
}
