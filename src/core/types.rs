//! Shared contract types between pipeline components.
//!
//! These types define stable contracts between the controller and its
//! collaborators. They carry no I/O state and remain deterministic across runs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How a patch ended up being applied (or not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchMethod {
    /// Applied through `git apply`.
    VcsApply,
    /// Applied through the constrained additive-only fallback writer.
    Manual,
    /// Not applied at all.
    Rejected,
}

impl fmt::Display for PatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchMethod::VcsApply => write!(f, "vcs-apply"),
            PatchMethod::Manual => write!(f, "manual"),
            PatchMethod::Rejected => write!(f, "rejected"),
        }
    }
}

/// Outcome of one patch application attempt.
///
/// Produced once per attempt; the applier never retries beyond its built-in
/// header-rewrite and manual fallback strategies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub applied: bool,
    pub method: PatchMethod,
    pub message: String,
}

/// One verification step as an ordered argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateCommand(pub Vec<String>);

impl GateCommand {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// Shell-ish rendering for transcripts and logs.
    pub fn render(&self) -> String {
        self.0.join(" ")
    }
}

/// Combined result of running a project's gate commands.
///
/// The transcript concatenates each command's invocation line and captured
/// output in execution order, truncated at the first failing command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRunResult {
    pub ok: bool,
    pub transcript: String,
}

/// Loop phase recorded in the persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    TestsWritten,
    Gates,
    Diagnose,
}

/// Role-specific agent profile selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentRole {
    Planner,
    TestWriter,
    Diagnoser,
    Implementer,
    Reviewer,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Planner => "planner",
            AgentRole::TestWriter => "test_writer",
            AgentRole::Diagnoser => "diagnoser",
            AgentRole::Implementer => "implementer",
            AgentRole::Reviewer => "reviewer",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
