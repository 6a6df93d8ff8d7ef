//! Resumable pipeline state stored inside the target project.
//!
//! A single JSON file (`.redgreen/state.json`) carries just enough to resume
//! an interrupted loop: the task, the plan, and where the loop stood. The
//! schema is versioned and every load validates against it before parsing,
//! so a stale or hand-mangled file degrades to "no resumable session" rather
//! than crashing the run. Losing resumability is not data loss, which is why
//! save failures are warnings, not errors.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::core::types::Phase;

const STATE_SCHEMA: &str = include_str!("../schemas/pipeline_state.schema.json");
const STATE_VERSION: u32 = 1;

/// Snapshot of loop progress persisted after each phase transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineState {
    pub version: u32,
    /// Task text; resumption requires a verbatim match with the invocation.
    pub task: String,
    /// Planner output recorded once and carried across iterations.
    pub plan: String,
    /// Iteration the loop should (re)start at, 1-indexed.
    pub iteration: u32,
    pub phase: Phase,
    /// Unix seconds at save time.
    pub timestamp: f64,
}

impl PipelineState {
    pub fn new(task: &str, plan: &str, iteration: u32, phase: Phase) -> Self {
        Self {
            version: STATE_VERSION,
            task: task.to_string(),
            plan: plan.to_string(),
            iteration,
            phase,
            timestamp: unix_now(),
        }
    }
}

/// Fixed location of the state file inside a target project.
pub fn state_path(project: &Path) -> PathBuf {
    project.join(".redgreen").join("state.json")
}

/// Persist state. Errors are the caller's to downgrade; the controller treats
/// them as a warning and proceeds without resumability.
pub fn save_state(project: &Path, state: &PipelineState) -> Result<()> {
    let path = state_path(project);
    let parent = path
        .parent()
        .with_context(|| format!("state path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(state).context("serialize state")?;
    buf.push('\n');
    // Temp file + rename so an interrupted save never leaves a torn file.
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp state {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("replace state {}", path.display()))?;
    debug!(path = %path.display(), iteration = state.iteration, phase = ?state.phase, "state saved");
    Ok(())
}

/// Load state if present and valid. Absent file means no resumable session;
/// a corrupt or schema-invalid file is logged and treated the same way.
pub fn load_state(project: &Path) -> Option<PipelineState> {
    let path = state_path(project);
    if !path.exists() {
        return None;
    }
    match read_and_validate(&path) {
        Ok(state) => {
            debug!(path = %path.display(), iteration = state.iteration, "state loaded");
            Some(state)
        }
        Err(err) => {
            warn!(path = %path.display(), error = %format!("{err:#}"), "ignoring unreadable state file");
            None
        }
    }
}

/// Remove the state file after successful completion.
pub fn clear_state(project: &Path) -> Result<()> {
    let path = state_path(project);
    if path.exists() {
        fs::remove_file(&path).with_context(|| format!("remove state {}", path.display()))?;
        debug!(path = %path.display(), "state cleared");
    }
    Ok(())
}

fn read_and_validate(path: &Path) -> Result<PipelineState> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read state {}", path.display()))?;
    let instance: Value = serde_json::from_str(&contents).context("parse state json")?;
    validate_schema(&instance)?;
    let state: PipelineState =
        serde_json::from_value(instance).context("parse state as v1 struct")?;
    Ok(state)
}

/// Validate a state instance against the embedded schema (Draft 2020-12).
fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(STATE_SCHEMA).context("parse state schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile state schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("state schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
