//! The iteration controller: plan, write tests, then loop gates and fixes.
//!
//! One run drives the full red/green cycle against a target project: a
//! planner and test writer set up the red state, then gates run and a
//! diagnoser/implementer pair turns them green, iterating up to the budget.
//! Progress is persisted after each phase transition so an interrupted run
//! can resume. The controller is generic over [`AgentInvoker`] and
//! [`GateRunner`], which keeps the whole lifecycle testable with scripted
//! doubles and no model or toolchain present.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::adapters::{Adapter, detect_adapter};
use crate::config::PipelineConfig;
use crate::core::types::{AgentRole, Phase};
use crate::io::agent::{AgentInvoker, AgentRequest};
use crate::io::gates::GateRunner;
use crate::io::git::Git;
use crate::io::patch;
use crate::io::prompt::PromptEngine;
use crate::io::retrieval;
use crate::io::state::{PipelineState, clear_state, load_state, save_state};

/// Everything one pipeline run needs from the caller.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub project: PathBuf,
    pub task: String,
    /// Gate/fix iteration budget (1-indexed, inclusive).
    pub max_iterations: u32,
    /// Optional query for the retrieval pack injected into agent context.
    pub retrieval_query: Option<String>,
    pub retrieval_top_k: usize,
    /// Resume from persisted state when it matches this task verbatim.
    pub resume: bool,
    /// Check generated diffs without applying them.
    pub dry_run: bool,
}

/// What the run produced; failures that abort the run are errors instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub gates_green: bool,
    /// Gate runs actually executed (0 when resuming past the budget).
    pub iterations_run: u32,
    /// Reviewer output; empty when the reviewer failed (non-blocking).
    pub review: String,
}

/// The project failed a safety check before any agent ran.
#[derive(Debug)]
pub struct PreconditionError {
    pub message: String,
}

impl fmt::Display for PreconditionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "precondition failed: {}", self.message)
    }
}

impl std::error::Error for PreconditionError {}

/// A generated diff could not be applied; the run cannot proceed.
#[derive(Debug)]
pub struct ApplyError {
    pub role: AgentRole,
    pub message: String,
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to apply {} diff: {}", self.role, self.message)
    }
}

impl std::error::Error for ApplyError {}

/// Run the full pipeline lifecycle for one task.
#[instrument(skip_all, fields(project = %request.project.display(), task = %request.task))]
pub fn run_pipeline<A, G>(
    request: &PipelineRequest,
    config: &PipelineConfig,
    invoker: &A,
    gates: &G,
) -> Result<PipelineOutcome>
where
    A: AgentInvoker,
    G: GateRunner,
{
    let (adapter, resumed) = check_preconditions(request)?;
    let gate_commands = adapter.commands(&request.project);
    let engine = PromptEngine::new();

    let context = assemble_context(request, config, adapter);
    info!(adapter = adapter.id(), "pipeline starting");

    let (plan, start_iteration) = match &resumed {
        Some(state) => {
            info!(iteration = state.iteration, "resuming from saved state");
            (state.plan.clone(), state.iteration)
        }
        None => {
            let plan = invoke(invoker, AgentRole::Planner, request.task.clone(), &context)?;
            info!(bytes = plan.len(), "plan produced");

            let test_task = engine.test_task(&request.task, &plan)?;
            let test_diff = invoke(invoker, AgentRole::TestWriter, test_task, &context)?;
            apply_diff(request, AgentRole::TestWriter, &test_diff)?;
            persist(
                &request.project,
                &PipelineState::new(&request.task, &plan, 1, Phase::TestsWritten),
            );
            (plan, 1)
        }
    };

    let mut gates_green = false;
    let mut iterations_run = 0u32;

    for i in start_iteration..=request.max_iterations {
        info!(iteration = i, max = request.max_iterations, "running gates");
        let result = gates
            .run(&request.project, &gate_commands)
            .context("run gates")?;
        iterations_run += 1;

        if result.ok {
            info!(iteration = i, "all gates passed");
            gates_green = true;
            break;
        }
        warn!(iteration = i, "gates failed, diagnosing");
        persist(
            &request.project,
            &PipelineState::new(&request.task, &plan, i, Phase::Diagnose),
        );

        let diag_task = engine.diagnose_task(&result.transcript)?;
        let diagnosis = invoke(invoker, AgentRole::Diagnoser, diag_task, &context)?;

        let impl_task =
            engine.implement_task(&request.task, &plan, &diagnosis, &result.transcript)?;
        let impl_diff = invoke(invoker, AgentRole::Implementer, impl_task, &context)?;
        apply_diff(request, AgentRole::Implementer, &impl_diff)?;
        persist(
            &request.project,
            &PipelineState::new(&request.task, &plan, i + 1, Phase::Gates),
        );
    }

    if !gates_green {
        warn!(
            budget = request.max_iterations,
            "iteration budget exhausted without green gates"
        );
    }

    // Review is advisory: a failed reviewer never fails the run.
    let review = match engine
        .review_task()
        .and_then(|task| invoke(invoker, AgentRole::Reviewer, task, &context))
    {
        Ok(review) => review,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "reviewer failed, skipping review");
            String::new()
        }
    };

    if let Err(err) = clear_state(&request.project) {
        warn!(error = %format!("{err:#}"), "failed to clear state");
    }

    info!(gates_green, iterations_run, "pipeline finished");
    Ok(PipelineOutcome {
        gates_green,
        iterations_run,
        review,
    })
}

/// Validate the project and decide whether a saved session applies.
///
/// Fresh runs require a clean work tree (the state directory excepted); a
/// valid matching resume waives that check because the previous run's
/// uncommitted diffs are exactly what is being resumed.
fn check_preconditions(request: &PipelineRequest) -> Result<(Adapter, Option<PipelineState>)> {
    if !request.project.exists() {
        return Err(PreconditionError {
            message: format!("project not found: {}", request.project.display()),
        }
        .into());
    }

    let Some(adapter) = detect_adapter(&request.project) else {
        return Err(PreconditionError {
            message: "no toolchain adapter matched the project".to_string(),
        }
        .into());
    };

    let git = Git::new(&request.project);
    if !git.is_work_tree() {
        return Err(PreconditionError {
            message: "project is not a git work tree, initialize git first".to_string(),
        }
        .into());
    }

    let resumed = if request.resume {
        load_state(&request.project).filter(|state| {
            if state.task == request.task {
                true
            } else {
                warn!("saved state is for a different task, starting fresh");
                false
            }
        })
    } else {
        None
    };

    if resumed.is_none() {
        git.ensure_clean_except_prefixes(&[".redgreen/"])
            .map_err(|err| PreconditionError {
                message: format!("{err:#}"),
            })?;
    }

    Ok((adapter, resumed))
}

/// Fixed project facts plus the optional retrieval pack.
fn assemble_context(
    request: &PipelineRequest,
    config: &PipelineConfig,
    adapter: Adapter,
) -> String {
    let mut context = format!(
        "Project: {}\nAdapter: {} ({})\nRules: TDD-first; small diffs; no secrets; follow repo conventions.\n",
        request.project.display(),
        adapter.id(),
        adapter.describe(),
    );

    if let Some(query) = &request.retrieval_query {
        let pack = match retrieval::retrieve(
            &request.project,
            query,
            request.retrieval_top_k,
            &config.retrieval,
        ) {
            Ok(hits) => retrieval::render_pack(query, &hits),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "retrieval failed, using placeholder");
                format!("query: {query}\n(retrieval unavailable)")
            }
        };
        context.push('\n');
        context.push_str(&pack);
        context.push('\n');
    }
    context
}

fn invoke<A: AgentInvoker>(
    invoker: &A,
    role: AgentRole,
    task: String,
    context: &str,
) -> Result<String> {
    invoker.invoke(&AgentRequest {
        role,
        task,
        context: context.to_string(),
    })
}

fn apply_diff(request: &PipelineRequest, role: AgentRole, raw: &str) -> Result<()> {
    let outcome = patch::apply(&request.project, raw, request.dry_run)?;
    if !outcome.applied {
        return Err(ApplyError {
            role,
            message: outcome.message,
        }
        .into());
    }
    info!(%role, method = %outcome.method, "diff applied");
    Ok(())
}

/// Save state, downgrading failures: losing resumability is not fatal.
fn persist(project: &Path, state: &PipelineState) {
    if let Err(err) = save_state(project, state) {
        warn!(error = %format!("{err:#}"), "failed to save state, run is not resumable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_error_downcasts_from_anyhow() {
        let err: anyhow::Error = PreconditionError {
            message: "dirty tree".to_string(),
        }
        .into();
        assert!(err.downcast_ref::<PreconditionError>().is_some());
        assert!(err.to_string().contains("precondition failed"));
    }

    #[test]
    fn apply_error_names_the_failing_role() {
        let err = ApplyError {
            role: AgentRole::Implementer,
            message: "empty diff".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to apply implementer diff: empty diff"
        );
    }
}
