//! Agent-driven red/green loop for local models.
//!
//! Points a planner/test-writer/diagnoser/implementer agent crew at a target
//! repository: tests are written first, quality gates decide red or green,
//! and the loop iterates fixes until green or the budget runs out.

use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;

use redgreen::config::load_config;
use redgreen::exit_codes;
use redgreen::io::agent::{AgentError, OllamaInvoker};
use redgreen::io::gates::ProcessGateRunner;
use redgreen::logging;
use redgreen::pipeline::{
    ApplyError, PipelineOutcome, PipelineRequest, PreconditionError, run_pipeline,
};

#[derive(Parser)]
#[command(
    name = "redgreen",
    version,
    about = "Test-first agent loop against a target repository"
)]
struct Cli {
    /// Path to the target repository.
    #[arg(long)]
    project: PathBuf,

    /// Feature or task request, passed verbatim to the agents.
    #[arg(long)]
    task: String,

    /// Gate/fix iteration budget.
    #[arg(long, default_value_t = 4)]
    max_iters: u32,

    /// Optional retrieval query to inject project context into prompts.
    #[arg(long)]
    rag: Option<String>,

    /// Number of retrieval chunks to inject.
    #[arg(long, default_value_t = 6)]
    rag_k: usize,

    /// Resume from saved state if it matches the task.
    #[arg(long)]
    resume: bool,

    /// Validate generated diffs without applying them.
    #[arg(long)]
    dry_run: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match run(&cli) {
        Ok(outcome) => {
            report(&outcome);
            process::exit(exit_codes::OK);
        }
        Err(err) => {
            eprintln!("{err:#}");
            process::exit(exit_code_for(&err));
        }
    }
}

fn run(cli: &Cli) -> Result<PipelineOutcome> {
    let config = load_config(&cli.project)?;
    let invoker = OllamaInvoker::new(config.agent.clone());
    let gates = ProcessGateRunner {
        timeout: config.gate_timeout(),
        output_limit_bytes: config.gate.output_limit_bytes,
    };

    let request = PipelineRequest {
        project: cli.project.clone(),
        task: cli.task.clone(),
        max_iterations: cli.max_iters,
        retrieval_query: cli.rag.as_deref().map(str::trim).and_then(|q| {
            if q.is_empty() {
                None
            } else {
                Some(q.to_string())
            }
        }),
        retrieval_top_k: cli.rag_k,
        resume: cli.resume,
        dry_run: cli.dry_run,
    };

    run_pipeline(&request, &config, &invoker, &gates)
}

fn report(outcome: &PipelineOutcome) {
    if outcome.gates_green {
        println!(
            "All gates passed after {} iteration(s).",
            outcome.iterations_run
        );
    } else {
        println!("Iteration budget exhausted without green gates.");
    }
    if !outcome.review.trim().is_empty() {
        println!("\n== Review ==\n{}", outcome.review.trim());
    }
}

/// Map typed failures to stable exit codes; anything else is a generic failure.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<PreconditionError>().is_some() {
        exit_codes::PRECONDITION
    } else if err.downcast_ref::<ApplyError>().is_some() {
        exit_codes::APPLY
    } else if err.downcast_ref::<AgentError>().is_some() {
        exit_codes::AGENT
    } else {
        exit_codes::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redgreen::core::types::AgentRole;

    #[test]
    fn parse_minimal_invocation() {
        let cli = Cli::parse_from(["redgreen", "--project", "/tmp/p", "--task", "add subtract"]);
        assert_eq!(cli.max_iters, 4);
        assert_eq!(cli.rag_k, 6);
        assert!(!cli.resume);
        assert!(!cli.dry_run);
    }

    #[test]
    fn parse_full_invocation() {
        let cli = Cli::parse_from([
            "redgreen",
            "--project",
            "/tmp/p",
            "--task",
            "add subtract",
            "--max-iters",
            "2",
            "--rag",
            "calculator",
            "--rag-k",
            "3",
            "--resume",
            "--dry-run",
            "--verbose",
        ]);
        assert_eq!(cli.max_iters, 2);
        assert_eq!(cli.rag.as_deref(), Some("calculator"));
        assert_eq!(cli.rag_k, 3);
        assert!(cli.resume && cli.dry_run && cli.verbose);
    }

    #[test]
    fn exit_codes_map_typed_errors() {
        let pre: anyhow::Error = PreconditionError {
            message: "x".to_string(),
        }
        .into();
        let apply: anyhow::Error = ApplyError {
            role: AgentRole::TestWriter,
            message: "x".to_string(),
        }
        .into();
        let agent: anyhow::Error = AgentError {
            role: AgentRole::Planner,
            message: "x".to_string(),
        }
        .into();
        assert_eq!(exit_code_for(&pre), exit_codes::PRECONDITION);
        assert_eq!(exit_code_for(&apply), exit_codes::APPLY);
        assert_eq!(exit_code_for(&agent), exit_codes::AGENT);
        assert_eq!(exit_code_for(&anyhow::anyhow!("other")), exit_codes::FAILURE);
    }
}
