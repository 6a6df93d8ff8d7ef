//! Agent invocation over local models.
//!
//! The [`AgentInvoker`] trait decouples the loop from the actual model
//! backend (currently `ollama run`). Tests use scripted invokers that return
//! predetermined text without spawning processes. Transient failures are
//! retried with exponential backoff; exhausting retries is fatal to the
//! invoking phase.

use std::fmt;
use std::process::Command;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::config::AgentConfig;
use crate::core::types::AgentRole;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptEngine, system_prompt};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Parameters for one agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub role: AgentRole,
    /// Role-specific task text (already rendered by the prompt templates).
    pub task: String,
    /// Shared context text (project facts, retrieval pack).
    pub context: String,
}

/// A failed agent invocation after retry exhaustion.
#[derive(Debug)]
pub struct AgentError {
    pub role: AgentRole,
    pub message: String,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent {} failed: {}", self.role, self.message)
    }
}

impl std::error::Error for AgentError {}

/// Abstraction over generative agent backends.
pub trait AgentInvoker {
    /// Run the agent and return its raw text output.
    fn invoke(&self, request: &AgentRequest) -> Result<String>;
}

/// Invoker that spawns `ollama run <model>` with the prompt on stdin.
pub struct OllamaInvoker {
    config: AgentConfig,
    engine: PromptEngine,
}

impl OllamaInvoker {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            engine: PromptEngine::new(),
        }
    }

    fn run_once(&self, prompt: &str) -> Result<String, String> {
        let mut cmd = Command::new("ollama");
        cmd.arg("run").arg(&self.config.model);

        let out = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            Duration::from_secs(self.config.timeout_secs),
            self.config.output_limit_bytes,
        )
        .map_err(|err| format!("{err:#}"))?;

        if out.timed_out {
            return Err(format!("timed out after {}s", self.config.timeout_secs));
        }
        if !out.success() {
            return Err(format!(
                "exited with {:?}: {}",
                out.code,
                out.error_text()
            ));
        }
        Ok(out.stdout)
    }
}

impl AgentInvoker for OllamaInvoker {
    #[instrument(skip_all, fields(role = %request.role, model = %self.config.model))]
    fn invoke(&self, request: &AgentRequest) -> Result<String> {
        let prompt = self
            .engine
            .envelope(system_prompt(request.role), &request.context, &request.task)
            .context("compose agent prompt")?;

        let mut delay = Duration::from_secs(self.config.retry_delay_secs);
        let mut last_error = String::new();

        for attempt in 1..=self.config.retries {
            debug!(attempt, retries = self.config.retries, "invoking agent");
            match self.run_once(&prompt) {
                Ok(out) => {
                    info!(attempt, bytes = out.len(), "agent responded");
                    return Ok(out);
                }
                Err(err) => {
                    warn!(attempt, error = %err, "agent attempt failed");
                    last_error = err;
                }
            }
            if attempt < self.config.retries {
                info!(delay_secs = delay.as_secs(), "retrying after backoff");
                thread::sleep(delay);
                delay = (delay * 2).min(MAX_RETRY_DELAY);
            }
        }

        Err(AgentError {
            role: request.role,
            message: format!(
                "all {} attempts failed, last error: {last_error}",
                self.config.retries
            ),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_error_downcasts_from_anyhow() {
        let err: anyhow::Error = AgentError {
            role: AgentRole::Planner,
            message: "boom".to_string(),
        }
        .into();
        let agent = err.downcast_ref::<AgentError>().expect("downcast");
        assert_eq!(agent.role, AgentRole::Planner);
        assert!(err.to_string().contains("agent planner failed"));
    }
}
