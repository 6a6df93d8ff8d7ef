//! Pipeline configuration loaded from an optional `.redgreen.toml`.
//!
//! All tunables live in one explicit struct constructed at process entry and
//! passed into each component; nothing reads environment variables at use
//! sites. Missing file or missing fields fall back to defaults.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Top-level configuration (TOML).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PipelineConfig {
    pub agent: AgentConfig,
    pub gate: GateConfig,
    pub retrieval: RetrievalConfig,
}

/// Agent invocation tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Model passed to `ollama run`.
    pub model: String,
    /// Maximum time to wait for one agent invocation.
    pub timeout_secs: u64,
    /// Total attempts per invocation (first try included).
    pub retries: u32,
    /// Initial delay between attempts; doubles per retry, capped at 60s.
    pub retry_delay_secs: u64,
    /// Truncate agent output beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-coder:7b".to_string(),
            timeout_secs: 300,
            retries: 2,
            retry_delay_secs: 5,
            output_limit_bytes: 200_000,
        }
    }
}

/// Gate execution tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GateConfig {
    /// Per-command timeout.
    pub timeout_secs: u64,
    /// Truncate gate stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

/// Lexical retrieval tunables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Stop scanning after this many files (0 = no limit).
    pub max_files: usize,
    /// Stop scoring after this many chunks (0 = no limit).
    pub max_chunks: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_files: 400,
            max_chunks: 1_200,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            gate: GateConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.model.trim().is_empty() {
            return Err(anyhow!("agent.model must be non-empty"));
        }
        if self.agent.timeout_secs == 0 {
            return Err(anyhow!("agent.timeout_secs must be > 0"));
        }
        if self.agent.retries == 0 {
            return Err(anyhow!("agent.retries must be > 0"));
        }
        if self.gate.timeout_secs == 0 {
            return Err(anyhow!("gate.timeout_secs must be > 0"));
        }
        if self.agent.output_limit_bytes == 0 || self.gate.output_limit_bytes == 0 {
            return Err(anyhow!("output limits must be > 0"));
        }
        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.timeout_secs)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.gate.timeout_secs)
    }
}

/// Load config from `<project>/.redgreen.toml`, defaulting when absent.
pub fn load_config(project: &Path) -> Result<PipelineConfig> {
    let path = project.join(".redgreen.toml");
    if !path.exists() {
        let cfg = PipelineConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg: PipelineConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
