//! Quality gate execution.
//!
//! Gates are the adapter-supplied verification commands (tests, lint, build)
//! run in the target project's working directory. Execution short-circuits at
//! the first failure so cheap gates can guard expensive ones, and a timeout
//! becomes a synthetic failure rather than a fault.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, instrument, warn};

use crate::core::types::{GateCommand, GateRunResult};
use crate::io::process::run_command_with_timeout;

/// Abstraction over gate execution backends.
///
/// Tests use scripted runners that return predetermined results without
/// spawning processes.
pub trait GateRunner {
    fn run(&self, workdir: &Path, commands: &[GateCommand]) -> Result<GateRunResult>;
}

/// Gate runner that spawns each command as a child process.
#[derive(Debug, Clone)]
pub struct ProcessGateRunner {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl GateRunner for ProcessGateRunner {
    #[instrument(skip_all, fields(commands = commands.len()))]
    fn run(&self, workdir: &Path, commands: &[GateCommand]) -> Result<GateRunResult> {
        let mut transcript = String::new();

        for gate in commands {
            debug!(command = %gate.render(), "running gate");
            let Some((program, args)) = gate.0.split_first() else {
                warn!("skipping empty gate command");
                continue;
            };

            let mut cmd = Command::new(program);
            cmd.args(args).current_dir(workdir);

            let out = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)?;

            transcript.push_str(&format!("$ {}\n", gate.render()));
            transcript.push_str(&out.stdout);
            transcript.push('\n');
            transcript.push_str(&out.stderr);
            transcript.push('\n');

            if out.timed_out {
                warn!(command = %gate.render(), "gate timed out");
                transcript.push_str(&format!(
                    "[gate timed out after {}s]\n",
                    self.timeout.as_secs()
                ));
                return Ok(GateRunResult {
                    ok: false,
                    transcript,
                });
            }
            if !out.success() {
                warn!(command = %gate.render(), code = ?out.code, "gate failed");
                return Ok(GateRunResult {
                    ok: false,
                    transcript,
                });
            }
        }

        Ok(GateRunResult {
            ok: true,
            transcript,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> ProcessGateRunner {
        ProcessGateRunner {
            timeout: Duration::from_secs(5),
            output_limit_bytes: 100_000,
        }
    }

    fn sh(script: &str) -> GateCommand {
        GateCommand::new(["sh", "-c", script])
    }

    #[test]
    fn all_passing_gates_report_ok_with_full_transcript() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = runner()
            .run(temp.path(), &[sh("echo first"), sh("echo second")])
            .expect("run");
        assert!(result.ok);
        assert!(result.transcript.contains("first"));
        assert!(result.transcript.contains("second"));
        let first_pos = result.transcript.find("first").expect("first");
        let second_pos = result.transcript.find("second").expect("second");
        assert!(first_pos < second_pos, "transcript must preserve order");
    }

    #[test]
    fn short_circuits_at_first_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = runner()
            .run(
                temp.path(),
                &[
                    sh("echo passes"),
                    sh("echo broken >&2; exit 1"),
                    sh("echo never-run-marker"),
                ],
            )
            .expect("run");
        assert!(!result.ok);
        assert!(result.transcript.contains("passes"));
        assert!(result.transcript.contains("broken"));
        assert!(!result.transcript.contains("never-run-marker"));
    }

    #[test]
    fn timeout_becomes_synthetic_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tight = ProcessGateRunner {
            timeout: Duration::from_millis(100),
            output_limit_bytes: 100_000,
        };
        let result = tight
            .run(temp.path(), &[sh("sleep 5"), sh("echo never-run-marker")])
            .expect("run");
        assert!(!result.ok);
        assert!(result.transcript.contains("timed out"));
        assert!(!result.transcript.contains("never-run-marker"));
    }

    #[test]
    fn rerunning_unchanged_gates_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        let gates = [sh("echo stable"), sh("test -f missing-file")];
        let first = runner().run(temp.path(), &gates).expect("run");
        let second = runner().run(temp.path(), &gates).expect("run");
        assert_eq!(first.ok, second.ok);
        assert_eq!(first.transcript, second.transcript);
    }
}
