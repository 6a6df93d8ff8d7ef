//! Child process execution with timeouts and bounded output capture.
//!
//! Every external invocation in the pipeline (gate command, agent run, git
//! apply) goes through here: blocking, bounded by an explicit timeout, and a
//! timeout becomes data (`timed_out`) rather than a fault.

use std::io::{Read, Write};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    /// Exit code; `None` when the process was killed (timeout or signal).
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.code == Some(0)
    }

    /// First non-empty stream, trimmed, for one-line error reporting.
    pub fn error_text(&self) -> String {
        let err = self.stderr.trim();
        if err.is_empty() {
            self.stdout.trim().to_string()
        } else {
            err.to_string()
        }
    }
}

/// Run a command with a timeout, capturing stdout/stderr without risking pipe
/// deadlocks.
///
/// Output is drained concurrently while the child runs; at most
/// `output_limit_bytes` per stream are retained. On timeout the child is
/// killed and the result carries `timed_out = true` with whatever output was
/// captured so far.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs()))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        child_stdin.write_all(input).context("write stdin")?;
        // Dropping the handle closes the pipe so the child sees EOF.
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let stdout = join_reader(stdout_handle).context("join stdout reader")?;
    let stderr = join_reader(stderr_handle).context("join stderr reader")?;

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        code: status.code(),
        stdout,
        stderr,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<String>>) -> Result<String> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<String> {
    let mut buf = Vec::new();
    let mut dropped = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            dropped += n - keep;
        } else {
            // Keep draining so the child never blocks on a full pipe.
            dropped += n;
        }
    }

    let mut out = String::from_utf8_lossy(&buf).into_owned();
    if dropped > 0 {
        warn!(dropped, "output truncated");
        out.push_str(&format!("\n[truncated {dropped} bytes]\n"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = run_command_with_timeout(sh("echo hello"), None, Duration::from_secs(5), 10_000)
            .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[test]
    fn reports_nonzero_exit() {
        let out =
            run_command_with_timeout(sh("echo oops >&2; exit 3"), None, Duration::from_secs(5), 10_000)
                .expect("run");
        assert!(!out.success());
        assert_eq!(out.code, Some(3));
        assert_eq!(out.error_text(), "oops");
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_command_with_timeout(sh("sleep 5"), None, Duration::from_millis(100), 10_000)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn feeds_stdin() {
        let out = run_command_with_timeout(
            sh("cat"),
            Some(b"piped input"),
            Duration::from_secs(5),
            10_000,
        )
        .expect("run");
        assert_eq!(out.stdout, "piped input");
    }

    #[test]
    fn truncates_output_beyond_limit() {
        let out = run_command_with_timeout(
            sh("yes trunc | head -c 100000"),
            None,
            Duration::from_secs(5),
            1_000,
        )
        .expect("run");
        assert!(out.stdout.contains("[truncated"));
    }
}
