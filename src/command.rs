//! Utilities for running external commands.
//!
//! Every enforcement command the crate issues (tc, ip, brctl, lxc-*) goes
//! through the [`Shell`] trait, so tests can substitute a recording
//! implementation and assert on the exact command text.

use std::process::ExitStatus;
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("empty command provided")]
    Empty,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("`{command}` exited with {status} on {host}: {stderr}")]
    NonZero { command: String, host: String, status: ExitStatus, stdout: String, stderr: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// The name of the machine we are issuing commands on, for error context.
pub(crate) fn local_hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "localhost".to_string())
}

/// A synchronous-semantics shell primitive: run a command, wait for it,
/// return its stdout, fail on nonzero exit.
#[async_trait]
pub trait Shell: Send + Sync + std::fmt::Debug {
    async fn run(&self, cmd: &str) -> Result<String>;

    /// Like [`Shell::run`] but a nonzero exit is tolerated and logged,
    /// returning `None`. Used for best-effort commands such as disabling
    /// segmentation offload.
    async fn run_tolerant(&self, cmd: &str) -> Option<String> {
        match self.run(cmd).await {
            Ok(out) => Some(out),
            Err(e) => {
                tracing::debug!(%cmd, %e, "tolerated command failure");
                None
            }
        }
    }
}

/// Runs commands on the local machine via [`tokio::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Runner;

#[async_trait]
impl Shell for Runner {
    /// Runs the command provided as a string, separating args with
    /// whitespace (no shell interpretation).
    async fn run(&self, cmd: &str) -> Result<String> {
        let mut iter = cmd.split_ascii_whitespace();
        let program = iter.next().ok_or(Error::Empty)?;
        let mut command = tokio::process::Command::new(program);
        command.args(iter).stdout(std::process::Stdio::piped()).stderr(std::process::Stdio::piped());

        tracing::debug!(?command, "running command");

        let output = command.spawn()?.wait_with_output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            tracing::debug!(%cmd, status = ?output.status, %stderr, "command returned non-zero status");
            return Err(Error::NonZero {
                command: cmd.to_string(),
                host: local_hostname(),
                status: output.status,
                stdout,
                stderr,
            });
        }

        Ok(stdout)
    }
}

/// A [`Shell`] for tests: records every command and replies from a table of
/// canned outputs (commands without an entry succeed with empty stdout).
#[derive(Debug, Default)]
pub struct RecordingShell {
    commands: parking_lot::Mutex<Vec<String>>,
    replies: parking_lot::Mutex<Vec<(String, String)>>,
    failures: parking_lot::Mutex<Vec<String>>,
}

impl RecordingShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a canned stdout for commands starting with `prefix`.
    pub fn reply(&self, prefix: &str, stdout: &str) {
        self.replies.lock().push((prefix.to_string(), stdout.to_string()));
    }

    /// Make commands starting with `prefix` exit nonzero.
    pub fn fail(&self, prefix: &str) {
        self.failures.lock().push(prefix.to_string());
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().clear();
    }
}

#[async_trait]
impl Shell for RecordingShell {
    async fn run(&self, cmd: &str) -> Result<String> {
        self.commands.lock().push(cmd.to_string());
        if self.failures.lock().iter().any(|prefix| cmd.starts_with(prefix.as_str())) {
            use std::os::unix::process::ExitStatusExt;
            return Err(Error::NonZero {
                command: cmd.to_string(),
                host: local_hostname(),
                status: ExitStatus::from_raw(256),
                stdout: String::new(),
                stderr: "canned failure".to_string(),
            });
        }
        let replies = self.replies.lock();
        for (prefix, stdout) in replies.iter().rev() {
            if cmd.starts_with(prefix.as_str()) {
                return Ok(stdout.clone());
            }
        }
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runner_captures_stdout() {
        let out = Runner.run("echo hello world").await.unwrap();
        assert_eq!(out.trim(), "hello world");
    }

    #[tokio::test]
    async fn runner_fails_on_nonzero_exit() {
        let err = Runner.run("false").await.unwrap_err();
        match err {
            Error::NonZero { command, .. } => assert_eq!(command, "false"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn recording_shell_replays_canned_output() {
        let shell = RecordingShell::new();
        shell.reply("tc qdisc show", "qdisc pfifo_fast 0: root\n");

        let out = shell.run("tc qdisc show dev eth0").await.unwrap();
        assert!(out.contains("pfifo_fast"));
        assert_eq!(shell.commands(), vec!["tc qdisc show dev eth0"]);
    }
}
