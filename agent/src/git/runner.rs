//! Process execution for git commands

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::BotError;

/// Captured result of one process run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

/// Runs a program with arguments inside a working directory.
///
/// `Err` means the process could not be run at all (spawn failure, timeout);
/// a non-zero exit is an `Ok` output with `success == false`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, BotError>;
}

/// Runs the `git` executable non-interactively, bounded by a timeout
#[derive(Debug, Clone)]
pub struct GitCommandRunner {
    program: String,
    timeout: Duration,
}

impl GitCommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Build the command for `args`; output is forced to the C locale so
    /// git's status messages can be matched
    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut command = Command::new(&self.program);
        command
            .current_dir(dir)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandRunner for GitCommandRunner {
    async fn run(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, BotError> {
        debug!(dir = %dir.display(), "git {}", args.join(" "));

        let mut command = self.command(dir, args);

        // the child is killed when the timed-out future is dropped
        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(result) => result.map_err(|e| {
                BotError::GitError(format!("Failed to run {}: {}", self.program, e))
            })?,
            Err(_) => {
                warn!("git {} timed out after {:?}", args.join(" "), self.timeout);
                return Err(BotError::GitError(format!(
                    "git {} timed out after {}s",
                    args.first().copied().unwrap_or_default(),
                    self.timeout.as_secs()
                )));
            }
        };

        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
