//! Git operations over a working copy
//!
//! Every operation returns a [`GitOperationResult`]. Expected failures (non-zero
//! exit, merge conflict, a command that could not run) are values, not errors.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::git::runner::{CommandOutput, CommandRunner};

/// Error prefix distinguishing a merge conflict from other pull failures
pub const CONFLICT_MARKER: &str = "CONFLICT";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GitOperationResult {
    pub success: bool,
    pub output: String,
    pub error: String,
}

impl GitOperationResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
        }
    }

    pub fn failed(output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
            error: error.into(),
        }
    }

    pub fn conflict(output: impl Into<String>) -> Self {
        Self::failed(
            output,
            format!("{CONFLICT_MARKER}: merge conflict detected, merge aborted and working tree reset"),
        )
    }

    pub fn is_conflict(&self) -> bool {
        !self.success && self.error.starts_with(CONFLICT_MARKER)
    }

    /// A successful pull that brought nothing new
    pub fn is_up_to_date(&self) -> bool {
        self.success
            && (self.output.contains("Already up to date")
                || self.output.contains("Already up-to-date"))
    }

    /// Best human-readable description of a failure
    pub fn message(&self) -> &str {
        if self.error.trim().is_empty() {
            self.output.trim()
        } else {
            self.error.trim()
        }
    }
}

impl From<CommandOutput> for GitOperationResult {
    fn from(out: CommandOutput) -> Self {
        Self {
            success: out.success,
            output: out.stdout,
            error: out.stderr,
        }
    }
}

/// Repository operations used by the orchestrator
#[async_trait]
pub trait GitOps: Send + Sync {
    /// Switch branches; on failure hard-reset to `HEAD` and retry once
    async fn checkout(&self, repo: &Path, branch: &str) -> GitOperationResult;

    async fn reset_hard(&self, repo: &Path, reference: &str) -> GitOperationResult;

    async fn fetch(&self, repo: &Path) -> GitOperationResult;

    /// Fetch and merge `branch` into the current branch. A conflict is aborted,
    /// the tree restored, and reported via [`GitOperationResult::is_conflict`].
    async fn pull(&self, repo: &Path, branch: &str) -> GitOperationResult;

    async fn is_branch_merged(&self, repo: &Path, branch: &str) -> bool;

    /// Local or remote-tracking branch named exactly `name`
    async fn branch_exists(&self, repo: &Path, name: &str) -> bool;

    /// Most recently created tag reachable from `reference`
    async fn latest_tag(&self, repo: &Path, reference: &str) -> Option<String>;

    async fn create_tag(&self, repo: &Path, tag: &str) -> GitOperationResult;

    async fn push_branch_and_tag(&self, repo: &Path, branch: &str, tag: &str) -> GitOperationResult;
}

/// [`GitOps`] implemented by running git commands
pub struct GitEngine {
    runner: Arc<dyn CommandRunner>,
    remote: String,
}

impl GitEngine {
    pub fn new(runner: Arc<dyn CommandRunner>, remote: impl Into<String>) -> Self {
        Self {
            runner,
            remote: remote.into(),
        }
    }

    pub fn remote(&self) -> &str {
        &self.remote
    }

    async fn exec(&self, repo: &Path, args: &[&str]) -> GitOperationResult {
        match self.runner.run(repo, args).await {
            Ok(out) => {
                let result = GitOperationResult::from(out);
                if !result.success {
                    debug!("git {} failed: {}", args.join(" "), result.message());
                }
                result
            }
            Err(e) => {
                warn!("git {} could not run: {}", args.join(" "), e);
                GitOperationResult::failed("", e.to_string())
            }
        }
    }

    async fn branch_list(&self, repo: &Path, args: &[&str]) -> Option<Vec<String>> {
        let result = self.exec(repo, args).await;
        if !result.success {
            return None;
        }
        Some(parse_branch_list(&result.output, &self.remote))
    }

    async fn has_unmerged_paths(&self, repo: &Path) -> bool {
        let result = self
            .exec(repo, &["diff", "--name-only", "--diff-filter=U"])
            .await;
        result.success && !result.output.trim().is_empty()
    }
}

#[async_trait]
impl GitOps for GitEngine {
    async fn checkout(&self, repo: &Path, branch: &str) -> GitOperationResult {
        let result = self.exec(repo, &["checkout", branch]).await;
        if result.success {
            return result;
        }

        warn!(branch, "checkout failed, resetting and retrying: {}", result.message());
        self.exec(repo, &["reset", "--hard", "HEAD"]).await;
        self.exec(repo, &["checkout", branch]).await
    }

    async fn reset_hard(&self, repo: &Path, reference: &str) -> GitOperationResult {
        self.exec(repo, &["reset", "--hard", reference]).await
    }

    async fn fetch(&self, repo: &Path) -> GitOperationResult {
        self.exec(repo, &["fetch", "--prune", "--tags", &self.remote])
            .await
    }

    async fn pull(&self, repo: &Path, branch: &str) -> GitOperationResult {
        let fetched = self.exec(repo, &["fetch", &self.remote, branch]).await;
        if !fetched.success {
            return fetched;
        }

        let head = self.exec(repo, &["rev-parse", "HEAD"]).await;
        let restore_point = if head.success {
            head.output.trim().to_string()
        } else {
            "HEAD".to_string()
        };

        let result = self
            .exec(repo, &["pull", "--no-rebase", "--ff", &self.remote, branch])
            .await;
        if result.success {
            return result;
        }

        let conflicted = result.output.contains(CONFLICT_MARKER)
            || result.error.contains(CONFLICT_MARKER)
            || self.has_unmerged_paths(repo).await;
        if !conflicted {
            return result;
        }

        info!(branch, "merge conflict, aborting merge");
        let aborted = self.exec(repo, &["merge", "--abort"]).await;
        if !aborted.success {
            warn!(branch, "merge --abort failed: {}", aborted.message());
        }
        let reset = self.exec(repo, &["reset", "--hard", &restore_point]).await;
        if !reset.success {
            warn!(branch, "reset after conflict failed: {}", reset.message());
        }

        GitOperationResult::conflict(result.output)
    }

    async fn is_branch_merged(&self, repo: &Path, branch: &str) -> bool {
        self.branch_list(repo, &["branch", "--all", "--merged", "HEAD"])
            .await
            .is_some_and(|names| names.iter().any(|name| name == branch))
    }

    async fn branch_exists(&self, repo: &Path, name: &str) -> bool {
        self.branch_list(repo, &["branch", "--all"])
            .await
            .is_some_and(|names| names.iter().any(|n| n == name))
    }

    async fn latest_tag(&self, repo: &Path, reference: &str) -> Option<String> {
        let result = self
            .exec(repo, &["tag", "--merged", reference, "--sort=-creatordate"])
            .await;
        if !result.success {
            return None;
        }
        result
            .output
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }

    async fn create_tag(&self, repo: &Path, tag: &str) -> GitOperationResult {
        self.exec(repo, &["tag", tag]).await
    }

    async fn push_branch_and_tag(&self, repo: &Path, branch: &str, tag: &str) -> GitOperationResult {
        self.exec(repo, &["push", &self.remote, branch, tag]).await
    }
}

/// Branch names from `git branch --all` output, remote prefixes stripped
pub fn parse_branch_list(output: &str, remote: &str) -> Vec<String> {
    let remote_prefix = format!("remotes/{remote}/");
    let mut names: Vec<String> = Vec::new();

    for line in output.lines() {
        let line = line
            .trim()
            .trim_start_matches("* ")
            .trim_start_matches("+ ")
            .trim();
        if line.is_empty() || line.starts_with('(') {
            continue;
        }
        let line = line.split(" -> ").next().unwrap_or(line);
        let name = line.strip_prefix(&remote_prefix).unwrap_or(line);
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
