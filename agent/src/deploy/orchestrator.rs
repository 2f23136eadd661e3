//! Deployment processing passes
//!
//! A pass selects processable deployments and, one at a time, integrates the
//! branches named in their trigger text into the staging branch. Progress is
//! written back after every branch. Per-branch failures are recorded and never
//! stop the pass; anything else is recorded on the deployment, which still
//! ends up `processed`.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::deploy::fsm::{transition, StatusEvent};
use crate::deploy::lease::{JobLease, SingleFlight};
use crate::deploy::version::calculate_next_tag;
use crate::errors::BotError;
use crate::extract::extractor::BranchExtractor;
use crate::git::engine::GitOps;
use crate::git::workspace::Workspace;
use crate::models::deployment::{Deployment, DeploymentPatch};
use crate::storage::deployments::DeploymentStore;

pub const LOG_MERGED: &str = "merged";
pub const LOG_NO_CHANGES: &str = "no changes";
pub const LOG_CONFLICT: &str = "conflict skipped";
pub const LOG_BLACKLISTED: &str = "blacklisted";
pub const LOG_ALREADY_MERGED: &str = "already merged";
pub const LOG_NOT_FOUND: &str = "skipped: branch not found on remote";

/// Branch layout of the integrated repository
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub remote: String,
    pub staging_branch: String,
    pub production_branch: String,
    /// Suffix of the staging variant of a feature branch
    pub preprod_suffix: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            staging_branch: "preprod".to_string(),
            production_branch: "prod".to_string(),
            preprod_suffix: "-preprod".to_string(),
        }
    }
}

/// Summary of one pass
#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Deployments that reached `processed`
    pub processed: Vec<String>,
    /// Deployments whose state could not be saved
    pub failed: Vec<String>,
}

pub struct Orchestrator {
    store: Arc<DeploymentStore>,
    extractor: Arc<BranchExtractor>,
    git: Arc<dyn GitOps>,
    workspace: Arc<dyn Workspace>,
    lease: SingleFlight,
    options: PipelineOptions,
}

impl Orchestrator {
    pub fn new(
        store: Arc<DeploymentStore>,
        extractor: Arc<BranchExtractor>,
        git: Arc<dyn GitOps>,
        workspace: Arc<dyn Workspace>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            store,
            extractor,
            git,
            workspace,
            lease: SingleFlight::new(),
            options,
        }
    }

    /// Share a lease with other holders instead of owning a fresh one
    pub fn with_lease(mut self, lease: SingleFlight) -> Self {
        self.lease = lease;
        self
    }

    pub fn is_in_flight(&self) -> bool {
        self.lease.is_in_flight()
    }

    /// Take the processing lease; `None` while a pass runs
    pub fn try_lease(&self) -> Option<JobLease> {
        self.lease.try_acquire()
    }

    /// Run a pass unless one is already in flight
    pub async fn process_pending(&self) -> Result<Option<PassReport>, BotError> {
        let Some(lease) = self.try_lease() else {
            debug!("Deployment processing already in flight, skipping");
            return Ok(None);
        };
        self.run_pass(lease).await.map(Some)
    }

    /// Run a pass under an already acquired lease
    pub async fn run_pass(&self, _lease: JobLease) -> Result<PassReport, BotError> {
        let deployments = self.store.select_processable().await?;
        let mut report = PassReport::default();
        if deployments.is_empty() {
            debug!("No deployments to process");
            return Ok(report);
        }

        info!(count = deployments.len(), "Processing deployments");
        let repo = self.workspace.prepare().await;
        if let Err(e) = &repo {
            error!("Preparing the working copy failed: {}", e);
        }

        for deployment in deployments {
            let id = deployment.id.clone();
            match self.process_deployment(repo.as_deref(), deployment).await {
                Ok(()) => report.processed.push(id),
                Err(e) => {
                    error!(deployment_id = %id, "Saving deployment state failed: {}", e);
                    report.failed.push(id);
                }
            }
        }

        info!(
            processed = report.processed.len(),
            failed = report.failed.len(),
            "Processing pass finished"
        );
        Ok(report)
    }

    async fn process_deployment(
        &self,
        repo: Result<&Path, &BotError>,
        mut deployment: Deployment,
    ) -> Result<(), BotError> {
        let id = deployment.id.clone();
        let release = deployment.awaits_release();
        info!(deployment_id = %id, release, "Processing deployment");

        deployment.status = transition(deployment.status, StatusEvent::Start)?;
        deployment.processing_branch_errors.clear();
        deployment.processing_errors.clear();

        let mut start = DeploymentPatch::new(&id);
        start.status = Some(deployment.status);
        start.processing_branch_errors = Some(Vec::new());
        start.processing_errors = Some(Vec::new());
        self.store.patch(start).await?;

        let outcome = match repo {
            Ok(repo) => self.integrate(repo, &mut deployment, release).await,
            Err(e) => Err(BotError::GitError(format!("working copy unavailable: {}", e))),
        };
        if let Err(e) = outcome {
            error!(deployment_id = %id, "Deployment processing failed: {}", e);
            deployment.processing_errors.push(e.to_string());
        }

        deployment.status = transition(deployment.status, StatusEvent::Finish)?;
        let mut finish = DeploymentPatch::progress(&deployment);
        finish.status = Some(deployment.status);
        finish.deployed = Some(deployment.deployed);
        finish.next_tag = Some(deployment.next_tag.clone());
        self.store.patch(finish).await?;

        info!(
            deployment_id = %id,
            processed_branches = ?deployment.processed_branches,
            next_tag = ?deployment.next_tag,
            deployed = deployment.deployed,
            "Deployment processed"
        );
        Ok(())
    }

    async fn integrate(
        &self,
        repo: &Path,
        deployment: &mut Deployment,
        release: bool,
    ) -> Result<(), BotError> {
        let branches = self.extractor.extract(&deployment.content).await;
        if branches.is_empty() && !release {
            info!(deployment_id = %deployment.id, "No branches found, nothing to integrate");
            return Ok(());
        }
        debug!(deployment_id = %deployment.id, branches = ?branches, "Branches to integrate");

        self.reset_to_staging(repo).await?;

        let mut has_changes = false;
        for branch in &branches {
            if self.integrate_branch(repo, deployment, branch).await {
                has_changes = true;
            }
            self.store.patch(DeploymentPatch::progress(deployment)).await?;
        }

        if release {
            self.release(repo, deployment).await;
        } else if has_changes {
            let prod_ref = format!("{}/{}", self.options.remote, self.options.production_branch);
            let staging_ref = format!("{}/{}", self.options.remote, self.options.staging_branch);
            let prod_tag = self.git.latest_tag(repo, &prod_ref).await;
            let staging_tag = self.git.latest_tag(repo, &staging_ref).await;

            let next = calculate_next_tag(prod_tag.as_deref(), staging_tag.as_deref());
            info!(
                deployment_id = %deployment.id,
                prod_tag = ?prod_tag,
                staging_tag = ?staging_tag,
                next_tag = %next,
                "Next tag computed"
            );
            deployment.next_tag = Some(next);
        }
        Ok(())
    }

    async fn reset_to_staging(&self, repo: &Path) -> Result<(), BotError> {
        let staging = &self.options.staging_branch;

        let fetched = self.git.fetch(repo).await;
        if !fetched.success {
            return Err(BotError::GitError(format!("fetch failed: {}", fetched.message())));
        }

        let checkout = self.git.checkout(repo, staging).await;
        if !checkout.success {
            return Err(BotError::GitError(format!(
                "checkout of {} failed: {}",
                staging,
                checkout.message()
            )));
        }

        let remote_ref = format!("{}/{}", self.options.remote, staging);
        let reset = self.git.reset_hard(repo, &remote_ref).await;
        if !reset.success {
            return Err(BotError::GitError(format!(
                "reset to {} failed: {}",
                remote_ref,
                reset.message()
            )));
        }
        Ok(())
    }

    /// Integrate one branch; true when it brought new commits
    async fn integrate_branch(&self, repo: &Path, deployment: &mut Deployment, branch: &str) -> bool {
        if deployment.is_blacklisted(branch) {
            info!(deployment_id = %deployment.id, branch, "Branch blacklisted, skipping");
            deployment.record_log(branch, LOG_BLACKLISTED);
            return false;
        }

        let cleaned = self.git.reset_hard(repo, "HEAD").await;
        if !cleaned.success {
            warn!(branch, "Reset before merge failed: {}", cleaned.message());
        }

        let variant = format!("{}{}", branch, self.options.preprod_suffix);
        if self.git.is_branch_merged(repo, branch).await
            || self.git.is_branch_merged(repo, &variant).await
        {
            info!(deployment_id = %deployment.id, branch, "Branch already merged");
            deployment.record_log(branch, LOG_ALREADY_MERGED);
            return false;
        }

        let target = if self.git.branch_exists(repo, &variant).await {
            variant
        } else if self.git.branch_exists(repo, branch).await {
            branch.to_string()
        } else {
            warn!(deployment_id = %deployment.id, branch, "Branch not found on remote");
            deployment.record_log(branch, LOG_NOT_FOUND);
            return false;
        };

        info!(deployment_id = %deployment.id, branch = %target, "Pulling branch");
        let result = self.git.pull(repo, &target).await;

        if result.success {
            deployment.mark_processed(&target);
            if result.is_up_to_date() {
                deployment.record_log(branch, LOG_NO_CHANGES);
                false
            } else {
                deployment.record_log(branch, LOG_MERGED);
                true
            }
        } else if result.is_conflict() {
            warn!(deployment_id = %deployment.id, branch = %target, "Merge conflict, branch skipped");
            deployment.record_log(branch, LOG_CONFLICT);
            false
        } else {
            error!(deployment_id = %deployment.id, branch = %target, "Pull failed: {}", result.message());
            deployment.record_branch_error(branch, format!("pull of {} failed", target), result.message());
            false
        }
    }

    /// Create the approved tag and push it with the staging branch
    async fn release(&self, repo: &Path, deployment: &mut Deployment) {
        let Some(tag) = deployment.next_tag.clone() else {
            return;
        };

        let created = self.git.create_tag(repo, &tag).await;
        if !created.success {
            error!(deployment_id = %deployment.id, tag = %tag, "Tag creation failed: {}", created.message());
            deployment
                .processing_errors
                .push(format!("creating tag {} failed: {}", tag, created.message()));
            return;
        }

        let pushed = self
            .git
            .push_branch_and_tag(repo, &self.options.staging_branch, &tag)
            .await;
        if !pushed.success {
            error!(deployment_id = %deployment.id, tag = %tag, "Push failed: {}", pushed.message());
            deployment
                .processing_errors
                .push(format!("pushing tag {} failed: {}", tag, pushed.message()));
            return;
        }

        info!(deployment_id = %deployment.id, tag = %tag, "Tag pushed");
        deployment.deployed = true;
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("options", &self.options)
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

