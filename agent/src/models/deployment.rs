//! Deployment models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::DeploymentStatus;

/// Store collection holding deployments
pub const DEPLOYMENTS_COLLECTION: &str = "deployments";

/// A deployment request detected in a chat channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    /// Source message id, or a generated id for manual requests
    #[serde(default)]
    pub id: String,

    /// Raw trigger text
    #[serde(default)]
    pub content: String,

    /// Display name of the sender
    #[serde(default)]
    pub from: Option<String>,

    /// Channel the trigger was read from
    #[serde(default)]
    pub channel_id: Option<String>,

    #[serde(default)]
    pub status: DeploymentStatus,

    /// `None` until a human decides
    #[serde(default)]
    pub approved: Option<bool>,

    /// True once the tag was pushed
    #[serde(default)]
    pub deployed: bool,

    /// Branch-name substrings never integrated
    #[serde(default)]
    pub blacklisted_branches: Vec<String>,

    #[serde(default)]
    pub processed_branches: Vec<String>,

    #[serde(default)]
    pub processing_logs: Vec<ProcessingLog>,

    #[serde(default)]
    pub processing_branch_errors: Vec<BranchError>,

    /// Errors raised outside the per-branch loop
    #[serde(default)]
    pub processing_errors: Vec<String>,

    #[serde(default)]
    pub next_tag: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Per-branch outcome of the latest pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingLog {
    pub branch: String,
    pub message: String,
}

/// Per-branch failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchError {
    pub branch: String,
    pub message: String,
    #[serde(default)]
    pub cause: String,
}

impl Deployment {
    /// New pending deployment
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            content: content.into(),
            from: None,
            channel_id: None,
            status: DeploymentStatus::Pending,
            approved: None,
            deployed: false,
            blacklisted_branches: Vec::new(),
            processed_branches: Vec::new(),
            processing_logs: Vec::new(),
            processing_branch_errors: Vec::new(),
            processing_errors: Vec::new(),
            next_tag: None,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Approved, tagged, not yet pushed
    pub fn awaits_release(&self) -> bool {
        self.approved == Some(true) && self.next_tag.is_some() && !self.deployed
    }

    /// Whether a processing pass should pick this deployment up
    pub fn is_processable(&self) -> bool {
        match self.status {
            DeploymentStatus::Canceled => false,
            DeploymentStatus::Processed => self.awaits_release(),
            DeploymentStatus::Pending | DeploymentStatus::Processing => true,
        }
    }

    /// Whether any blacklist entry occurs in `branch`
    pub fn is_blacklisted(&self, branch: &str) -> bool {
        self.blacklisted_branches
            .iter()
            .filter(|entry| !entry.trim().is_empty())
            .any(|entry| branch.contains(entry.trim()))
    }

    /// Record the outcome for `branch`, replacing any earlier entry
    pub fn record_log(&mut self, branch: &str, message: impl Into<String>) {
        let message = message.into();
        match self.processing_logs.iter_mut().find(|l| l.branch == branch) {
            Some(existing) => existing.message = message,
            None => self.processing_logs.push(ProcessingLog {
                branch: branch.to_string(),
                message,
            }),
        }
    }

    pub fn record_branch_error(
        &mut self,
        branch: &str,
        message: impl Into<String>,
        cause: impl Into<String>,
    ) {
        self.processing_branch_errors.push(BranchError {
            branch: branch.to_string(),
            message: message.into(),
            cause: cause.into(),
        });
    }

    /// Add to the processed set, keeping first-seen order
    pub fn mark_processed(&mut self, branch: &str) {
        if !self.processed_branches.iter().any(|b| b == branch) {
            self.processed_branches.push(branch.to_string());
        }
    }
}

/// Partial deployment written with a merge update.
///
/// Only `Some` fields are serialized, so unset fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentPatch {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DeploymentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<Option<bool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklisted_branches: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_branches: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_logs: Option<Vec<ProcessingLog>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_branch_errors: Option<Vec<BranchError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_tag: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl DeploymentPatch {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Patch carrying the progress fields a pass accumulates
    pub fn progress(deployment: &Deployment) -> Self {
        Self {
            id: deployment.id.clone(),
            processed_branches: Some(deployment.processed_branches.clone()),
            processing_logs: Some(deployment.processing_logs.clone()),
            processing_branch_errors: Some(deployment.processing_branch_errors.clone()),
            processing_errors: Some(deployment.processing_errors.clone()),
            ..Default::default()
        }
    }
}
