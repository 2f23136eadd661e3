//! Typed deployment access on top of the document store

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::deploy::fsm::{event_for_requested_status, transition, DeploymentStatus};
use crate::errors::BotError;
use crate::models::deployment::{Deployment, DeploymentPatch, DEPLOYMENTS_COLLECTION};
use crate::storage::document::{DocumentStore, MergeOutcome};

/// A trigger message accepted by a source
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Native message id of the source
    pub id: String,
    pub content: String,
    pub from: Option<String>,
    pub channel_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Human-requested changes to a deployment
#[derive(Debug, Clone, Default)]
pub struct DeploymentUpdate {
    pub status: Option<DeploymentStatus>,
    pub approved: Option<Option<bool>>,
    pub blacklisted_branches: Option<Vec<String>>,
}

fn has_id(item: &Value, id: &str) -> bool {
    item.get("id").and_then(Value::as_str) == Some(id)
}

fn parse(value: Value) -> Result<Deployment, BotError> {
    serde_json::from_value(value)
        .map_err(|e| BotError::StoreCorrupted(format!("invalid deployment document: {}", e)))
}

/// Deployment repository
pub struct DeploymentStore {
    documents: Arc<DocumentStore>,
}

impl DeploymentStore {
    pub fn new(documents: Arc<DocumentStore>) -> Self {
        Self { documents }
    }

    /// Underlying document store
    pub fn documents(&self) -> &Arc<DocumentStore> {
        &self.documents
    }

    /// Insert a pending deployment for `candidate` unless its id is known.
    ///
    /// Returns the stored deployment, new or pre-existing.
    pub async fn ingest_candidate(&self, candidate: Candidate) -> Result<Deployment, BotError> {
        let mut deployment = Deployment::new(candidate.id.clone(), candidate.content);
        deployment.from = candidate.from;
        deployment.channel_id = candidate.channel_id;
        if candidate.created_at.is_some() {
            deployment.created_at = candidate.created_at;
        }

        let inserted = self
            .documents
            .insert_if_absent(
                DEPLOYMENTS_COLLECTION,
                serde_json::to_value(&deployment)?,
                |item| has_id(item, &candidate.id),
            )
            .await?;

        if inserted {
            info!(deployment_id = %candidate.id, "New deployment ingested");
        } else {
            debug!(deployment_id = %candidate.id, "Deployment already known");
        }

        self.require(&candidate.id).await
    }

    /// All deployments, most recently updated first
    pub async fn list(&self) -> Result<Vec<Deployment>, BotError> {
        let mut deployments = self
            .documents
            .collection(DEPLOYMENTS_COLLECTION)
            .await?
            .into_iter()
            .map(parse)
            .collect::<Result<Vec<_>, _>>()?;

        deployments.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(deployments)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Deployment>, BotError> {
        self.documents
            .collection(DEPLOYMENTS_COLLECTION)
            .await?
            .into_iter()
            .find(|item| has_id(item, id))
            .map(parse)
            .transpose()
    }

    pub async fn require(&self, id: &str) -> Result<Deployment, BotError> {
        self.get(id)
            .await?
            .ok_or_else(|| BotError::NotFound(format!("deployment {}", id)))
    }

    /// Deployments a processing pass must pick up, in stored order
    pub async fn select_processable(&self) -> Result<Vec<Deployment>, BotError> {
        Ok(self
            .documents
            .collection(DEPLOYMENTS_COLLECTION)
            .await?
            .into_iter()
            .map(parse)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .filter(Deployment::is_processable)
            .collect())
    }

    /// Merge-update a deployment and bump `updatedAt`
    pub async fn patch(&self, mut patch: DeploymentPatch) -> Result<MergeOutcome, BotError> {
        patch.updated_at = Some(Utc::now());
        let id = patch.id.clone();
        self.documents
            .merge_update_if_present(DEPLOYMENTS_COLLECTION, serde_json::to_value(&patch)?, |item| {
                has_id(item, &id)
            })
            .await
    }

    /// Apply a human update atomically with respect to other store writers
    pub async fn apply_update(
        &self,
        id: &str,
        update: DeploymentUpdate,
    ) -> Result<Deployment, BotError> {
        let updated = self
            .documents
            .update_collection(DEPLOYMENTS_COLLECTION, |items| {
                let slot = items
                    .iter_mut()
                    .find(|item| has_id(item, id))
                    .ok_or_else(|| BotError::NotFound(format!("deployment {}", id)))?;

                let mut deployment = parse(slot.clone())?;
                apply(&mut deployment, update)?;
                deployment.updated_at = Some(Utc::now());

                *slot = merge_over(slot.take(), serde_json::to_value(&deployment)?);
                Ok(deployment)
            })
            .await?;

        info!(
            deployment_id = %id,
            status = %updated.status,
            approved = ?updated.approved,
            "Deployment updated"
        );
        Ok(updated)
    }

    /// Mark a processed deployment canceled
    pub async fn cancel(&self, id: &str) -> Result<Deployment, BotError> {
        self.apply_update(
            id,
            DeploymentUpdate {
                status: Some(DeploymentStatus::Canceled),
                ..Default::default()
            },
        )
        .await
    }
}

fn apply(deployment: &mut Deployment, update: DeploymentUpdate) -> Result<(), BotError> {
    if deployment.status == DeploymentStatus::Canceled {
        return Err(BotError::InvalidTransition(format!(
            "deployment {} is canceled and cannot change",
            deployment.id
        )));
    }

    if let Some(requested) = update.status {
        if requested != deployment.status {
            let event = event_for_requested_status(requested)?;
            deployment.status = transition(deployment.status, event)?;
            if deployment.status == DeploymentStatus::Pending {
                // A requeued deployment needs a fresh decision and a fresh release
                deployment.approved = None;
                deployment.deployed = false;
                deployment.next_tag = None;
            }
        }
    }

    if let Some(approved) = update.approved {
        if approved == Some(true) && deployment.status != DeploymentStatus::Processed {
            return Err(BotError::ValidationError(format!(
                "deployment {} must be processed before approval (status: {})",
                deployment.id, deployment.status
            )));
        }
        deployment.approved = approved;
    }

    if let Some(branches) = update.blacklisted_branches {
        let mut cleaned: Vec<String> = Vec::new();
        for branch in branches {
            let branch = branch.trim().to_string();
            if !branch.is_empty() && !cleaned.contains(&branch) {
                cleaned.push(branch);
            }
        }
        deployment.blacklisted_branches = cleaned;
    }

    Ok(())
}

/// Overlay `fields` on `base`, keeping keys only `base` knows about
fn merge_over(base: Value, fields: Value) -> Value {
    match (base, fields) {
        (Value::Object(mut base), Value::Object(fields)) => {
            for (key, value) in fields {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, fields) => fields,
    }
}
