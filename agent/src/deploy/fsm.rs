//! Finite state machine for deployment status

use serde::{Deserialize, Serialize};

use crate::errors::BotError;

/// Deployment status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    /// Detected, waiting for a processing pass
    #[default]
    Pending,

    /// A processing pass is running
    #[serde(alias = "in_progress")]
    Processing,

    /// Branches integrated, tag computed or pushed
    Processed,

    /// Dropped by a human, immutable from here on
    Canceled,
}

impl DeploymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Processing => "processing",
            DeploymentStatus::Processed => "processed",
            DeploymentStatus::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DeploymentStatus {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(DeploymentStatus::Pending),
            "processing" | "in_progress" => Ok(DeploymentStatus::Processing),
            "processed" => Ok(DeploymentStatus::Processed),
            "canceled" | "cancelled" => Ok(DeploymentStatus::Canceled),
            _ => Err(BotError::ValidationError(format!("Invalid status: {}", s))),
        }
    }
}

/// Status event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    /// A processing pass picked the deployment up
    Start,

    /// The pass finished, successfully or not
    Finish,

    /// A human asked for the deployment to be processed again
    Requeue,

    /// A human dropped the deployment
    Cancel,
}

/// Compute the status reached from `from` on `event`
pub fn transition(
    from: DeploymentStatus,
    event: StatusEvent,
) -> Result<DeploymentStatus, BotError> {
    use DeploymentStatus::*;

    let next = match (from, event) {
        // A pass starts on new work, on approved work, or resumes a pass
        // that never reached its finalization (process crash)
        (Pending, StatusEvent::Start) => Processing,
        (Processed, StatusEvent::Start) => Processing,
        (Processing, StatusEvent::Start) => Processing,

        (Processing, StatusEvent::Finish) => Processed,

        (Processed, StatusEvent::Requeue) => Pending,
        (Processed, StatusEvent::Cancel) => Canceled,

        (state, event) => {
            return Err(BotError::InvalidTransition(format!(
                "{} -> {:?}",
                state, event
            )));
        }
    };

    Ok(next)
}

/// Event a human status change maps to
pub fn event_for_requested_status(
    requested: DeploymentStatus,
) -> Result<StatusEvent, BotError> {
    match requested {
        DeploymentStatus::Pending => Ok(StatusEvent::Requeue),
        DeploymentStatus::Canceled => Ok(StatusEvent::Cancel),
        other => Err(BotError::InvalidTransition(format!(
            "status '{}' can only be set by a processing pass",
            other
        ))),
    }
}
