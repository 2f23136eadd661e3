//! Server state

use std::sync::Arc;

use crate::deploy::orchestrator::Orchestrator;
use crate::storage::connectors::ConnectorStore;
use crate::storage::deployments::DeploymentStore;
use crate::storage::document::DocumentStore;

/// Server state shared across handlers
pub struct ServerState {
    pub documents: Arc<DocumentStore>,
    pub deployments: Arc<DeploymentStore>,
    pub connectors: Arc<ConnectorStore>,
    pub orchestrator: Arc<Orchestrator>,
}

impl ServerState {
    pub fn new(
        documents: Arc<DocumentStore>,
        deployments: Arc<DeploymentStore>,
        connectors: Arc<ConnectorStore>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            documents,
            deployments,
            connectors,
            orchestrator,
        }
    }
}
