//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::chat::graph::GraphMessageSource;
use crate::chat::MessageSource;
use crate::deploy::lease::KeyedFlight;
use crate::deploy::orchestrator::Orchestrator;
use crate::errors::BotError;
use crate::extract::cache::DurableBranchCache;
use crate::extract::classifier::OpenRouterClassifier;
use crate::extract::extractor::BranchExtractor;
use crate::git::engine::GitEngine;
use crate::git::runner::{CommandRunner, GitCommandRunner};
use crate::git::workspace::{GitlabWorkspace, LocalWorkspace, Workspace};
use crate::models::deployment::DEPLOYMENTS_COLLECTION;
use crate::storage::connectors::ConnectorStore;
use crate::storage::deployments::DeploymentStore;
use crate::storage::document::DocumentStore;

/// Main application state
pub struct AppState {
    /// Whole-document data store
    pub documents: Arc<DocumentStore>,

    pub deployments: Arc<DeploymentStore>,

    pub connectors: Arc<ConnectorStore>,

    pub orchestrator: Arc<Orchestrator>,

    /// Chat source, absent without chat credentials
    pub message_source: Option<Arc<dyn MessageSource>>,

    /// Per-channel fetch guard
    pub fetch_flights: KeyedFlight,
}

impl AppState {
    /// Initialize application state.
    ///
    /// Takes the secret-bearing sections out of `options`.
    pub async fn init(options: &mut AppOptions) -> Result<Self, BotError> {
        info!("Initializing application state...");

        options.storage.setup().await?;

        let documents = Arc::new(DocumentStore::new(options.storage.data_file()));
        documents.ensure().await?;

        let pruned = documents
            .prune_duplicates(DEPLOYMENTS_COLLECTION, "id")
            .await?;
        if pruned > 0 {
            warn!(pruned, "Removed duplicate deployments");
        }

        let deployments = Arc::new(DeploymentStore::new(documents.clone()));
        let connectors = Arc::new(ConnectorStore::new(documents.clone()));
        connectors
            .init_default(
                options.repository.host.base_url.as_deref(),
                options.repository.host.access_token.as_ref(),
            )
            .await?;

        let mut extractor = BranchExtractor::new(
            options.extraction.conventions.clone(),
            options.extraction.cache_key_len,
        )?
        .with_durable_cache(DurableBranchCache::new(documents.clone()));
        match options.extraction.classifier.take() {
            Some(config) => {
                info!(model = %config.model, "Remote branch classifier enabled");
                extractor = extractor.with_classifier(Arc::new(OpenRouterClassifier::new(config)?));
            }
            None => info!("Remote branch classifier disabled"),
        }

        let runner: Arc<dyn CommandRunner> =
            Arc::new(GitCommandRunner::new(options.repository.git_timeout));
        let git = Arc::new(GitEngine::new(
            runner.clone(),
            options.repository.pipeline.remote.clone(),
        ));

        let workspace: Arc<dyn Workspace> = match &options.repository.local_path {
            Some(path) => {
                info!(path = %path.display(), "Using existing working copy");
                Arc::new(LocalWorkspace::new(path.clone()))
            }
            None => {
                let name = options.repository.name.clone().unwrap_or_default();
                if name.is_empty() {
                    warn!("No repository configured, processing passes will fail");
                }
                Arc::new(GitlabWorkspace::new(
                    documents.clone(),
                    connectors.clone(),
                    std::mem::take(&mut options.repository.host),
                    name,
                    options.storage.repos_dir().path(),
                    runner,
                    options.repository.identity.clone(),
                )?)
            }
        };

        let orchestrator = Arc::new(Orchestrator::new(
            deployments.clone(),
            Arc::new(extractor),
            git,
            workspace,
            options.repository.pipeline.clone(),
        ));

        let message_source: Option<Arc<dyn MessageSource>> = match options.chat.access_token.take() {
            Some(token) => {
                let source: Arc<dyn MessageSource> =
                    Arc::new(GraphMessageSource::new(&options.chat.base_url, token)?);
                Some(source)
            }
            None => {
                if !options.pollers.is_empty() {
                    warn!("No chat access token, channel polling disabled");
                }
                None
            }
        };

        Ok(Self {
            documents,
            deployments,
            connectors,
            orchestrator,
            message_source,
            fetch_flights: KeyedFlight::new(),
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), BotError> {
        info!("Shutting down application state...");
        if self.orchestrator.is_in_flight() {
            warn!("A processing pass is still running; it resumes on next start");
        }
        Ok(())
    }
}
