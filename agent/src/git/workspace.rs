//! Working copy provisioning

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::BotError;
use crate::git::runner::CommandRunner;
use crate::models::connector::ConnectorType;
use crate::storage::connectors::ConnectorStore;
use crate::storage::document::DocumentStore;

/// Store key caching the git host project lookup
pub const REPO_DETAILS_KEY: &str = "repoDetails";

/// Yields the path of a ready working copy
#[async_trait]
pub trait Workspace: Send + Sync {
    async fn prepare(&self) -> Result<PathBuf, BotError>;
}

/// An existing clone on disk
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    path: PathBuf,
}

impl LocalWorkspace {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Workspace for LocalWorkspace {
    async fn prepare(&self) -> Result<PathBuf, BotError> {
        if !tokio::fs::try_exists(self.path.join(".git")).await? {
            return Err(BotError::GitError(format!(
                "{} is not a git working copy",
                self.path.display()
            )));
        }
        Ok(self.path.clone())
    }
}

/// Project metadata returned by the GitLab projects API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectDetails {
    pub id: u64,
    pub path: String,
    #[serde(default)]
    pub path_with_namespace: Option<String>,
    pub http_url_to_repo: String,
}

/// Fallback git host credentials from settings
#[derive(Debug, Default)]
pub struct HostCredentials {
    pub base_url: Option<String>,
    pub access_token: Option<SecretString>,
}

struct ResolvedHost {
    base_url: String,
    token: SecretString,
}

/// Identity recorded on merge commits made in the clone
#[derive(Debug, Clone)]
pub struct MergeIdentity {
    pub name: String,
    pub email: String,
}

/// Clones a GitLab project once and reuses the clone afterwards
pub struct GitlabWorkspace {
    client: Client,
    documents: Arc<DocumentStore>,
    connectors: Arc<ConnectorStore>,
    fallback: HostCredentials,
    repo_name: String,
    repos_dir: PathBuf,
    runner: Arc<dyn CommandRunner>,
    identity: MergeIdentity,
}

impl GitlabWorkspace {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        documents: Arc<DocumentStore>,
        connectors: Arc<ConnectorStore>,
        fallback: HostCredentials,
        repo_name: impl Into<String>,
        repos_dir: impl Into<PathBuf>,
        runner: Arc<dyn CommandRunner>,
        identity: MergeIdentity,
    ) -> Result<Self, BotError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            documents,
            connectors,
            fallback,
            repo_name: repo_name.into(),
            repos_dir: repos_dir.into(),
            runner,
            identity,
        })
    }

    async fn resolve_host(&self) -> Result<ResolvedHost, BotError> {
        if let Some(connector) = self.connectors.first_active(ConnectorType::Gitlab).await? {
            debug!(connector_id = %connector.id, "Using git connector credentials");
            return Ok(ResolvedHost {
                base_url: connector.url,
                token: SecretString::from(connector.access_token),
            });
        }

        match (&self.fallback.base_url, &self.fallback.access_token) {
            (Some(url), Some(token)) => Ok(ResolvedHost {
                base_url: url.clone(),
                token: SecretString::from(token.expose_secret().to_string()),
            }),
            _ => Err(BotError::ConfigError(
                "no active GitLab connector and no git host credentials configured".to_string(),
            )),
        }
    }

    /// Look the project up by path, using the cached details when they match
    pub async fn project_details(&self) -> Result<ProjectDetails, BotError> {
        if let Some(cached) = self.documents.get(REPO_DETAILS_KEY).await? {
            match serde_json::from_value::<ProjectDetails>(cached) {
                Ok(details) if details.path == self.repo_name => return Ok(details),
                Ok(_) => debug!("Cached repo details are for another project"),
                Err(e) => warn!("Ignoring unreadable cached repo details: {}", e),
            }
        }

        let host = self.resolve_host().await?;
        let details = self.search_project(&host).await?;
        self.documents
            .set(REPO_DETAILS_KEY, serde_json::to_value(&details)?)
            .await?;
        Ok(details)
    }

    async fn search_project(&self, host: &ResolvedHost) -> Result<ProjectDetails, BotError> {
        let base = host.base_url.trim_end_matches('/');
        let mut page = 1u32;

        loop {
            let mut url = Url::parse(&format!("{}/api/v4/projects", base))
                .map_err(|e| BotError::ConfigError(format!("invalid git host url: {}", e)))?;
            url.query_pairs_mut()
                .append_pair("search", &self.repo_name)
                .append_pair("per_page", "100")
                .append_pair("page", &page.to_string());

            debug!("GET {}", url);
            let response = self
                .client
                .get(url)
                .header("Private-Token", host.token.expose_secret())
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(BotError::GitError(format!(
                    "project search failed: {} - {}",
                    status, body
                )));
            }

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u32>().ok());

            let projects: Vec<ProjectDetails> = response.json().await?;
            if let Some(found) = projects.into_iter().find(|p| p.path == self.repo_name) {
                info!(project = %found.path, "Found project on git host");
                return Ok(found);
            }

            match next_page {
                Some(next) if next > page => page = next,
                _ => {
                    return Err(BotError::NotFound(format!(
                        "project {} on git host",
                        self.repo_name
                    )))
                }
            }
        }
    }

    async fn git(&self, dir: &Path, args: &[&str]) -> Result<(), BotError> {
        let out = self.runner.run(dir, args).await?;
        if out.success {
            Ok(())
        } else {
            Err(BotError::GitError(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                out.stderr.trim()
            )))
        }
    }
}

/// `https://oauth2:<token>@host/path.git`
pub fn authenticated_clone_url(http_url: &str, token: &SecretString) -> Result<Url, BotError> {
    let mut url = Url::parse(http_url)
        .map_err(|e| BotError::GitError(format!("invalid clone url {}: {}", http_url, e)))?;
    url.set_username("oauth2")
        .and_then(|_| url.set_password(Some(token.expose_secret())))
        .map_err(|_| BotError::GitError(format!("cannot add credentials to {}", http_url)))?;
    Ok(url)
}

#[async_trait]
impl Workspace for GitlabWorkspace {
    async fn prepare(&self) -> Result<PathBuf, BotError> {
        if self.repo_name.is_empty() {
            return Err(BotError::ConfigError(
                "no repository name or local path configured".to_string(),
            ));
        }
        let details = self.project_details().await?;
        let target = self.repos_dir.join(&details.path);

        if tokio::fs::try_exists(target.join(".git")).await? {
            debug!(path = %target.display(), "Working copy already present");
            return Ok(target);
        }

        tokio::fs::create_dir_all(&self.repos_dir).await?;
        let host = self.resolve_host().await?;
        let clone_url = authenticated_clone_url(&details.http_url_to_repo, &host.token)?;
        let target_str = target.to_string_lossy().to_string();

        info!(project = %details.path, path = %target_str, "Cloning repository");
        self.git(&self.repos_dir, &["clone", clone_url.as_str(), &target_str])
            .await?;

        if !tokio::fs::try_exists(target.join(".git")).await? {
            return Err(BotError::GitError(
                "git directory missing after clone".to_string(),
            ));
        }

        let settings: [[&str; 3]; 3] = [
            ["config", "pull.rebase", "false"],
            ["config", "user.name", &self.identity.name],
            ["config", "user.email", &self.identity.email],
        ];
        for args in settings {
            if let Err(e) = self.git(&target, &args).await {
                warn!("Configuring clone failed: {}", e);
            }
        }

        info!(path = %target_str, "Repository cloned");
        Ok(target)
    }
}
