//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::deploy::orchestrator::PipelineOptions;
use crate::extract::classifier::{OpenRouterConfig, PrefixConvention};
use crate::git::workspace::{HostCredentials, MergeIdentity};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::{poller, processor};

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Enable local HTTP server
    pub enable_server: bool,

    /// Server configuration
    pub server: ServerOptions,

    /// Enable the deployment processor
    pub enable_processor: bool,

    /// Processor worker options
    pub processor: processor::Options,

    /// One poller per enabled channel
    pub pollers: Vec<poller::Options>,

    /// Chat platform access
    pub chat: ChatOptions,

    /// Branch extraction
    pub extraction: ExtractionOptions,

    /// Integrated repository
    pub repository: RepositoryOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::default(),
            enable_server: true,
            server: ServerOptions::default(),
            enable_processor: true,
            processor: processor::Options::default(),
            pollers: Vec::new(),
            chat: ChatOptions::default(),
            extraction: ExtractionOptions::default(),
            repository: RepositoryOptions::default(),
        }
    }
}

impl AppOptions {
    /// Map the settings file onto typed options
    pub fn from_settings(settings: Settings) -> Self {
        let pollers = settings
            .channels
            .iter()
            .filter(|c| c.enabled)
            .map(|c| poller::Options {
                source_id: c.id.clone(),
                channel_id: c.channel_id.clone(),
                channel_name: c.channel_name.clone().unwrap_or_else(|| c.id.clone()),
                message_pattern: c.message_pattern.clone(),
                page_size: settings.chat.page_size,
                interval: Duration::from_secs(c.interval_secs.max(1)),
                ..Default::default()
            })
            .collect();

        let classifier = settings.classifier;
        let classifier = match (classifier.enabled, classifier.api_key) {
            (true, Some(api_key)) => Some(OpenRouterConfig {
                base_url: classifier.base_url,
                api_key,
                model: classifier.model,
                timeout: Duration::from_secs(classifier.timeout_secs),
                app_name: classifier.app_name,
                referer: classifier.referer,
            }),
            _ => None,
        };

        let repo = settings.repository;

        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::new(settings.data_dir),
            enable_server: settings.server.enabled,
            server: ServerOptions {
                host: settings.server.host,
                port: settings.server.port,
            },
            enable_processor: settings.processor.enabled,
            processor: processor::Options {
                interval: Duration::from_secs(settings.processor.interval_secs.max(1)),
            },
            pollers,
            chat: ChatOptions {
                base_url: settings.chat.base_url,
                access_token: settings.chat.access_token,
            },
            extraction: ExtractionOptions {
                conventions: PrefixConvention {
                    prefixes: settings.branches.prefixes,
                    hints: settings.branches.hints,
                },
                cache_key_len: settings.branches.cache_key_len,
                classifier,
            },
            repository: RepositoryOptions {
                name: repo.name,
                local_path: repo.local_path.map(PathBuf::from),
                git_timeout: Duration::from_secs(repo.git_timeout_secs),
                identity: MergeIdentity {
                    name: repo.author_name,
                    email: repo.author_email,
                },
                host: HostCredentials {
                    base_url: settings.gitlab.base_url,
                    access_token: settings.gitlab.access_token,
                },
                pipeline: PipelineOptions {
                    remote: repo.remote,
                    staging_branch: repo.staging_branch,
                    production_branch: repo.production_branch,
                    preprod_suffix: repo.preprod_suffix,
                },
            },
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// Local HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Chat platform options
#[derive(Debug)]
pub struct ChatOptions {
    pub base_url: String,
    pub access_token: Option<SecretString>,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            base_url: "https://graph.microsoft.com/v1.0".to_string(),
            access_token: None,
        }
    }
}

/// Branch extraction options
#[derive(Debug)]
pub struct ExtractionOptions {
    pub conventions: PrefixConvention,
    pub cache_key_len: usize,
    /// Remote classifier, when enabled and keyed
    pub classifier: Option<OpenRouterConfig>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            conventions: PrefixConvention {
                prefixes: vec!["GEO".to_string(), "ADM".to_string(), "GDM".to_string()],
                hints: Vec::new(),
            },
            cache_key_len: 100,
            classifier: None,
        }
    }
}

/// Integrated repository options
#[derive(Debug)]
pub struct RepositoryOptions {
    /// Project path on the git host
    pub name: Option<String>,
    /// Existing clone to use instead of cloning
    pub local_path: Option<PathBuf>,
    pub git_timeout: Duration,
    pub identity: MergeIdentity,
    pub host: HostCredentials,
    pub pipeline: PipelineOptions,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            name: None,
            local_path: None,
            git_timeout: Duration::from_secs(300),
            identity: MergeIdentity {
                name: "mepbot".to_string(),
                email: "mepbot@localhost".to_string(),
            },
            host: HostCredentials::default(),
            pipeline: PipelineOptions::default(),
        }
    }
}
