//! Settings file management

use secrecy::SecretString;
use serde::Deserialize;

use crate::logs::LogLevel;

/// Bot settings, read from `settings.json`
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON log lines
    #[serde(default)]
    pub log_json: bool,

    /// Also write daily-rolling log files under the data dir
    #[serde(default)]
    pub log_to_file: bool,

    /// Base directory for the data store and working copies
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub processor: ProcessorSettings,

    #[serde(default)]
    pub chat: ChatSettings,

    /// Watched chat channels
    #[serde(default)]
    pub channels: Vec<ChannelSettings>,

    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub branches: BranchSettings,

    #[serde(default)]
    pub repository: RepositorySettings,

    #[serde(default)]
    pub gitlab: GitlabSettings,
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> String {
    "./data".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            data_dir: default_data_dir(),
            server: ServerSettings::default(),
            processor: ProcessorSettings::default(),
            chat: ChatSettings::default(),
            channels: Vec::new(),
            classifier: ClassifierSettings::default(),
            branches: BranchSettings::default(),
            repository: RepositorySettings::default(),
            gitlab: GitlabSettings::default(),
        }
    }
}

impl Settings {
    /// Fill secrets from the environment; environment values win
    pub fn apply_env(&mut self) {
        if let Some(token) = env_secret("GITLAB_ACCESS_TOKEN") {
            self.gitlab.access_token = Some(token);
        }
        if let Ok(url) = std::env::var("GITLAB_BASE_URL") {
            self.gitlab.base_url = Some(url);
        }
        if let Ok(name) = std::env::var("GITLAB_REPO_NAME") {
            self.repository.name = Some(name);
        }
        if let Some(key) = env_secret("OPENROUTER_API_KEY") {
            self.classifier.api_key = Some(key);
        }
        if let Some(token) = env_secret("GRAPH_ACCESS_TOKEN") {
            self.chat.access_token = Some(token);
        }
    }
}

fn secret_opt<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()).map(SecretString::from))
}

fn env_secret(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}

/// Local HTTP server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_server_host")]
    pub host: String,

    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    3000
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// Deployment processing schedule
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_processor_interval")]
    pub interval_secs: u64,
}

fn default_processor_interval() -> u64 {
    15
}

impl Default for ProcessorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_processor_interval(),
        }
    }
}

/// Chat platform access
#[derive(Debug, Deserialize)]
pub struct ChatSettings {
    #[serde(default = "default_graph_url")]
    pub base_url: String,

    #[serde(default, deserialize_with = "secret_opt")]
    pub access_token: Option<SecretString>,

    /// Messages fetched per poll
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_graph_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_page_size() -> u32 {
    5
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            base_url: default_graph_url(),
            access_token: None,
            page_size: default_page_size(),
        }
    }
}

/// One watched chat channel
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSettings {
    /// Stable id of this watch, used as the single-flight key
    pub id: String,

    pub channel_id: String,

    #[serde(default)]
    pub channel_name: Option<String>,

    /// Substring marking a message as a deployment trigger
    #[serde(default = "default_message_pattern")]
    pub message_pattern: String,

    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_message_pattern() -> String {
    "agent:deploy".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

/// Remote branch classifier
#[derive(Debug, Deserialize)]
pub struct ClassifierSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_classifier_url")]
    pub base_url: String,

    #[serde(default, deserialize_with = "secret_opt")]
    pub api_key: Option<SecretString>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_classifier_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default)]
    pub referer: Option<String>,
}

fn default_classifier_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_model() -> String {
    "openai/gpt-4".to_string()
}

fn default_classifier_timeout() -> u64 {
    30
}

fn default_app_name() -> String {
    "mepbot".to_string()
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_classifier_url(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_classifier_timeout(),
            app_name: default_app_name(),
            referer: None,
        }
    }
}

/// Branch naming conventions
#[derive(Debug, Clone, Deserialize)]
pub struct BranchSettings {
    /// Allowed prefixes; a branch is `<PREFIX>-<digits>`
    #[serde(default = "default_prefixes")]
    pub prefixes: Vec<String>,

    /// Free-text hints forwarded to the classifier
    #[serde(default)]
    pub hints: Vec<String>,

    /// Characters of input used as the classifier cache key
    #[serde(default = "default_cache_key_len")]
    pub cache_key_len: usize,
}

fn default_prefixes() -> Vec<String> {
    vec!["GEO".to_string(), "ADM".to_string(), "GDM".to_string()]
}

fn default_cache_key_len() -> usize {
    100
}

impl Default for BranchSettings {
    fn default() -> Self {
        Self {
            prefixes: default_prefixes(),
            hints: Vec::new(),
            cache_key_len: default_cache_key_len(),
        }
    }
}

/// Integrated repository
#[derive(Debug, Clone, Deserialize)]
pub struct RepositorySettings {
    /// Project path on the git host
    #[serde(default)]
    pub name: Option<String>,

    /// Use an existing clone instead of cloning from the git host
    #[serde(default)]
    pub local_path: Option<String>,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_staging_branch")]
    pub staging_branch: String,

    #[serde(default = "default_production_branch")]
    pub production_branch: String,

    #[serde(default = "default_preprod_suffix")]
    pub preprod_suffix: String,

    #[serde(default = "default_git_timeout")]
    pub git_timeout_secs: u64,

    #[serde(default = "default_author_name")]
    pub author_name: String,

    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_staging_branch() -> String {
    "preprod".to_string()
}

fn default_production_branch() -> String {
    "prod".to_string()
}

fn default_preprod_suffix() -> String {
    "-preprod".to_string()
}

fn default_git_timeout() -> u64 {
    300
}

fn default_author_name() -> String {
    "mepbot".to_string()
}

fn default_author_email() -> String {
    "mepbot@localhost".to_string()
}

impl Default for RepositorySettings {
    fn default() -> Self {
        Self {
            name: None,
            local_path: None,
            remote: default_remote(),
            staging_branch: default_staging_branch(),
            production_branch: default_production_branch(),
            preprod_suffix: default_preprod_suffix(),
            git_timeout_secs: default_git_timeout(),
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}

/// Git host used to seed the default connector
#[derive(Debug, Default, Deserialize)]
pub struct GitlabSettings {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default, deserialize_with = "secret_opt")]
    pub access_token: Option<SecretString>,
}
