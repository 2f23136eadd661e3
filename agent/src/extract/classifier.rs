//! Remote branch classifier

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use crate::errors::BotError;

/// Branch naming conventions handed to the classifier
#[derive(Debug, Clone, Default)]
pub struct PrefixConvention {
    /// Allowed prefixes, a branch is `<PREFIX>-<digits>`
    pub prefixes: Vec<String>,
    /// Free-text context, e.g. "v3 typically indicates GEO-"
    pub hints: Vec<String>,
}

/// Finds branch names in free text when no direct match exists
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(
        &self,
        text: &str,
        conventions: &PrefixConvention,
    ) -> Result<Vec<String>, BotError>;
}

/// Connection settings for [`OpenRouterClassifier`]
#[derive(Debug)]
pub struct OpenRouterConfig {
    pub base_url: String,
    pub api_key: SecretString,
    pub model: String,
    pub timeout: Duration,
    pub app_name: String,
    pub referer: Option<String>,
}

/// Classifier backed by an OpenAI-compatible chat completions endpoint
pub struct OpenRouterClassifier {
    client: Client,
    config: OpenRouterConfig,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Value>,
    response_format: Value,
    temperature: f32,
}

impl OpenRouterClassifier {
    pub fn new(config: OpenRouterConfig) -> Result<Self, BotError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }
}

/// Prompt sent to the model
pub fn build_prompt(text: &str, conventions: &PrefixConvention) -> String {
    let mut prompt = String::from(
        "Analyze this deployment request and identify all relevant branch names.\n\
         Branch naming conventions:\n",
    );
    for prefix in &conventions.prefixes {
        prompt.push_str(&format!("- {prefix}-XXX where XXX is a number\n"));
    }
    if !conventions.hints.is_empty() {
        prompt.push_str("\nContext clues:\n");
        for hint in &conventions.hints {
            prompt.push_str(&format!("- {hint}\n"));
        }
    }
    prompt.push_str(&format!(
        "\nInput:\n{text}\n\n\
         Respond ONLY with a JSON object listing the branch names, with an empty list if none are found.\n\
         Example: {{\"branches\": [\"GEO-47827\", \"ADM-12345\"]}}\n"
    ));
    prompt
}

/// Branch list from the model's message content.
///
/// Accepts `{"branches": [...]}` or a bare array.
pub fn parse_branches(content: &str) -> Result<Vec<String>, BotError> {
    let value: Value = serde_json::from_str(content.trim())
        .map_err(|e| BotError::ClassifierError(format!("malformed classifier output: {}", e)))?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("branches") {
            Some(Value::Array(items)) => items,
            None | Some(Value::Null) => return Ok(Vec::new()),
            Some(_) => {
                return Err(BotError::ClassifierError(
                    "'branches' is not a list".to_string(),
                ))
            }
        },
        _ => {
            return Err(BotError::ClassifierError(
                "classifier output is neither an object nor a list".to_string(),
            ))
        }
    };

    Ok(items
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

#[async_trait]
impl Classifier for OpenRouterClassifier {
    async fn classify(
        &self,
        text: &str,
        conventions: &PrefixConvention,
    ) -> Result<Vec<String>, BotError> {
        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        debug!("POST {}", url);

        let body = CompletionRequest {
            model: &self.config.model,
            messages: vec![json!({
                "role": "user",
                "content": build_prompt(text, conventions),
            })],
            response_format: json!({ "type": "json_object" }),
            temperature: 0.1,
        };

        let mut request = self
            .client
            .post(&url)
            .header(
                header::AUTHORIZATION,
                format!("Bearer {}", self.config.api_key.expose_secret()),
            )
            .header("X-Title", &self.config.app_name)
            .json(&body);
        if let Some(referer) = &self.config.referer {
            request = request.header("HTTP-Referer", referer);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Classifier request failed: {} - {}", status, body);
            return Err(BotError::ClassifierError(format!("{}: {}", status, body)));
        }

        let completion: CompletionResponse = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| BotError::ClassifierError("empty completion".to_string()))?;

        parse_branches(&content)
    }
}
