//! Chat channel polling

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::chat::MessageSource;
use crate::deploy::lease::KeyedFlight;
use crate::errors::BotError;
use crate::storage::deployments::{Candidate, DeploymentStore};

/// Poller worker options, one per watched channel
#[derive(Debug, Clone)]
pub struct Options {
    /// Single-flight key of this watch
    pub source_id: String,

    pub channel_id: String,

    /// Display name used in logs
    pub channel_name: String,

    /// Substring marking a deployment trigger
    pub message_pattern: String,

    /// Messages fetched per poll
    pub page_size: u32,

    /// Polling interval
    pub interval: Duration,

    /// Initial delay before first poll
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            source_id: "default".to_string(),
            channel_id: String::new(),
            channel_name: "Unknown".to_string(),
            message_pattern: "agent:deploy".to_string(),
            page_size: 5,
            interval: Duration::from_secs(10),
            initial_delay: Duration::from_secs(2),
        }
    }
}

/// Result of a single poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Another poll of the same source was still running
    InFlight,
    Polled { fetched: usize, matched: usize },
}

/// Fetch the latest messages once and ingest the matching ones
pub async fn poll_once(
    options: &Options,
    source: &dyn MessageSource,
    store: &DeploymentStore,
    flights: &KeyedFlight,
) -> Result<PollOutcome, BotError> {
    let Some(_flight) = flights.try_acquire(&options.source_id) else {
        debug!(channel = %options.channel_name, "Fetch already running, skipping");
        return Ok(PollOutcome::InFlight);
    };

    if options.message_pattern.is_empty() {
        return Err(BotError::ConfigError(format!(
            "channel {} has no message pattern",
            options.channel_name
        )));
    }

    let messages = source
        .latest_messages(&options.channel_id, options.page_size)
        .await?;
    let fetched = messages.len();

    let mut matched = 0;
    for message in messages {
        if !message.content.contains(&options.message_pattern) {
            continue;
        }
        matched += 1;
        store
            .ingest_candidate(Candidate {
                id: message.id,
                content: message.content,
                from: message.from,
                channel_id: Some(options.channel_id.clone()),
                created_at: message.created_at,
            })
            .await?;
    }

    debug!(
        channel = %options.channel_name,
        fetched,
        matched,
        "Channel polled"
    );
    Ok(PollOutcome::Polled { fetched, matched })
}

/// Run the poller worker
pub async fn run<S, F>(
    options: &Options,
    source: &dyn MessageSource,
    store: &DeploymentStore,
    flights: &KeyedFlight,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!(channel = %options.channel_name, "Poller worker starting...");

    // Initial delay
    sleep_fn(options.initial_delay).await;

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!(channel = %options.channel_name, "Poller worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        match poll_once(options, source, store, flights).await {
            Ok(PollOutcome::Polled { matched, .. }) if matched > 0 => {
                info!(channel = %options.channel_name, matched, "Deployment messages found");
            }
            Ok(_) => {}
            Err(BotError::ConfigError(e)) => {
                warn!("Poller stopping: {}", e);
                return;
            }
            Err(e) => error!(channel = %options.channel_name, "Fetching messages failed: {}", e),
        }
    }
}
