//! Periodic deployment processing

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::deploy::orchestrator::Orchestrator;

/// Processor worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Time between passes
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
        }
    }
}

/// Run the processor worker
pub async fn run<S, F>(
    options: &Options,
    orchestrator: &Orchestrator,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Processor worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Processor worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        match orchestrator.process_pending().await {
            Ok(Some(report)) => {
                if !report.processed.is_empty() || !report.failed.is_empty() {
                    debug!(
                        processed = ?report.processed,
                        failed = ?report.failed,
                        "Processing tick done"
                    );
                }
            }
            Ok(None) => debug!("Previous pass still running"),
            Err(e) => error!("Processing pass failed: {}", e),
        }
    }
}
