//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::chat::MessageSource;
use crate::errors::BotError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{poller, processor};

/// Run mepbot until `shutdown_signal` resolves
pub async fn run(
    mut options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BotError> {
    info!("Initializing mepbot...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&mut options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start mepbot: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    // Shutdown
    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Run a single processing pass and return
pub async fn run_once(mut options: AppOptions) -> Result<(), BotError> {
    let state = AppState::init(&mut options).await?;
    match state.orchestrator.process_pending().await? {
        Some(report) => info!(
            processed = ?report.processed,
            failed = ?report.failed,
            "Processing pass finished"
        ),
        None => info!("Processing already in flight"),
    }
    state.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &mut AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<Arc<AppState>, BotError> {
    let app_state = Arc::new(AppState::init(options).await?);
    shutdown_manager.with_app_state(app_state.clone())?;

    if options.enable_server {
        init_server(options, app_state.clone(), shutdown_manager, shutdown_tx.subscribe()).await?;
    }

    if options.enable_processor {
        init_processor_worker(
            options.processor.clone(),
            app_state.clone(),
            shutdown_manager,
            shutdown_tx.subscribe(),
        );
    }

    if let Some(source) = app_state.message_source.clone() {
        for poller_options in options.pollers.clone() {
            init_poller_worker(
                poller_options,
                source.clone(),
                app_state.clone(),
                shutdown_manager,
                shutdown_tx.subscribe(),
            );
        }
    }

    Ok(app_state)
}

fn init_processor_worker(
    options: processor::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("Initializing processor worker...");

    let orchestrator = app_state.orchestrator.clone();
    let handle = tokio::spawn(async move {
        processor::run(
            &options,
            orchestrator.as_ref(),
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_worker_handle(handle);
}

fn init_poller_worker(
    options: poller::Options,
    source: Arc<dyn MessageSource>,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!(channel = %options.channel_name, "Initializing poller worker...");

    let handle = tokio::spawn(async move {
        poller::run(
            &options,
            source.as_ref(),
            app_state.deployments.as_ref(),
            &app_state.fetch_flights,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_worker_handle(handle);
}

async fn init_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), BotError> {
    info!("Initializing local HTTP server...");

    let server_state = ServerState::new(
        app_state.documents.clone(),
        app_state.deployments.clone(),
        app_state.connectors.clone(),
        app_state.orchestrator.clone(),
    );

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_server_handle(server_handle)
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    server_handle: Option<JoinHandle<Result<(), BotError>>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl ShutdownManager {
    fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            server_handle: None,
            worker_handles: Vec::new(),
        }
    }

    fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), BotError> {
        if self.app_state.is_some() {
            return Err(BotError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    fn with_worker_handle(&mut self, handle: JoinHandle<()>) {
        self.worker_handles.push(handle);
    }

    fn with_server_handle(&mut self, handle: JoinHandle<Result<(), BotError>>) -> Result<(), BotError> {
        if self.server_handle.is_some() {
            return Err(BotError::ShutdownError("server_handle already set".to_string()));
        }
        self.server_handle = Some(handle);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), BotError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), BotError> {
        info!("Shutting down mepbot...");

        // 1. Workers
        for handle in self.worker_handles.drain(..) {
            handle.await.map_err(|e| BotError::ShutdownError(e.to_string()))?;
        }

        // 2. Server
        if let Some(handle) = self.server_handle.take() {
            handle.await.map_err(|e| BotError::ShutdownError(e.to_string()))??;
        }

        // 3. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
