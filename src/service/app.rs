//! Main application state and service coordination
//!
//! `AppState` wires the match service client, persistence store, event
//! publisher and metrics into a `LobbyManager`, and owns the background tasks:
//! the HTTP server, the timeout watchdog and the uptime updater.

use crate::config::AppConfig;
use crate::events::{
    EventPublisher, EventQueue, HttpEventPublisher, LoggingEventPublisher, PublisherConfig,
    QueuedEventPublisher,
};
use crate::http::{HttpServer, HttpServerConfig};
use crate::lobby::{LobbyManager, LobbyManagerStats};
use crate::match_service::{HttpMatchServiceClient, MatchServiceClient};
use crate::matches::{TimeoutWatchdog, WatchdogConfig};
use crate::metrics::MetricsCollector;
use crate::rating::RatingEngine;
use crate::service::health::ServiceHandle;
use crate::store::{InMemoryStore, PersistenceStore};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    /// Core matchmaking component
    lobby_manager: LobbyManager,

    metrics_collector: Arc<MetricsCollector>,

    http_server: Arc<HttpServer>,

    /// Presentation publisher fed by the event queue
    event_publisher: Arc<dyn EventPublisher>,

    /// Events waiting for delivery; taken when the drain task starts
    event_queue: Option<EventQueue>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Shutdown signal for the watchdog and the uptime task
    shutdown_tx: broadcast::Sender<()>,

    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with its production collaborators
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing scrim-room service");
        info!(
            "Configuration: service={}, match_service={}, callback={}",
            config.service.name, config.match_service.base_url, config.match_service.callback_url
        );

        let match_service: Arc<dyn MatchServiceClient> = Arc::new(
            HttpMatchServiceClient::new(&config.match_service).map_err(|e| {
                ServiceError::Initialization {
                    message: format!("Failed to create match service client: {}", e),
                }
            })?,
        );

        let store: Arc<dyn PersistenceStore> =
            Arc::new(InMemoryStore::new(config.rating_config()));

        let event_publisher: Arc<dyn EventPublisher> = match &config.presentation.webhook_url {
            Some(url) => {
                info!("Publishing presentation events to {}", url);
                Arc::new(
                    HttpEventPublisher::new(
                        url.clone(),
                        PublisherConfig::from(&config.presentation),
                    )
                    .map_err(|e| ServiceError::Initialization {
                        message: format!("Failed to create event publisher: {}", e),
                    })?,
                )
            }
            None => {
                info!("No presentation webhook configured, events are logged only");
                Arc::new(LoggingEventPublisher::new())
            }
        };

        Self::with_components(config, match_service, store, event_publisher)
    }

    /// Initialize the application around explicit collaborators.
    ///
    /// The manager publishes into a bounded queue; `event_publisher` receives
    /// the events from a background task once the service is started.
    pub fn with_components(
        config: AppConfig,
        match_service: Arc<dyn MatchServiceClient>,
        store: Arc<dyn PersistenceStore>,
        event_publisher: Arc<dyn EventPublisher>,
    ) -> Result<Self, ServiceError> {
        config
            .rating_config()
            .validate()
            .map_err(|e| ServiceError::Configuration {
                message: e.to_string(),
            })?;

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let (queued_publisher, event_queue) =
            QueuedEventPublisher::new(config.presentation.queue_capacity);

        let lobby_manager = LobbyManager::new(
            match_service,
            store,
            Arc::new(queued_publisher),
            metrics_collector.clone(),
            RatingEngine::new(config.rating_config()),
            config.match_service.callback_url.clone(),
        )
        .with_default_map_pool(config.matchmaking.map_pool.clone());

        let is_running = Arc::new(RwLock::new(false));
        let http_server = Arc::new(
            HttpServer::new(
                HttpServerConfig {
                    port: config.service.http_port,
                    host: config.service.http_host.clone(),
                },
                metrics_collector.clone(),
            )
            .with_service(ServiceHandle::new(
                config.service.name.clone(),
                lobby_manager.clone(),
                is_running.clone(),
            )),
        );

        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            config,
            lobby_manager,
            metrics_collector,
            http_server,
            event_publisher,
            event_queue: Some(event_queue),
            background_tasks: Vec::new(),
            shutdown_tx,
            is_running,
        })
    }

    /// Start the HTTP server and the background tasks
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting scrim-room service");

        *self.is_running.write().await = true;

        self.start_http_server().await;
        self.start_background_tasks();

        info!("Scrim-room service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<LobbyManagerStats, ServiceError> {
        info!("Starting graceful shutdown of scrim-room service");

        *self.is_running.write().await = false;

        if self.shutdown_tx.send(()).is_err() {
            debug!("No background task was listening for shutdown");
        }
        self.http_server.stop();
        self.stop_background_tasks().await;

        let final_stats =
            self.lobby_manager
                .get_stats()
                .await
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("Scrim-room service shutdown completed");
        Ok(final_stats)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn lobby_manager(&self) -> LobbyManager {
        self.lobby_manager.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics_collector.clone()
    }

    pub fn http_server(&self) -> Arc<HttpServer> {
        self.http_server.clone()
    }

    /// Handle used by the health endpoints
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle::new(
            self.config.service.name.clone(),
            self.lobby_manager.clone(),
            self.is_running.clone(),
        )
    }

    async fn start_http_server(&mut self) {
        let server = self.http_server.clone();
        let port = self.config.service.http_port;

        let handle = tokio::spawn(async move {
            if let Err(e) = server.start().await {
                error!("HTTP server failed: {:#}", e);
            } else {
                info!("HTTP server task completed");
            }
        });
        self.background_tasks.push(handle);

        // Give the listener a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!("HTTP server started on port {}", port);
    }

    fn start_background_tasks(&mut self) {
        if let Some(queue) = self.event_queue.take() {
            info!(
                "Starting presentation event queue (capacity {})...",
                self.config.presentation.queue_capacity
            );
            self.background_tasks.push(
                queue.spawn(self.event_publisher.clone(), self.shutdown_tx.subscribe()),
            );
        }

        let watchdog_config = WatchdogConfig::from(&self.config);
        info!(
            "Starting timeout watchdog ({}s interval)...",
            watchdog_config.interval.as_secs()
        );
        let watchdog = TimeoutWatchdog::new(self.lobby_manager.clone(), watchdog_config);
        self.background_tasks
            .push(watchdog.spawn(self.shutdown_tx.subscribe()));

        let uptime_task = {
            let manager = self.lobby_manager.clone();
            let metrics_collector = self.metrics_collector.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(30));
                let start_time = tokio::time::Instant::now();

                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            metrics_collector
                                .service()
                                .uptime_seconds
                                .set(start_time.elapsed().as_secs() as i64);

                            match manager.get_stats().await {
                                Ok(stats) => debug!(
                                    "Updated metrics - lobbies: {}, matches: {}, waiting: {}",
                                    stats.active_lobbies, stats.active_matches, stats.players_waiting
                                ),
                                Err(e) => warn!("Failed to get lobby stats for metrics update: {}", e),
                            }
                        }
                        _ = shutdown_rx.recv() => break,
                    }
                }

                info!("Metrics update task stopped");
            })
        };
        self.background_tasks.push(uptime_task);

        info!(
            "{} background tasks running",
            self.background_tasks.len()
        );
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Waiting for {} background tasks to stop...", task_count);
        let timeout = self.config.shutdown_timeout();

        for task in self.background_tasks.drain(..) {
            let abort = task.abort_handle();
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("Background task did not stop within {:?}, aborting", timeout);
                abort.abort();
            }
        }

        info!("All {} background tasks stopped", task_count);
    }
}
