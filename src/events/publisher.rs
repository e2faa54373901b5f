//! Presentation event publishers
//!
//! The matchmaking core reports lobby and match lifecycle changes through
//! `EventPublisher`. Rendering is entirely up to whoever receives them.

use crate::config::PresentationSettings;
use crate::error::{MatchmakingError, Result};
use crate::types::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Trait for publishing presentation events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a LobbyUpdated event
    async fn publish_lobby_updated(&self, event: LobbyUpdated) -> Result<()>;

    /// Publish a MatchStarted event
    async fn publish_match_started(&self, event: MatchStarted) -> Result<()>;

    /// Publish a MatchFinished event
    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()>;

    /// Publish a MatchAbandoned event
    async fn publish_match_abandoned(&self, event: MatchAbandoned) -> Result<()>;

    /// Publish a MatchFailed notice
    async fn publish_match_failed(&self, event: MatchFailed) -> Result<()>;
}

/// Envelope wrapping every event sent to the webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: String,
    pub routing_key: String,
    pub timestamp: DateTime<Utc>,
    pub payload: PresentationEvent,
}

impl EventEnvelope {
    pub fn new(payload: PresentationEvent) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            routing_key: payload.kind().to_string(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Configuration for event publishing
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub publish_timeout_ms: u64,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 500,
            publish_timeout_ms: 5000,
        }
    }
}

impl From<&PresentationSettings> for PublisherConfig {
    fn from(settings: &PresentationSettings) -> Self {
        let defaults = Self::default();
        Self {
            max_retries: settings.max_retries,
            retry_delay_ms: if settings.retry_delay_ms == 0 {
                defaults.retry_delay_ms
            } else {
                settings.retry_delay_ms
            },
            publish_timeout_ms: defaults.publish_timeout_ms,
        }
    }
}

/// Publisher that only writes events to the log
#[derive(Debug, Default)]
pub struct LoggingEventPublisher;

impl LoggingEventPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventPublisher for LoggingEventPublisher {
    async fn publish_lobby_updated(&self, event: LobbyUpdated) -> Result<()> {
        info!(
            "Lobby {} updated ({:?}): {} {} on map {} in {}",
            event.lobby_id, event.change, event.league, event.mode, event.map, event.region
        );
        Ok(())
    }

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()> {
        info!(
            "Match {} started from lobby {} ({} {}, map {})",
            event.match_id, event.lobby_id, event.league, event.mode, event.map
        );
        Ok(())
    }

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()> {
        info!(
            "Match {} finished: {} ({} stats rows)",
            event.match_id,
            event.summary,
            event.changes.len()
        );
        Ok(())
    }

    async fn publish_match_abandoned(&self, event: MatchAbandoned) -> Result<()> {
        info!("Match {} abandoned: {}", event.match_id, event.reason);
        Ok(())
    }

    async fn publish_match_failed(&self, event: MatchFailed) -> Result<()> {
        warn!("Match {} failed: {}", event.match_id, event.message);
        Ok(())
    }
}

/// Publisher posting events to a presentation webhook
pub struct HttpEventPublisher {
    client: Client,
    webhook_url: String,
    config: PublisherConfig,
}

impl HttpEventPublisher {
    /// Create a new webhook publisher
    pub fn new(webhook_url: impl Into<String>, config: PublisherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.publish_timeout_ms))
            .build()
            .map_err(|e| MatchmakingError::ConfigurationError {
                message: format!("Failed to build webhook HTTP client: {}", e),
            })?;

        let webhook_url = webhook_url.into();
        info!("Publishing presentation events to {}", webhook_url);

        Ok(Self {
            client,
            webhook_url,
            config,
        })
    }

    /// Post an envelope with retry and exponential backoff
    async fn publish_with_retry(&self, envelope: &EventEnvelope) -> Result<()> {
        let mut retry_count = 0;
        let mut delay = Duration::from_millis(self.config.retry_delay_ms);

        loop {
            match self.try_publish(envelope).await {
                Ok(_) => {
                    debug!(
                        "Successfully published event {} ({})",
                        envelope.event_id, envelope.routing_key
                    );
                    return Ok(());
                }
                Err(e) => {
                    retry_count += 1;
                    if retry_count > self.config.max_retries {
                        error!(
                            "Failed to publish event {} after {} retries: {}",
                            envelope.event_id, self.config.max_retries, e
                        );
                        return Err(e);
                    }

                    warn!(
                        "Publish attempt {} failed for event {}: {}. Retrying in {:?}",
                        retry_count, envelope.event_id, e, delay
                    );

                    sleep(delay).await;
                    delay = Duration::from_millis((delay.as_millis() as u64 * 2).min(5000));
                }
            }
        }
    }

    /// Single publish attempt
    async fn try_publish(&self, envelope: &EventEnvelope) -> Result<()> {
        let response = self
            .client
            .post(&self.webhook_url)
            .json(envelope)
            .send()
            .await
            .map_err(|e| MatchmakingError::InternalError {
                message: format!("Failed to post event: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(MatchmakingError::InternalError {
                message: format!("Webhook answered {}", response.status()),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for HttpEventPublisher {
    async fn publish_lobby_updated(&self, event: LobbyUpdated) -> Result<()> {
        self.publish_with_retry(&EventEnvelope::new(PresentationEvent::LobbyUpdated(event)))
            .await
    }

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()> {
        self.publish_with_retry(&EventEnvelope::new(PresentationEvent::MatchStarted(event)))
            .await
    }

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()> {
        self.publish_with_retry(&EventEnvelope::new(PresentationEvent::MatchFinished(event)))
            .await
    }

    async fn publish_match_abandoned(&self, event: MatchAbandoned) -> Result<()> {
        self.publish_with_retry(&EventEnvelope::new(PresentationEvent::MatchAbandoned(event)))
            .await
    }

    async fn publish_match_failed(&self, event: MatchFailed) -> Result<()> {
        self.publish_with_retry(&EventEnvelope::new(PresentationEvent::MatchFailed(event)))
            .await
    }
}

/// Hand one event to the matching publisher method
pub async fn deliver(publisher: &dyn EventPublisher, event: PresentationEvent) -> Result<()> {
    match event {
        PresentationEvent::LobbyUpdated(event) => publisher.publish_lobby_updated(event).await,
        PresentationEvent::MatchStarted(event) => publisher.publish_match_started(event).await,
        PresentationEvent::MatchFinished(event) => publisher.publish_match_finished(event).await,
        PresentationEvent::MatchAbandoned(event) => publisher.publish_match_abandoned(event).await,
        PresentationEvent::MatchFailed(event) => publisher.publish_match_failed(event).await,
    }
}

/// Publisher that only enqueues events; an `EventQueue` task delivers them.
///
/// Publishing never waits on the downstream publisher. When the queue is
/// full the event is dropped and an error returned.
#[derive(Debug, Clone)]
pub struct QueuedEventPublisher {
    sender: mpsc::Sender<PresentationEvent>,
}

/// Receiving end of a `QueuedEventPublisher`
#[derive(Debug)]
pub struct EventQueue {
    receiver: mpsc::Receiver<PresentationEvent>,
}

impl QueuedEventPublisher {
    /// Create a publisher and the queue buffering up to `capacity` events
    pub fn new(capacity: usize) -> (Self, EventQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, EventQueue { receiver })
    }

    fn enqueue(&self, event: PresentationEvent) -> Result<()> {
        self.sender.try_send(event).map_err(|e| {
            let message = match e {
                TrySendError::Full(event) => {
                    format!("event queue is full, dropping {}", event.kind())
                }
                TrySendError::Closed(event) => {
                    format!("event queue is closed, dropping {}", event.kind())
                }
            };
            MatchmakingError::InternalError { message }.into()
        })
    }
}

#[async_trait]
impl EventPublisher for QueuedEventPublisher {
    async fn publish_lobby_updated(&self, event: LobbyUpdated) -> Result<()> {
        self.enqueue(PresentationEvent::LobbyUpdated(event))
    }

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()> {
        self.enqueue(PresentationEvent::MatchStarted(event))
    }

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()> {
        self.enqueue(PresentationEvent::MatchFinished(event))
    }

    async fn publish_match_abandoned(&self, event: MatchAbandoned) -> Result<()> {
        self.enqueue(PresentationEvent::MatchAbandoned(event))
    }

    async fn publish_match_failed(&self, event: MatchFailed) -> Result<()> {
        self.enqueue(PresentationEvent::MatchFailed(event))
    }
}

impl EventQueue {
    /// Deliver queued events to `publisher` until shutdown, then flush what
    /// is still buffered
    pub async fn run(
        mut self,
        publisher: Arc<dyn EventPublisher>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                event = self.receiver.recv() => match event {
                    Some(event) => Self::forward(publisher.as_ref(), event).await,
                    None => break,
                },
                _ = shutdown.recv() => {
                    self.receiver.close();
                    while let Ok(event) = self.receiver.try_recv() {
                        Self::forward(publisher.as_ref(), event).await;
                    }
                    break;
                }
            }
        }
        info!("Presentation event queue stopped");
    }

    pub fn spawn(
        self,
        publisher: Arc<dyn EventPublisher>,
        shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(publisher, shutdown))
    }

    async fn forward(publisher: &dyn EventPublisher, event: PresentationEvent) {
        let kind = event.kind();
        if let Err(e) = deliver(publisher, event).await {
            warn!("Failed to deliver {} event: {}", kind, e);
        }
    }
}

/// Mock event publisher for testing
#[derive(Debug, Default)]
pub struct MockEventPublisher {
    published_events: std::sync::Mutex<Vec<PresentationEvent>>,
}

impl MockEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, event: PresentationEvent) {
        if let Ok(mut events) = self.published_events.lock() {
            events.push(event);
        }
    }

    /// Routing names of all published events, in order (for testing)
    pub fn get_published_events(&self) -> Vec<String> {
        self.events()
            .iter()
            .map(|event| event.kind().to_string())
            .collect()
    }

    /// All published events, in order (for testing)
    pub fn events(&self) -> Vec<PresentationEvent> {
        self.published_events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Clear published events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.published_events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl EventPublisher for MockEventPublisher {
    async fn publish_lobby_updated(&self, event: LobbyUpdated) -> Result<()> {
        self.record(PresentationEvent::LobbyUpdated(event));
        Ok(())
    }

    async fn publish_match_started(&self, event: MatchStarted) -> Result<()> {
        self.record(PresentationEvent::MatchStarted(event));
        Ok(())
    }

    async fn publish_match_finished(&self, event: MatchFinished) -> Result<()> {
        self.record(PresentationEvent::MatchFinished(event));
        Ok(())
    }

    async fn publish_match_abandoned(&self, event: MatchAbandoned) -> Result<()> {
        self.record(PresentationEvent::MatchAbandoned(event));
        Ok(())
    }

    async fn publish_match_failed(&self, event: MatchFailed) -> Result<()> {
        self.record(PresentationEvent::MatchFailed(event));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed_event() -> MatchFailed {
        MatchFailed {
            match_id: "m1".to_string(),
            message: "Something went wrong".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_publisher_config_from_settings() {
        let config = PublisherConfig::from(&PresentationSettings::default());
        assert_eq!(config.max_retries, 0);
        assert_eq!(config.retry_delay_ms, 500);
    }

    #[test]
    fn test_envelope_routing_key() {
        let envelope = EventEnvelope::new(PresentationEvent::MatchFailed(failed_event()));
        assert_eq!(envelope.routing_key, "match.failed");
        assert!(!envelope.event_id.is_empty());

        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["payload"]["type"], "MatchFailed");
        assert_eq!(json["payload"]["match_id"], "m1");
    }

    #[tokio::test]
    async fn test_mock_publisher_records_events() {
        let publisher = MockEventPublisher::new();
        publisher.publish_match_failed(failed_event()).await.unwrap();
        assert_eq!(publisher.get_published_events(), vec!["match.failed"]);

        publisher.clear_events();
        assert!(publisher.events().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_gives_up_after_retries() {
        let publisher = HttpEventPublisher::new(
            "http://127.0.0.1:1/events",
            PublisherConfig {
                max_retries: 1,
                retry_delay_ms: 1,
                publish_timeout_ms: 500,
            },
        )
        .unwrap();

        assert!(publisher.publish_match_failed(failed_event()).await.is_err());
    }

    #[tokio::test]
    async fn test_queued_publisher_does_not_wait_for_delivery() {
        let webhook = Arc::new(
            HttpEventPublisher::new(
                "http://127.0.0.1:1/events",
                PublisherConfig {
                    max_retries: 3,
                    retry_delay_ms: 500,
                    publish_timeout_ms: 500,
                },
            )
            .unwrap(),
        );
        let (publisher, queue) = QueuedEventPublisher::new(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let handle = queue.spawn(webhook, shutdown_rx);

        let started = std::time::Instant::now();
        publisher.publish_match_failed(failed_event()).await.unwrap();
        publisher.publish_match_failed(failed_event()).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));

        shutdown_tx.send(()).unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn test_queued_publisher_delivers_in_order() {
        let sink = Arc::new(MockEventPublisher::new());
        let (publisher, queue) = QueuedEventPublisher::new(8);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        publisher.publish_match_failed(failed_event()).await.unwrap();
        publisher
            .publish_match_abandoned(MatchAbandoned {
                match_id: "m1".to_string(),
                lobby_id: Uuid::new_v4(),
                reason: "abandoned".to_string(),
                teams: vec![],
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        // Buffered events are flushed on shutdown
        shutdown_tx.send(()).unwrap();
        queue.run(sink.clone(), shutdown_rx).await;

        assert_eq!(
            sink.get_published_events(),
            vec!["match.failed", "match.abandoned"]
        );
    }

    #[tokio::test]
    async fn test_full_queue_drops_events() {
        let (publisher, _queue) = QueuedEventPublisher::new(1);
        publisher.publish_match_failed(failed_event()).await.unwrap();
        assert!(publisher.publish_match_failed(failed_event()).await.is_err());
    }
}
