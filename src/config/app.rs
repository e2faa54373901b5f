//! Main application configuration
//!
//! This module defines the primary configuration structures for the scrim-room
//! service, including environment variable loading, TOML files and validation.

use crate::config::rating::RatingConfig;
use crate::types::MapId;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Default map pool used when a search does not name one
pub const DEFAULT_MAP_POOL: [MapId; 15] = [
    232, 724, 698, 690, 752, 682, 449, 275, 276, 748, 120, 131, 132, 234, 191,
];

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub match_service: MatchServiceSettings,
    pub presentation: PresentationSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host the HTTP server binds to
    pub http_host: String,
    /// Port for the callback, health and metrics endpoints
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// External match service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchServiceSettings {
    /// Base URL of the match service API
    pub base_url: String,
    /// Public URL the match service posts completion callbacks to
    pub callback_url: String,
    /// Per-request timeout in seconds
    pub request_timeout_seconds: u64,
}

/// Presentation collaborator settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationSettings {
    /// Webhook receiving lifecycle events; events are only logged when unset
    pub webhook_url: Option<String>,
    /// Maximum retry attempts for failed deliveries
    pub max_retries: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Events buffered for delivery before new ones are dropped
    pub queue_capacity: usize,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakingSettings {
    /// Maximum rating distance accepted by the rating gate
    pub rating_gate_threshold: i64,
    /// Cap of the rating bonus
    pub rating_bonus_cap: i64,
    /// Rating exchanged for a plain win or loss
    pub rating_base_rate: i64,
    /// Starting rating of newly registered players
    pub initial_rating: i64,
    /// Interval between watchdog sweeps in seconds
    pub watchdog_interval_seconds: u64,
    /// How long a match may stay pending before it is abandoned
    pub pending_grace_seconds: u64,
    /// Upper bound of the pause between two polls of one sweep
    pub poll_jitter_max_ms: u64,
    /// Maps offered when a search does not specify a pool
    pub map_pool: Vec<MapId>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "scrim-room".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for MatchServiceSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000".to_string(),
            callback_url: "http://localhost:8080/matchCallback".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl Default for PresentationSettings {
    fn default() -> Self {
        Self {
            webhook_url: None,
            max_retries: 0,
            retry_delay_ms: 500,
            queue_capacity: 1024,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        let rating = RatingConfig::default();
        Self {
            rating_gate_threshold: rating.gate_threshold,
            rating_bonus_cap: rating.bonus_cap,
            rating_base_rate: rating.base_rate,
            initial_rating: rating.initial_rating,
            watchdog_interval_seconds: 15,
            pending_grace_seconds: 120,
            poll_jitter_max_ms: 300,
            map_pool: DEFAULT_MAP_POOL.to_vec(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env()?;
        validate_config(&config)?;
        Ok(config)
    }

    fn apply_env(&mut self) -> Result<()> {
        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            self.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            self.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            self.service.http_host = host;
        }
        if let Ok(port) = env::var("HTTP_PORT") {
            self.service.http_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HTTP_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            self.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Match service settings
        if let Ok(url) = env::var("MATCH_SERVICE_URL") {
            self.match_service.base_url = url;
        }
        if let Ok(url) = env::var("CALLBACK_URL") {
            self.match_service.callback_url = url;
        }
        if let Ok(timeout) = env::var("MATCH_SERVICE_TIMEOUT_SECONDS") {
            self.match_service.request_timeout_seconds = timeout.parse().map_err(|_| {
                anyhow!("Invalid MATCH_SERVICE_TIMEOUT_SECONDS value: {}", timeout)
            })?;
        }

        // Presentation settings
        if let Ok(url) = env::var("PRESENTATION_WEBHOOK_URL") {
            self.presentation.webhook_url = Some(url);
        }
        if let Ok(retries) = env::var("PRESENTATION_MAX_RETRIES") {
            self.presentation.max_retries = retries
                .parse()
                .map_err(|_| anyhow!("Invalid PRESENTATION_MAX_RETRIES value: {}", retries))?;
        }

        // Matchmaking settings
        if let Ok(threshold) = env::var("RATING_GATE_THRESHOLD") {
            self.matchmaking.rating_gate_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("Invalid RATING_GATE_THRESHOLD value: {}", threshold))?;
        }
        if let Ok(interval) = env::var("WATCHDOG_INTERVAL_SECONDS") {
            self.matchmaking.watchdog_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid WATCHDOG_INTERVAL_SECONDS value: {}", interval))?;
        }
        if let Ok(grace) = env::var("PENDING_GRACE_SECONDS") {
            self.matchmaking.pending_grace_seconds = grace
                .parse()
                .map_err(|_| anyhow!("Invalid PENDING_GRACE_SECONDS value: {}", grace))?;
        }
        if let Ok(jitter) = env::var("POLL_JITTER_MAX_MS") {
            self.matchmaking.poll_jitter_max_ms = jitter
                .parse()
                .map_err(|_| anyhow!("Invalid POLL_JITTER_MAX_MS value: {}", jitter))?;
        }

        Ok(())
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get match service request timeout as Duration
    pub fn match_service_timeout(&self) -> Duration {
        Duration::from_secs(self.match_service.request_timeout_seconds)
    }

    /// Get watchdog interval as Duration
    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.matchmaking.watchdog_interval_seconds)
    }

    /// Get pending grace period as Duration
    pub fn pending_grace(&self) -> Duration {
        Duration::from_secs(self.matchmaking.pending_grace_seconds)
    }

    /// Rating constants derived from the matchmaking settings
    pub fn rating_config(&self) -> RatingConfig {
        RatingConfig {
            gate_threshold: self.matchmaking.rating_gate_threshold,
            bonus_cap: self.matchmaking.rating_bonus_cap,
            base_rate: self.matchmaking.rating_base_rate,
            initial_rating: self.matchmaking.initial_rating,
        }
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.http_port == 0 {
        return Err(anyhow!("HTTP port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.match_service.request_timeout_seconds == 0 {
        return Err(anyhow!("Match service timeout must be greater than 0"));
    }

    // Validate match service settings
    if config.match_service.base_url.is_empty() {
        return Err(anyhow!("Match service URL cannot be empty"));
    }
    if config.match_service.callback_url.is_empty() {
        return Err(anyhow!("Callback URL cannot be empty"));
    }

    if config.presentation.queue_capacity == 0 {
        return Err(anyhow!("Presentation queue capacity must be greater than 0"));
    }

    // Validate matchmaking settings
    if config.matchmaking.watchdog_interval_seconds == 0 {
        return Err(anyhow!("Watchdog interval must be greater than 0"));
    }
    if config.matchmaking.map_pool.is_empty() {
        return Err(anyhow!("Map pool cannot be empty"));
    }
    config.rating_config().validate()?;

    Ok(())
}
