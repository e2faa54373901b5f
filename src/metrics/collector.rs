//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the scrim-room matchmaking
//! service using Prometheus metrics.

use crate::lobby::manager::LobbyManagerStats;
use crate::types::{GameMode, League};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts,
    Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the matchmaking service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Lobby-related metrics
    lobby_metrics: LobbyMetrics,

    /// Match-related metrics
    match_metrics: MatchMetrics,

    /// Player-related metrics
    player_metrics: PlayerMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Completion callbacks received, by outcome
    pub callbacks_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Lobby-related metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Number of waiting lobbies
    pub active_lobbies: IntGauge,

    /// Total lobbies created by kind
    pub lobbies_created_total: IntCounterVec,

    /// Total custom lobbies cancelled by their creator
    pub lobbies_cancelled_total: IntCounter,

    /// Failed start attempts
    pub start_failures_total: IntCounter,
}

/// Match-related metrics
#[derive(Clone)]
pub struct MatchMetrics {
    /// Matches currently tracked
    pub active_matches: IntGauge,

    /// Total matches started by league
    pub matches_started_total: IntCounterVec,

    /// Total matches settled by league
    pub matches_finished_total: IntCounterVec,

    /// Total matches abandoned by reason
    pub matches_abandoned_total: IntCounterVec,

    /// Matches whose reconciliation failed
    pub matches_failed_total: IntCounter,

    /// Match service calls by operation and status
    pub match_service_requests_total: IntCounterVec,

    /// Match service call latency
    pub match_service_duration: HistogramVec,
}

/// Player-related metrics
#[derive(Clone)]
pub struct PlayerMetrics {
    /// Total matchmaking requests
    pub players_queued_total: IntCounterVec,

    /// Players seated in waiting lobbies
    pub players_waiting: IntGauge,

    /// Applied rating changes
    pub rating_delta: Histogram,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Matchmaking request processing time
    pub queue_processing_duration: Histogram,

    /// Watchdog sweep duration
    pub sweep_duration: Histogram,

    /// Lobby operation durations
    pub lobby_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let match_metrics = MatchMetrics::new(&registry)?;
        let player_metrics = PlayerMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lobby_metrics,
            match_metrics,
            player_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get lobby metrics
    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    /// Get match metrics
    pub fn matches(&self) -> &MatchMetrics {
        &self.match_metrics
    }

    /// Get player metrics
    pub fn player(&self) -> &PlayerMetrics {
        &self.player_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Update gauges from lobby manager stats
    pub fn update_from_lobby_stats(&self, stats: &LobbyManagerStats) {
        self.lobby_metrics
            .active_lobbies
            .set(stats.active_lobbies as i64);
        self.match_metrics
            .active_matches
            .set(stats.active_matches as i64);
        self.player_metrics
            .players_waiting
            .set(stats.players_waiting as i64);
    }

    /// Record a matchmaking request being processed
    pub fn record_queue_request(&self, league: League, mode: GameMode, duration: Duration) {
        self.player_metrics
            .players_queued_total
            .with_label_values(&[league.as_str(), mode.as_str()])
            .inc();

        self.performance_metrics
            .queue_processing_duration
            .observe(duration.as_secs_f64());
    }

    /// Record a lobby being created
    pub fn record_lobby_created(&self, custom: bool) {
        let kind = if custom { "custom" } else { "matchmaking" };
        self.lobby_metrics
            .lobbies_created_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record a custom lobby being cancelled
    pub fn record_lobby_cancelled(&self) {
        self.lobby_metrics.lobbies_cancelled_total.inc();
    }

    /// Record a failed start attempt
    pub fn record_start_failure(&self) {
        self.lobby_metrics.start_failures_total.inc();
    }

    /// Record a match starting
    pub fn record_match_started(&self, league: League) {
        self.match_metrics
            .matches_started_total
            .with_label_values(&[league.as_str()])
            .inc();
    }

    /// Record a settled match and its rating changes
    pub fn record_match_finished(&self, league: League, rating_deltas: &[i64]) {
        self.match_metrics
            .matches_finished_total
            .with_label_values(&[league.as_str()])
            .inc();

        for delta in rating_deltas.iter().filter(|delta| **delta != 0) {
            self.player_metrics.rating_delta.observe(*delta as f64);
        }
    }

    /// Record an abandoned match
    pub fn record_match_abandoned(&self, reason: &str) {
        self.match_metrics
            .matches_abandoned_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a match whose reconciliation failed
    pub fn record_match_failed(&self) {
        self.match_metrics.matches_failed_total.inc();
    }

    /// Record a match service call
    pub fn record_match_service_call(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.match_metrics
            .match_service_requests_total
            .with_label_values(&[operation, status])
            .inc();

        self.match_metrics
            .match_service_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Record a completion callback
    pub fn record_callback(&self, outcome: &str) {
        self.service_metrics
            .callbacks_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Record a watchdog sweep
    pub fn record_sweep(&self, duration: Duration) {
        self.performance_metrics
            .sweep_duration
            .observe(duration.as_secs_f64());
    }

    /// Record lobby operation duration
    pub fn record_lobby_operation(&self, operation: &str, duration: Duration) {
        self.performance_metrics
            .lobby_operation_duration
            .with_label_values(&[operation])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("scrim_room_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let callbacks_total = IntCounterVec::new(
            Opts::new(
                "scrim_room_callbacks_total",
                "Match completion callbacks received",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(callbacks_total.clone()))?;

        let health_status = IntGauge::new(
            "scrim_room_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("scrim_room_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            callbacks_total,
            health_status,
            component_health,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies =
            IntGauge::new("scrim_room_active_lobbies", "Number of waiting lobbies")?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let lobbies_created_total = IntCounterVec::new(
            Opts::new("scrim_room_lobbies_created_total", "Total lobbies created"),
            &["kind"],
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_cancelled_total = IntCounter::new(
            "scrim_room_lobbies_cancelled_total",
            "Total custom lobbies cancelled",
        )?;
        registry.register(Box::new(lobbies_cancelled_total.clone()))?;

        let start_failures_total = IntCounter::new(
            "scrim_room_start_failures_total",
            "Lobby start attempts rejected by the match service",
        )?;
        registry.register(Box::new(start_failures_total.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            lobbies_cancelled_total,
            start_failures_total,
        })
    }
}

impl MatchMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_matches =
            IntGauge::new("scrim_room_active_matches", "Number of tracked matches")?;
        registry.register(Box::new(active_matches.clone()))?;

        let matches_started_total = IntCounterVec::new(
            Opts::new("scrim_room_matches_started_total", "Total matches started"),
            &["league"],
        )?;
        registry.register(Box::new(matches_started_total.clone()))?;

        let matches_finished_total = IntCounterVec::new(
            Opts::new("scrim_room_matches_finished_total", "Total matches settled"),
            &["league"],
        )?;
        registry.register(Box::new(matches_finished_total.clone()))?;

        let matches_abandoned_total = IntCounterVec::new(
            Opts::new(
                "scrim_room_matches_abandoned_total",
                "Total matches abandoned",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(matches_abandoned_total.clone()))?;

        let matches_failed_total = IntCounter::new(
            "scrim_room_matches_failed_total",
            "Matches whose reconciliation failed",
        )?;
        registry.register(Box::new(matches_failed_total.clone()))?;

        let match_service_requests_total = IntCounterVec::new(
            Opts::new(
                "scrim_room_match_service_requests_total",
                "Match service requests",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(match_service_requests_total.clone()))?;

        let match_service_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrim_room_match_service_duration_seconds",
                "Match service request duration",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(match_service_duration.clone()))?;

        Ok(Self {
            active_matches,
            matches_started_total,
            matches_finished_total,
            matches_abandoned_total,
            matches_failed_total,
            match_service_requests_total,
            match_service_duration,
        })
    }
}

impl PlayerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let players_queued_total = IntCounterVec::new(
            Opts::new("scrim_room_players_queued_total", "Total matchmaking requests"),
            &["league", "mode"],
        )?;
        registry.register(Box::new(players_queued_total.clone()))?;

        let players_waiting = IntGauge::new(
            "scrim_room_players_waiting",
            "Players seated in waiting lobbies",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let rating_delta = Histogram::with_opts(
            HistogramOpts::new("scrim_room_rating_delta", "Applied rating changes").buckets(vec![
                -50.0, -40.0, -30.0, -20.0, -10.0, 10.0, 20.0, 30.0, 40.0, 50.0,
            ]),
        )?;
        registry.register(Box::new(rating_delta.clone()))?;

        Ok(Self {
            players_queued_total,
            players_waiting,
            rating_delta,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let queue_processing_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scrim_room_queue_processing_duration_seconds",
                "Matchmaking request processing time",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;
        registry.register(Box::new(queue_processing_duration.clone()))?;

        let sweep_duration = Histogram::with_opts(
            HistogramOpts::new(
                "scrim_room_watchdog_sweep_duration_seconds",
                "Watchdog sweep duration",
            )
            .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0]),
        )?;
        registry.register(Box::new(sweep_duration.clone()))?;

        let lobby_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "scrim_room_lobby_operation_duration_seconds",
                "Lobby operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
            &["operation"],
        )?;
        registry.register(Box::new(lobby_operation_duration.clone()))?;

        Ok(Self {
            queue_processing_duration,
            sweep_duration,
            lobby_operation_duration,
        })
    }
}
