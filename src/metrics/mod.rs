//! Metrics for the scrim-room matchmaking service
//!
//! Prometheus counters, gauges and histograms for lobbies, matches, the match
//! service and the watchdog.

pub mod collector;

pub use collector::{
    LobbyMetrics, MatchMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, PlayerMetrics,
    ServiceMetrics,
};
