//! Health checks and monitoring
//!
//! This module provides health check functionality for the scrim-room
//! service, including readiness and liveness checks.

use crate::lobby::LobbyManager;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error};

/// Health check status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Value exported through the health gauge
    pub fn as_gauge(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 2,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 0,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// What the health endpoints need to look at a running service
#[derive(Clone)]
pub struct ServiceHandle {
    pub name: String,
    pub manager: LobbyManager,
    pub is_running: Arc<RwLock<bool>>,
    pub started_at: Instant,
}

impl ServiceHandle {
    pub fn new(name: impl Into<String>, manager: LobbyManager, is_running: Arc<RwLock<bool>>) -> Self {
        Self {
            name: name.into(),
            manager,
            is_running,
            started_at: Instant::now(),
        }
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    pub version: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    pub name: String,
    pub status: HealthStatus,
    /// Optional error message if unhealthy
    pub message: Option<String>,
    /// Check duration in milliseconds
    pub duration_ms: u64,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub active_lobbies: usize,
    pub active_matches: usize,
    pub players_waiting: usize,
    pub matches_started: u64,
    pub matches_finished: u64,
    pub matches_abandoned: u64,
    pub uptime_seconds: u64,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(handle: &ServiceHandle) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(handle).await;
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let lobby_check = Self::check_lobby_manager(handle).await;
        if lobby_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if lobby_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(lobby_check);

        let stats = Self::gather_service_stats(handle).await;

        let metrics = handle.manager.metrics();
        metrics.update_health_status(overall_status.as_gauge());
        for check in &checks {
            metrics.update_component_health(&check.name, check.status == HealthStatus::Healthy);
        }

        Ok(HealthCheck {
            status: overall_status,
            service: handle.name.clone(),
            version: crate::VERSION.to_string(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Simple liveness check - just verify service is running
    pub async fn liveness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if handle.is_running().await {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness check - verify service can handle requests
    pub async fn readiness_check(handle: &ServiceHandle) -> Result<HealthStatus> {
        if !handle.is_running().await {
            return Ok(HealthStatus::Unhealthy);
        }

        Ok(Self::check_lobby_manager(handle).await.status)
    }

    async fn check_service_running(handle: &ServiceHandle) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = if handle.is_running().await {
            (HealthStatus::Healthy, None)
        } else {
            (
                HealthStatus::Unhealthy,
                Some("Service is not running".to_string()),
            )
        };

        ComponentCheck {
            name: "service_running".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn check_lobby_manager(handle: &ServiceHandle) -> ComponentCheck {
        let start = Instant::now();

        let (status, message) = match handle.manager.get_stats().await {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e) => {
                error!("Lobby manager stats check failed: {}", e);
                (
                    HealthStatus::Degraded,
                    Some(format!("Stats check failed: {}", e)),
                )
            }
        };

        ComponentCheck {
            name: "lobby_manager".to_string(),
            status,
            message,
            duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn gather_service_stats(handle: &ServiceHandle) -> ServiceStats {
        let uptime_seconds = handle.started_at.elapsed().as_secs();

        match handle.manager.get_stats().await {
            Ok(stats) => ServiceStats {
                active_lobbies: stats.active_lobbies,
                active_matches: stats.active_matches,
                players_waiting: stats.players_waiting,
                matches_started: stats.matches_started,
                matches_finished: stats.matches_finished,
                matches_abandoned: stats.matches_abandoned,
                uptime_seconds,
            },
            Err(e) => {
                debug!("Failed to get lobby stats for health check: {}", e);
                ServiceStats {
                    uptime_seconds,
                    ..ServiceStats::default()
                }
            }
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize health check: {}", e))
    }
}
