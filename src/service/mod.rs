//! Service layer for the scrim-room service
//!
//! This module contains the main application state, service coordination,
//! health checks and background task management.

pub mod app;
pub mod health;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus, ServiceHandle};
