//! Scrim Room - lobby and match coordination for rated team scrims
//!
//! This crate seats players into lobbies behind a rating gate, hands full
//! lobbies to an external match service, and reconciles finished or abandoned
//! matches back into per-league ratings and match history.

pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod lobby;
pub mod match_service;
pub mod matches;
pub mod metrics;
pub mod rating;
pub mod service;
pub mod store;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{MatchmakingError, Result};
pub use types::*;

// Re-export key components
pub use events::EventPublisher;
pub use lobby::{LobbyManager, LobbyRegistry};
pub use match_service::MatchServiceClient;
pub use matches::{MatchRegistry, TimeoutWatchdog};
pub use store::PersistenceStore;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
