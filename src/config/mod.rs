//! Configuration management for the scrim-room service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values.

pub mod app;
pub mod league;
pub mod rating;

// Re-export commonly used types
pub use app::{
    validate_config, AppConfig, MatchServiceSettings, MatchmakingSettings, PresentationSettings,
    ServiceSettings,
};
pub use league::{default_leagues, LeagueSettings};
pub use rating::RatingConfig;
