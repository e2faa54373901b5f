//! Rating system
//!
//! This module provides the integer rating engine used to settle competitive
//! matches and to gate admission into matchmaking teams.

pub mod engine;

// Re-export commonly used types
pub use engine::{average_rating, map_value, RatingEngine};
