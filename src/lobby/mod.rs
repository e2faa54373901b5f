//! Lobby management for the matchmaking service
//!
//! This module handles lobby creation, seating, the rating gate and the
//! hand-off of full lobbies to the match service. It supports matchmaking
//! lobbies filled by the gate matcher and custom lobbies run by their creator.

pub mod instance;
pub mod manager;
pub mod matching;
pub mod registry;
pub mod team;

// Re-export commonly used types
pub use instance::{
    Lobby, LobbyKind, LobbyState, LobbyTemplate, Seat, SettleOutcome, Settlement,
};
pub use manager::{CallbackOutcome, LobbyManager, LobbyManagerStats};
pub use matching::{GateMatcher, MatchingResult};
pub use registry::{Departure, LobbyRegistry, Placement, StartRequester};
pub use team::{LobbyPlayer, Team};
