//! Match service integration
//!
//! Outbound client used to create and poll matches, and the wire types shared
//! with the inbound completion callback.

pub mod client;
pub mod messages;

pub use client::{HttpMatchServiceClient, MatchServiceClient};
pub use messages::{
    CreateMatchRequest, MatchEnvelope, MatchInfo, MatchPlayerInfo, MatchTeamInfo, NumberOrString,
    PlayerMatchStats, RosterPlayer, TeamRoster,
};

#[cfg(test)]
pub use client::MockMatchServiceClient;
