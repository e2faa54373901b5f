//! Error types for the scrim-room service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application. `MatchmakingError` carries the domain failures and
//! `ErrorKind` groups them the way callers react to them.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Broad classification of a failure, used by callers to decide how to react
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected request; nothing was mutated
    Validation,
    /// The external match service could not be reached or refused the call
    ServiceUnavailable,
    /// The referenced lobby or match no longer exists
    StaleReference,
    /// Writing results to the persistence store failed
    PersistenceFailure,
    /// Anything else
    Internal,
}

/// Custom error types for specific matchmaking scenarios
#[derive(Debug, thiserror::Error)]
pub enum MatchmakingError {
    #[error("Team {team} is full in lobby {lobby_id}")]
    TeamFull { lobby_id: String, team: String },

    #[error("Player {member_id} is already seated in {container}")]
    AlreadySeated { member_id: u64, container: String },

    #[error("Player {member_id} is not registered")]
    NotRegistered { member_id: u64 },

    #[error("Player {member_id} is not present in any team")]
    PlayerNotFound { member_id: u64 },

    #[error("Player {member_id} is not allowed to {action}")]
    NotAuthorized { member_id: u64, action: String },

    #[error("Lobby {lobby_id} is not ready: {reason}")]
    LobbyNotReady { lobby_id: String, reason: String },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Lobby not found: {lobby_id}")]
    LobbyNotFound { lobby_id: String },

    #[error("Match not found: {match_id}")]
    MatchNotFound { match_id: String },

    #[error("Match service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Persistence failure: {message}")]
    PersistenceFailure { message: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl MatchmakingError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MatchmakingError::TeamFull { .. }
            | MatchmakingError::AlreadySeated { .. }
            | MatchmakingError::NotRegistered { .. }
            | MatchmakingError::PlayerNotFound { .. }
            | MatchmakingError::NotAuthorized { .. }
            | MatchmakingError::LobbyNotReady { .. }
            | MatchmakingError::InvalidRequest { .. } => ErrorKind::Validation,
            MatchmakingError::LobbyNotFound { .. } | MatchmakingError::MatchNotFound { .. } => {
                ErrorKind::StaleReference
            }
            MatchmakingError::ServiceUnavailable { .. } => ErrorKind::ServiceUnavailable,
            MatchmakingError::PersistenceFailure { .. } => ErrorKind::PersistenceFailure,
            MatchmakingError::ConfigurationError { .. } | MatchmakingError::InternalError { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

/// Classify an `anyhow::Error`, falling back to `Internal` for foreign errors
pub fn error_kind(error: &anyhow::Error) -> ErrorKind {
    error
        .downcast_ref::<MatchmakingError>()
        .map(MatchmakingError::kind)
        .unwrap_or(ErrorKind::Internal)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = MatchmakingError::TeamFull {
            lobby_id: "l1".to_string(),
            team: "A".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = MatchmakingError::MatchNotFound {
            match_id: "m1".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::StaleReference);

        let err: anyhow::Error = MatchmakingError::ServiceUnavailable {
            message: "timeout".to_string(),
        }
        .into();
        assert_eq!(error_kind(&err), ErrorKind::ServiceUnavailable);

        let foreign = anyhow::anyhow!("boom");
        assert_eq!(error_kind(&foreign), ErrorKind::Internal);
    }

    #[test]
    fn test_error_messages() {
        let err = MatchmakingError::PlayerNotFound { member_id: 42 };
        assert_eq!(err.to_string(), "Player 42 is not present in any team");
    }
}
