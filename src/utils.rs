//! Utility functions for the scrim-room service

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use uuid::Uuid;

/// Generate a new unique lobby ID
pub fn generate_lobby_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Random pause in `[0, max_ms]` milliseconds used to spread out polling
pub fn random_jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_unique_ids() {
        let id1 = generate_lobby_id();
        let id2 = generate_lobby_id();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_random_jitter_bounds() {
        assert_eq!(random_jitter(0), Duration::ZERO);
        for _ in 0..100 {
            assert!(random_jitter(300) <= Duration::from_millis(300));
        }
    }
}
