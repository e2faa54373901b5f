//! Rating system configuration

use serde::{Deserialize, Serialize};

/// Constants driving the rating gate and rating adjustments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingConfig {
    /// Maximum accepted distance between a candidate and a team average (T)
    pub gate_threshold: i64,
    /// Largest upset bonus or expected-outcome reduction (K)
    pub bonus_cap: i64,
    /// Rating exchanged for a plain win or loss
    pub base_rate: i64,
    /// Rating a newly registered player starts with
    pub initial_rating: i64,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            gate_threshold: 500,
            bonus_cap: 20,
            base_rate: 30,
            initial_rating: 2000,
        }
    }
}

impl RatingConfig {
    /// Reject nonsensical constant combinations
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.gate_threshold <= 0 {
            return Err(anyhow::anyhow!("Rating gate threshold must be positive"));
        }
        if self.bonus_cap < 0 {
            return Err(anyhow::anyhow!("Rating bonus cap cannot be negative"));
        }
        if self.base_rate <= self.bonus_cap {
            return Err(anyhow::anyhow!(
                "Base rate ({}) must exceed the bonus cap ({})",
                self.base_rate,
                self.bonus_cap
            ));
        }
        Ok(())
    }
}
