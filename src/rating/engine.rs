//! Integer rating adjustments and the rating gate
//!
//! A plain win or loss moves `base_rate` points. On top of that a bonus in
//! `[-K, K]` scales with the distance between the player's rating and the
//! opposing team's average: expected outcomes are rewarded less, upsets more.
//! Players further than `T` from the opposing average always receive `-K`.

use crate::config::RatingConfig;

/// Linearly map `x` from `[in_min, in_max]` onto `[out_min, out_max]`
pub fn map_value(x: f64, in_min: f64, in_max: f64, out_min: f64, out_max: f64) -> f64 {
    (x - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}

/// Floor of the mean rating, 0 for an empty team
pub fn average_rating<I>(ratings: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    let (sum, count) = ratings
        .into_iter()
        .fold((0i64, 0i64), |(sum, count), rating| (sum + rating, count + 1));

    if count == 0 {
        0
    } else {
        sum.div_euclid(count)
    }
}

/// Pure rating calculator parameterised by `RatingConfig`
#[derive(Debug, Clone, Copy, Default)]
pub struct RatingEngine {
    config: RatingConfig,
}

impl RatingEngine {
    pub fn new(config: RatingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RatingConfig {
        &self.config
    }

    /// Unsigned bonus magnitude for a rating distance, capped at K
    pub fn bonus(&self, diff: i64) -> f64 {
        let threshold = self.config.gate_threshold as f64;
        let cap = self.config.bonus_cap as f64;
        let distance = (diff.abs() as f64).min(threshold);
        cap.min(map_value(distance, 0.0, threshold, 0.0, cap))
    }

    /// Signed bonus applied on top of the base rate
    pub fn signed_bonus(&self, diff: i64, won: bool) -> i64 {
        if diff.abs() > self.config.gate_threshold {
            return -self.config.bonus_cap;
        }

        let bonus = self.bonus(diff).round_ties_even() as i64;
        let expected_outcome = (diff < 0 && !won) || (diff > 0 && won);
        if expected_outcome {
            -bonus
        } else {
            bonus
        }
    }

    /// Rating change for one player after a decided match
    pub fn rating_delta(&self, player_rating: i64, opponent_avg_rating: i64, won: bool) -> i64 {
        let diff = player_rating - opponent_avg_rating;
        let magnitude = self.config.base_rate + self.signed_bonus(diff, won);
        if won {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Whether a candidate may join a team with the given average.
    ///
    /// Empty teams (average 0) accept everyone; the boundary is inclusive.
    pub fn passes_gate(&self, candidate_rating: i64, team_average: i64) -> bool {
        team_average == 0 || (candidate_rating - team_average).abs() <= self.config.gate_threshold
    }
}
