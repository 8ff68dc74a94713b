//! Optimistic Elo rating estimator
//!
//! Mirrors the backend's Elo update so a result card can show the rating
//! movement before the authoritative response arrives. Values produced here
//! are for display only and are never sent to the backend.
//!
//! - K-factor is banded on the subject's own pre-duel rating:
//!   40 up to 1200, 20 up to 1800, 10 above.
//! - Both sides are evaluated against the opponent's *pre-duel* rating, so
//!   the order in which the two estimates are computed does not matter.
//! - Results are rounded and never drop below [`RATING_FLOOR`].

/// Lowest rating an estimate can produce
pub const RATING_FLOOR: i32 = 600;

/// Rating assumed for a moment the backend sent without one
pub const DEFAULT_RATING: f64 = 1200.0;

/// Elo logistic scale
const ELO_SCALE: f64 = 400.0;

/// K-factor for a subject with the given pre-duel rating
pub fn k_factor(rating: f64) -> f64 {
    if rating <= 1200.0 {
        40.0
    } else if rating <= 1800.0 {
        20.0
    } else {
        10.0
    }
}

/// Probability that a subject rated `rating` beats one rated `opponent`
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / ELO_SCALE))
}

/// Estimated rating after one duel
///
/// # Arguments
/// * `rating` - subject's pre-duel rating
/// * `opponent` - opponent's pre-duel rating
/// * `won` - whether the subject won the duel
pub fn estimate_after(rating: f64, opponent: f64, won: bool) -> i32 {
    let actual = if won { 1.0 } else { 0.0 };
    let updated = rating + k_factor(rating) * (actual - expected_score(rating, opponent));
    (updated.round() as i32).max(RATING_FLOOR)
}

/// Both sides of one decided duel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuelEstimate {
    pub winner_after: i32,
    pub loser_after: i32,
}

/// Estimate both post-duel ratings from the two pre-duel ratings
pub fn estimate_duel(winner_before: f64, loser_before: f64) -> DuelEstimate {
    DuelEstimate {
        winner_after: estimate_after(winner_before, loser_before, true),
        loser_after: estimate_after(loser_before, winner_before, false),
    }
}
