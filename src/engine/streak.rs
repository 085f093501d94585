//! Consecutive-success streak tracking per (user, contest) scope.
//!
//! The tracker is a small state machine over the ordered sequence of graded
//! predictions in a scope. The multiplier applied to the prediction being
//! graded comes from the streak *after* the update.

use crate::domain::Points;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether zero-point risky outcomes keep a streak alive.
///
/// In the default mode a risky grade of exactly zero does not break the
/// streak; strict mode requires strictly positive points everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakMode {
    Default,
    Strict,
}

impl std::str::FromStr for StreakMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(StreakMode::Default),
            "strict" => Ok(StreakMode::Strict),
            other => Err(format!("unknown streak mode: {}", other)),
        }
    }
}

impl StreakMode {
    /// Classify a graded prediction as streak-sustaining or streak-breaking.
    pub fn is_successful(&self, base_points: Points, risky: bool) -> bool {
        match self {
            StreakMode::Default if risky => !base_points.is_negative(),
            _ => base_points.is_positive(),
        }
    }
}

/// Multiplier for a given current streak length (post-update).
pub fn streak_multiplier(current_streak: i64) -> Points {
    match current_streak {
        i64::MIN..=2 => Points::one(),
        3..=4 => Points::from_parts(125, 2),
        5..=6 => Points::from_parts(15, 1),
        7..=9 => Points::from_parts(175, 2),
        _ => Points::from_parts(20, 1),
    }
}

/// Per (user, contest) streak state.
///
/// Invariants: `current_streak <= max_streak`; `max_streak` never decreases.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakState {
    pub current_streak: i64,
    pub max_streak: i64,
    pub last_prediction: Option<DateTime<Utc>>,
    pub last_correct: Option<DateTime<Utc>>,
}

impl StreakState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one graded prediction into the state and return the multiplier
    /// that applies to it.
    ///
    /// Callers must apply predictions in `scored_at` order within a scope.
    pub fn apply(&mut self, successful: bool, scored_at: DateTime<Utc>) -> Points {
        self.last_prediction = Some(scored_at);
        if successful {
            self.current_streak += 1;
            self.max_streak = self.max_streak.max(self.current_streak);
            self.last_correct = Some(scored_at);
        } else {
            self.current_streak = 0;
        }
        streak_multiplier(self.current_streak)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(n: i64) -> DateTime<Utc> {
        chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 1, 0, 0, 0).unwrap()
            + chrono::Duration::minutes(n)
    }

    #[test]
    fn test_success_increments_and_ratchets_max() {
        let mut state = StreakState::new();
        state.apply(true, at(0));
        state.apply(true, at(1));
        assert_eq!(state.current_streak, 2);
        assert_eq!(state.max_streak, 2);

        state.apply(false, at(2));
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.max_streak, 2, "max_streak never decreases");
        assert_eq!(state.last_correct, Some(at(1)));
        assert_eq!(state.last_prediction, Some(at(2)));
    }

    #[test]
    fn test_current_never_exceeds_max() {
        let mut state = StreakState::new();
        for i in 0..20 {
            state.apply(i % 3 != 0, at(i));
            assert!(state.current_streak <= state.max_streak);
        }
    }

    #[test]
    fn test_multiplier_bands() {
        assert_eq!(streak_multiplier(0), Points::one());
        assert_eq!(streak_multiplier(2), Points::one());
        assert_eq!(streak_multiplier(3), Points::from_parts(125, 2));
        assert_eq!(streak_multiplier(4), Points::from_parts(125, 2));
        assert_eq!(streak_multiplier(5), Points::from_parts(15, 1));
        assert_eq!(streak_multiplier(6), Points::from_parts(15, 1));
        assert_eq!(streak_multiplier(7), Points::from_parts(175, 2));
        assert_eq!(streak_multiplier(9), Points::from_parts(175, 2));
        assert_eq!(streak_multiplier(10), Points::from_parts(20, 1));
        assert_eq!(streak_multiplier(25), Points::from_parts(20, 1));
    }

    #[test]
    fn test_each_band_boundary_raises_once() {
        let mut state = StreakState::new();
        let mut boundary_crossings = 0;
        let mut last = Points::one();
        for i in 0..12 {
            let m = state.apply(true, at(i));
            if m > last {
                boundary_crossings += 1;
            }
            last = m;
        }
        // 2->3, 4->5, 6->7, 9->10
        assert_eq!(boundary_crossings, 4);
    }

    #[test]
    fn test_multiplier_reflects_post_update_streak() {
        let mut state = StreakState::new();
        state.current_streak = 2;
        state.max_streak = 2;
        // This success moves the streak to 3; the multiplier for this very
        // prediction is already 1.25.
        let m = state.apply(true, at(0));
        assert_eq!(m, Points::from_parts(125, 2));
    }

    #[test]
    fn test_default_mode_risky_zero_sustains() {
        let mode = StreakMode::Default;
        assert!(mode.is_successful(Points::zero(), true));
        assert!(!mode.is_successful(Points::zero(), false));
        assert!(!mode.is_successful(Points::from_i64(-1), true));
        assert!(mode.is_successful(Points::from_i64(2), false));
    }

    #[test]
    fn test_strict_mode_requires_positive() {
        let mode = StreakMode::Strict;
        assert!(!mode.is_successful(Points::zero(), true));
        assert!(mode.is_successful(Points::from_i64(1), true));
    }

    #[test]
    fn test_failure_resets_multiplier() {
        let mut state = StreakState::new();
        for i in 0..5 {
            state.apply(true, at(i));
        }
        let m = state.apply(false, at(6));
        assert_eq!(m, Points::one());
        assert_eq!(state.current_streak, 0);
        assert_eq!(state.max_streak, 5);
    }
}
