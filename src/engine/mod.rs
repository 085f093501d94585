//! Pure computation engines for deterministic grading logic.
//!
//! Nothing in this module performs I/O or reads the clock; every function is
//! deterministic given its inputs. The grading coordinator owns sequencing
//! and persistence.

use crate::domain::Points;
use serde::{Deserialize, Serialize};

pub mod rules;
pub mod streak;
pub mod timing;

pub use rules::{score_prediction, validate_payload, ScoringError};
pub use streak::{streak_multiplier, StreakMode, StreakState};
pub use timing::{timing_tier, TimingTier};

/// Which grading rule produced the base points. Diagnostic only; recorded in
/// logs and surfaced in the scored event for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleHit {
    AnyOtherHit,
    AnyOtherMiss,
    ExactScore,
    GoalDifference,
    OutcomeWithTeamGoals,
    OutcomeOnly,
    Miss,
    Risky,
}

/// Output of the rules engine: base points plus a diagnostic breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_points: Points,
    pub rule: RuleHit,
    /// Risky only: (occurred, missed, unresolved) selection counts.
    pub risky_counts: Option<(u32, u32, u32)>,
}

impl ScoreBreakdown {
    pub fn score_rule(base_points: Points, rule: RuleHit) -> Self {
        ScoreBreakdown {
            base_points,
            rule,
            risky_counts: None,
        }
    }
}
