//! Predictions and their grading lifecycle.

use super::{ContestId, MatchId, PredictionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Typed prediction payload.
///
/// `Score` predictions carry the predicted final score plus an optional
/// `any_other` flag (the "5+ goals either side" bucket). `Risky` predictions
/// carry the selected event slugs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PredictionPayload {
    Score {
        home: i64,
        away: i64,
        #[serde(default)]
        any_other: bool,
    },
    Risky {
        selections: Vec<String>,
    },
}

impl PredictionPayload {
    /// Short name used for analytics grouping and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PredictionPayload::Score { .. } => "score",
            PredictionPayload::Risky { .. } => "risky",
        }
    }
}

/// Grading lifecycle of a prediction.
///
/// `Scored`, `Voided` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionState {
    Submitted,
    Pending,
    Gradable,
    Scored,
    Voided,
    Skipped,
}

impl PredictionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionState::Submitted => "submitted",
            PredictionState::Pending => "pending",
            PredictionState::Gradable => "gradable",
            PredictionState::Scored => "scored",
            PredictionState::Voided => "voided",
            PredictionState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PredictionState::Scored | PredictionState::Voided | PredictionState::Skipped
        )
    }
}

impl std::str::FromStr for PredictionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(PredictionState::Submitted),
            "pending" => Ok(PredictionState::Pending),
            "gradable" => Ok(PredictionState::Gradable),
            "scored" => Ok(PredictionState::Scored),
            "voided" => Ok(PredictionState::Voided),
            "skipped" => Ok(PredictionState::Skipped),
            other => Err(format!("unknown prediction state: {}", other)),
        }
    }
}

/// A user's prediction for one match in one contest.
///
/// `(user, contest, match)` is unique; re-submission before the match cutoff
/// replaces the payload in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub prediction_id: PredictionId,
    pub user_id: UserId,
    pub contest_id: ContestId,
    pub match_id: MatchId,
    pub payload: PredictionPayload,
    pub submitted_at: DateTime<Utc>,
    pub state: PredictionState,
}
