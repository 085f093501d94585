//! Finalized match outcomes as delivered by the sports-data feed.

use super::MatchId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminal status of a match as reported by the feed.
///
/// Only `Completed` matches feed grading; `Cancelled` and `Postponed`
/// release their predictions unscored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Scheduled,
    Completed,
    Cancelled,
    Postponed,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Scheduled => "scheduled",
            MatchStatus::Completed => "completed",
            MatchStatus::Cancelled => "cancelled",
            MatchStatus::Postponed => "postponed",
        }
    }
}

impl std::str::FromStr for MatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(MatchStatus::Scheduled),
            "completed" => Ok(MatchStatus::Completed),
            "cancelled" => Ok(MatchStatus::Cancelled),
            "postponed" => Ok(MatchStatus::Postponed),
            other => Err(format!("unknown match status: {}", other)),
        }
    }
}

/// 1X2 result of a completed match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchResult {
    Home,
    Draw,
    Away,
}

impl MatchResult {
    pub fn from_scores(home: i64, away: i64) -> Self {
        match home.cmp(&away) {
            std::cmp::Ordering::Greater => MatchResult::Home,
            std::cmp::Ordering::Equal => MatchResult::Draw,
            std::cmp::Ordering::Less => MatchResult::Away,
        }
    }
}

/// A finalized match outcome.
///
/// `event_outcomes` resolves risky-event slugs to occurred/not-occurred;
/// slugs absent from the map are not yet resolved and are skipped by the
/// rules engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub match_id: MatchId,
    pub home_score: i64,
    pub away_score: i64,
    pub status: MatchStatus,
    pub finalized_at: DateTime<Utc>,
    #[serde(default)]
    pub event_outcomes: BTreeMap<String, bool>,
}

impl MatchOutcome {
    pub fn result(&self) -> MatchResult {
        MatchResult::from_scores(self.home_score, self.away_score)
    }

    /// The "other" bucket: either side scoring five or more.
    pub fn is_any_other(&self) -> bool {
        self.home_score > 4 || self.away_score > 4
    }
}
