//! Contest entity and lifecycle.

use super::{ContestId, RulesDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored lifecycle status of a contest.
///
/// `Completed` and `Cancelled` are terminal; a contest becomes `Active`
/// exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContestStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl ContestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContestStatus::Draft => "draft",
            ContestStatus::Active => "active",
            ContestStatus::Completed => "completed",
            ContestStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContestStatus::Completed | ContestStatus::Cancelled)
    }
}

impl std::str::FromStr for ContestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(ContestStatus::Draft),
            "active" => Ok(ContestStatus::Active),
            "completed" => Ok(ContestStatus::Completed),
            "cancelled" => Ok(ContestStatus::Cancelled),
            other => Err(format!("unknown contest status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contest {
    pub contest_id: ContestId,
    pub status: ContestStatus,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub rules: RulesDocument,
    pub created_at: DateTime<Utc>,
}

impl Contest {
    /// Effective status at `now`, derived from the stored status and the
    /// contest window.
    ///
    /// All callers go through this; nothing else derives status from the
    /// clock. An active contest whose window has elapsed reads as completed
    /// even before the stored row is updated.
    pub fn computed_status(&self, now: DateTime<Utc>) -> ContestStatus {
        match self.status {
            ContestStatus::Active if now >= self.ends_at => ContestStatus::Completed,
            other => other,
        }
    }

    /// Whether grading may run against this contest at `at`.
    pub fn is_active_at(&self, at: DateTime<Utc>) -> bool {
        self.computed_status(at) == ContestStatus::Active
    }
}
