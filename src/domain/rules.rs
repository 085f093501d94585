//! Contest rules documents.
//!
//! A rules document is a closed tagged variant over four shapes. The JSON
//! wire format is tagged by `"type"` with the variant payload under its own
//! key, and round-trips through serde unchanged for well-formed documents.

use super::Points;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// Point values for score-style grading.
///
/// All five values must be non-negative; validated at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScoring {
    pub exact_score: Points,
    pub goal_difference: Points,
    pub correct_outcome: Points,
    pub outcome_plus_team_goals: Points,
    pub any_other: Points,
}

impl StandardScoring {
    fn validate(&self) -> Result<(), RulesError> {
        let fields = [
            ("exact_score", self.exact_score),
            ("goal_difference", self.goal_difference),
            ("correct_outcome", self.correct_outcome),
            ("outcome_plus_team_goals", self.outcome_plus_team_goals),
            ("any_other", self.any_other),
        ];
        for (name, value) in fields {
            if value.is_negative() {
                return Err(RulesError::NegativePointValue(name));
            }
        }
        Ok(())
    }
}

/// One event in a risky catalog. Point values are signed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskyEvent {
    pub slug: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_en: Option<String>,
    pub points: Points,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskyRules {
    pub max_selections: u8,
    pub events: Vec<RiskyEvent>,
}

impl RiskyRules {
    /// Look up an event by slug.
    pub fn event(&self, slug: &str) -> Option<&RiskyEvent> {
        self.events.iter().find(|e| e.slug == slug)
    }

    fn validate(&self) -> Result<(), RulesError> {
        if !(1..=10).contains(&self.max_selections) {
            return Err(RulesError::MaxSelectionsOutOfRange(self.max_selections));
        }
        let mut seen = HashSet::new();
        for event in &self.events {
            if !seen.insert(event.slug.as_str()) {
                return Err(RulesError::DuplicateSlug(event.slug.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TotalizatorRules {
    pub event_count: u8,
    pub scoring: StandardScoring,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRules {
    pub team_size: u8,
    pub event_count: u8,
    pub scoring: StandardScoring,
    pub allow_reassign: bool,
}

/// The closed set of contest rule variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RulesDocument {
    Standard { scoring: StandardScoring },
    Risky { risky: RiskyRules },
    Totalizator { totalizator: TotalizatorRules },
    Relay { relay: RelayRules },
}

impl RulesDocument {
    /// Validate the document. Called at contest creation and on load.
    pub fn validate(&self) -> Result<(), RulesError> {
        match self {
            RulesDocument::Standard { scoring } => scoring.validate(),
            // Risky values are signed; only the structural rules apply.
            RulesDocument::Risky { risky } => risky.validate(),
            RulesDocument::Totalizator { totalizator } => {
                if !(5..=30).contains(&totalizator.event_count) {
                    return Err(RulesError::EventCountOutOfRange(totalizator.event_count));
                }
                totalizator.scoring.validate()
            }
            RulesDocument::Relay { relay } => {
                if !(2..=10).contains(&relay.team_size) {
                    return Err(RulesError::TeamSizeOutOfRange(relay.team_size));
                }
                if !(5..=50).contains(&relay.event_count) {
                    return Err(RulesError::EventCountOutOfRange(relay.event_count));
                }
                relay.scoring.validate()
            }
        }
    }

    /// The embedded score-style block, for every variant that grades by score.
    pub fn standard_scoring(&self) -> Option<&StandardScoring> {
        match self {
            RulesDocument::Standard { scoring } => Some(scoring),
            RulesDocument::Totalizator { totalizator } => Some(&totalizator.scoring),
            RulesDocument::Relay { relay } => Some(&relay.scoring),
            RulesDocument::Risky { .. } => None,
        }
    }

    pub fn risky_rules(&self) -> Option<&RiskyRules> {
        match self {
            RulesDocument::Risky { risky } => Some(risky),
            _ => None,
        }
    }

    pub fn is_risky(&self) -> bool {
        matches!(self, RulesDocument::Risky { .. })
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            RulesDocument::Standard { .. } => "standard",
            RulesDocument::Risky { .. } => "risky",
            RulesDocument::Totalizator { .. } => "totalizator",
            RulesDocument::Relay { .. } => "relay",
        }
    }
}

/// Validation failures for rules documents.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RulesError {
    #[error("point value {0} must be non-negative")]
    NegativePointValue(&'static str),
    #[error("duplicate risky event slug: {0}")]
    DuplicateSlug(String),
    #[error("max_selections must be 1-10, got {0}")]
    MaxSelectionsOutOfRange(u8),
    #[error("event_count out of range: {0}")]
    EventCountOutOfRange(u8),
    #[error("team_size must be 2-10, got {0}")]
    TeamSizeOutOfRange(u8),
}
