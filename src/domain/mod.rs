//! Domain types for contest scoring and ranking.
//!
//! This module provides:
//! - Lossless numeric handling via the Points wrapper
//! - Identifier newtypes: UserId, ContestId, MatchId, PredictionId
//! - Rules documents (the closed variant algebra contests embed)
//! - Contest, Prediction and MatchOutcome entities

pub mod contest;
pub mod outcome;
pub mod points;
pub mod prediction;
pub mod primitives;
pub mod rules;

pub use contest::{Contest, ContestStatus};
pub use outcome::{MatchOutcome, MatchResult, MatchStatus};
pub use points::Points;
pub use prediction::{Prediction, PredictionPayload, PredictionState};
pub use primitives::{ContestId, MatchId, PredictionId, UserId};
pub use rules::{
    RelayRules, RiskyEvent, RiskyRules, RulesDocument, RulesError, StandardScoring,
    TotalizatorRules,
};
