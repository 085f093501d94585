//! Rules engine: prediction payload + match outcome + rules document -> base points.
//!
//! Standard grading is a strict first-match-wins cascade, listed from most
//! specific to least specific so every (prediction, outcome) pair has exactly
//! one classification. Risky grading sums signed values over the selected
//! slugs, skipping unresolved ones.

use super::{RuleHit, ScoreBreakdown};
use crate::domain::{
    MatchOutcome, MatchResult, Points, PredictionPayload, RiskyRules, RulesDocument,
    StandardScoring,
};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScoringError {
    /// The rules document cannot grade this payload shape.
    #[error("payload kind {payload} does not match rules variant {rules}")]
    PayloadMismatch {
        payload: &'static str,
        rules: &'static str,
    },
    /// A selected slug is not in the contest's risky catalog.
    #[error("unknown risky event slug: {0}")]
    UnknownSlug(String),
    /// More slugs selected than the rules allow.
    #[error("{selected} selections exceed the maximum of {max}")]
    TooManySelections { selected: usize, max: u8 },
}

/// Grade one prediction against one finalized outcome.
///
/// Pure: no clock, no I/O. Totalizator and relay variants grade each match
/// with their embedded standard block; cross-match and cross-member
/// aggregation happens in the ledger and projection, not here.
pub fn score_prediction(
    rules: &RulesDocument,
    payload: &PredictionPayload,
    outcome: &MatchOutcome,
) -> Result<ScoreBreakdown, ScoringError> {
    match payload {
        PredictionPayload::Score {
            home,
            away,
            any_other,
        } => {
            let scoring =
                rules
                    .standard_scoring()
                    .ok_or_else(|| ScoringError::PayloadMismatch {
                        payload: payload.kind(),
                        rules: rules.variant_name(),
                    })?;
            Ok(score_standard(scoring, *home, *away, *any_other, outcome))
        }
        PredictionPayload::Risky { selections } => {
            let risky = rules
                .risky_rules()
                .ok_or_else(|| ScoringError::PayloadMismatch {
                    payload: payload.kind(),
                    rules: rules.variant_name(),
                })?;
            score_risky(risky, selections, outcome)
        }
    }
}

/// Structural check of a payload against a rules document, without an
/// outcome. Used at submission time so malformed predictions are rejected at
/// the door rather than poisoning a grading task later.
pub fn validate_payload(
    rules: &RulesDocument,
    payload: &PredictionPayload,
) -> Result<(), ScoringError> {
    match payload {
        PredictionPayload::Score { .. } => rules
            .standard_scoring()
            .map(|_| ())
            .ok_or(ScoringError::PayloadMismatch {
                payload: payload.kind(),
                rules: rules.variant_name(),
            }),
        PredictionPayload::Risky { selections } => {
            let risky = rules
                .risky_rules()
                .ok_or(ScoringError::PayloadMismatch {
                    payload: payload.kind(),
                    rules: rules.variant_name(),
                })?;
            if selections.len() > risky.max_selections as usize {
                return Err(ScoringError::TooManySelections {
                    selected: selections.len(),
                    max: risky.max_selections,
                });
            }
            for slug in selections {
                if risky.event(slug).is_none() {
                    return Err(ScoringError::UnknownSlug(slug.clone()));
                }
            }
            Ok(())
        }
    }
}

fn score_standard(
    scoring: &StandardScoring,
    home: i64,
    away: i64,
    any_other: bool,
    outcome: &MatchOutcome,
) -> ScoreBreakdown {
    // Rule 1: the any_other flag short-circuits score comparison entirely.
    if any_other {
        return if outcome.is_any_other() {
            ScoreBreakdown::score_rule(scoring.any_other, RuleHit::AnyOtherHit)
        } else {
            ScoreBreakdown::score_rule(Points::zero(), RuleHit::AnyOtherMiss)
        };
    }

    // Rule 2: exact score.
    if home == outcome.home_score && away == outcome.away_score {
        return ScoreBreakdown::score_rule(scoring.exact_score, RuleHit::ExactScore);
    }

    // Rule 3: goal difference.
    if home - away == outcome.home_score - outcome.away_score {
        return ScoreBreakdown::score_rule(scoring.goal_difference, RuleHit::GoalDifference);
    }

    // Rules 4-5: outcome, optionally with one team's goals right.
    let predicted = MatchResult::from_scores(home, away);
    if predicted == outcome.result() {
        if home == outcome.home_score || away == outcome.away_score {
            return ScoreBreakdown::score_rule(
                scoring.correct_outcome + scoring.outcome_plus_team_goals,
                RuleHit::OutcomeWithTeamGoals,
            );
        }
        return ScoreBreakdown::score_rule(scoring.correct_outcome, RuleHit::OutcomeOnly);
    }

    ScoreBreakdown::score_rule(Points::zero(), RuleHit::Miss)
}

fn score_risky(
    risky: &RiskyRules,
    selections: &[String],
    outcome: &MatchOutcome,
) -> Result<ScoreBreakdown, ScoringError> {
    if selections.len() > risky.max_selections as usize {
        return Err(ScoringError::TooManySelections {
            selected: selections.len(),
            max: risky.max_selections,
        });
    }

    let mut base = Points::zero();
    let mut occurred = 0u32;
    let mut missed = 0u32;
    let mut unresolved = 0u32;

    for slug in selections {
        let event = risky
            .event(slug)
            .ok_or_else(|| ScoringError::UnknownSlug(slug.clone()))?;
        match outcome.event_outcomes.get(slug) {
            Some(true) => {
                base = base + event.points;
                occurred += 1;
            }
            Some(false) => {
                base = base - event.points;
                missed += 1;
            }
            None => unresolved += 1,
        }
    }

    Ok(ScoreBreakdown {
        base_points: base,
        rule: RuleHit::Risky,
        risky_counts: Some((occurred, missed, unresolved)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MatchId, MatchStatus, RelayRules, RiskyEvent, TotalizatorRules};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn default_scoring() -> StandardScoring {
        StandardScoring {
            exact_score: Points::from_i64(5),
            goal_difference: Points::from_i64(3),
            correct_outcome: Points::from_i64(1),
            outcome_plus_team_goals: Points::from_i64(1),
            any_other: Points::from_i64(4),
        }
    }

    fn standard_rules() -> RulesDocument {
        RulesDocument::Standard {
            scoring: default_scoring(),
        }
    }

    fn completed(home: i64, away: i64) -> MatchOutcome {
        MatchOutcome {
            match_id: MatchId::generate(),
            home_score: home,
            away_score: away,
            status: MatchStatus::Completed,
            finalized_at: Utc::now(),
            event_outcomes: BTreeMap::new(),
        }
    }

    fn score(home: i64, away: i64) -> PredictionPayload {
        PredictionPayload::Score {
            home,
            away,
            any_other: false,
        }
    }

    #[test]
    fn test_exact_score_wins_first() {
        let breakdown = score_prediction(&standard_rules(), &score(2, 1), &completed(2, 1)).unwrap();
        assert_eq!(breakdown.base_points, Points::from_i64(5));
        assert_eq!(breakdown.rule, RuleHit::ExactScore);
    }

    #[test]
    fn test_goal_difference() {
        // Predicted 2:0, actual 3:1 - same +2 difference, not exact.
        let breakdown = score_prediction(&standard_rules(), &score(2, 0), &completed(3, 1)).unwrap();
        assert_eq!(breakdown.base_points, Points::from_i64(3));
        assert_eq!(breakdown.rule, RuleHit::GoalDifference);
    }

    #[test]
    fn test_outcome_with_team_goals() {
        // Predicted 2:1, actual 2:0 - home win both, home goals match, diff differs.
        let breakdown = score_prediction(&standard_rules(), &score(2, 1), &completed(2, 0)).unwrap();
        assert_eq!(breakdown.base_points, Points::from_i64(2));
        assert_eq!(breakdown.rule, RuleHit::OutcomeWithTeamGoals);
    }

    #[test]
    fn test_outcome_only() {
        // Predicted 2:1, actual 4:0 - home win both, no goals line matches, diff differs.
        let breakdown = score_prediction(&standard_rules(), &score(2, 1), &completed(4, 0)).unwrap();
        assert_eq!(breakdown.base_points, Points::from_i64(1));
        assert_eq!(breakdown.rule, RuleHit::OutcomeOnly);
    }

    #[test]
    fn test_wrong_outcome_is_zero() {
        // Predicted 1:0 home win, actual 1:2 away win.
        let breakdown = score_prediction(&standard_rules(), &score(1, 0), &completed(1, 2)).unwrap();
        assert_eq!(breakdown.base_points, Points::zero());
        assert_eq!(breakdown.rule, RuleHit::Miss);
    }

    #[test]
    fn test_any_other_hit_and_miss() {
        let payload = PredictionPayload::Score {
            home: 0,
            away: 0,
            any_other: true,
        };
        let hit = score_prediction(&standard_rules(), &payload, &completed(5, 0)).unwrap();
        assert_eq!(hit.base_points, Points::from_i64(4));
        assert_eq!(hit.rule, RuleHit::AnyOtherHit);

        let miss = score_prediction(&standard_rules(), &payload, &completed(4, 4)).unwrap();
        assert_eq!(miss.base_points, Points::zero());
        assert_eq!(miss.rule, RuleHit::AnyOtherMiss);
    }

    #[test]
    fn test_any_other_flag_shorts_exact_score() {
        // Flagged any_other with a score that happens to match exactly:
        // rule 1 still wins, and 4:4 is not "other".
        let payload = PredictionPayload::Score {
            home: 4,
            away: 4,
            any_other: true,
        };
        let breakdown = score_prediction(&standard_rules(), &payload, &completed(4, 4)).unwrap();
        assert_eq!(breakdown.rule, RuleHit::AnyOtherMiss);
        assert_eq!(breakdown.base_points, Points::zero());
    }

    #[test]
    fn test_draw_goal_difference() {
        // Predicted 1:1, actual 2:2 - zero difference both, not exact.
        let breakdown = score_prediction(&standard_rules(), &score(1, 1), &completed(2, 2)).unwrap();
        assert_eq!(breakdown.base_points, Points::from_i64(3));
        assert_eq!(breakdown.rule, RuleHit::GoalDifference);
    }

    fn risky_rules() -> RulesDocument {
        let event = |slug: &str, points: i64| RiskyEvent {
            slug: slug.to_string(),
            name: slug.to_string(),
            name_en: None,
            points: Points::from_i64(points),
            description: None,
        };
        RulesDocument::Risky {
            risky: RiskyRules {
                max_selections: 3,
                events: vec![
                    event("penalty", 3),
                    event("red_card", 4),
                    event("own_goal", 5),
                ],
            },
        }
    }

    fn risky_outcome(resolved: &[(&str, bool)]) -> MatchOutcome {
        let mut outcome = completed(1, 0);
        for (slug, occurred) in resolved {
            outcome.event_outcomes.insert(slug.to_string(), *occurred);
        }
        outcome
    }

    #[test]
    fn test_risky_mixed_selections() {
        // penalty occurred (+3), red_card did not (-4): net -1.
        let payload = PredictionPayload::Risky {
            selections: vec!["penalty".to_string(), "red_card".to_string()],
        };
        let outcome = risky_outcome(&[("penalty", true), ("red_card", false), ("own_goal", true)]);
        let breakdown = score_prediction(&risky_rules(), &payload, &outcome).unwrap();
        assert_eq!(breakdown.base_points, Points::from_i64(-1));
        assert_eq!(breakdown.risky_counts, Some((1, 1, 0)));
    }

    #[test]
    fn test_risky_unresolved_slug_skipped() {
        let payload = PredictionPayload::Risky {
            selections: vec!["penalty".to_string(), "own_goal".to_string()],
        };
        let outcome = risky_outcome(&[("penalty", true)]);
        let breakdown = score_prediction(&risky_rules(), &payload, &outcome).unwrap();
        assert_eq!(breakdown.base_points, Points::from_i64(3));
        assert_eq!(breakdown.risky_counts, Some((1, 0, 1)));
    }

    #[test]
    fn test_risky_unknown_slug_rejected() {
        let payload = PredictionPayload::Risky {
            selections: vec!["hat_trick".to_string()],
        };
        let err = score_prediction(&risky_rules(), &payload, &risky_outcome(&[])).unwrap_err();
        assert_eq!(err, ScoringError::UnknownSlug("hat_trick".to_string()));
    }

    #[test]
    fn test_risky_selection_limit() {
        let payload = PredictionPayload::Risky {
            selections: vec![
                "penalty".to_string(),
                "red_card".to_string(),
                "own_goal".to_string(),
                "penalty".to_string(),
            ],
        };
        let err = score_prediction(&risky_rules(), &payload, &risky_outcome(&[])).unwrap_err();
        assert_eq!(
            err,
            ScoringError::TooManySelections {
                selected: 4,
                max: 3
            }
        );
    }

    #[test]
    fn test_payload_rules_mismatch() {
        let err = score_prediction(&risky_rules(), &score(1, 0), &completed(1, 0)).unwrap_err();
        assert!(matches!(err, ScoringError::PayloadMismatch { .. }));

        let risky_payload = PredictionPayload::Risky { selections: vec![] };
        let err =
            score_prediction(&standard_rules(), &risky_payload, &completed(1, 0)).unwrap_err();
        assert!(matches!(err, ScoringError::PayloadMismatch { .. }));
    }

    #[test]
    fn test_validate_payload_without_outcome() {
        assert!(validate_payload(&standard_rules(), &score(1, 0)).is_ok());

        let risky_payload = PredictionPayload::Risky {
            selections: vec!["penalty".to_string()],
        };
        assert!(validate_payload(&risky_rules(), &risky_payload).is_ok());
        assert!(validate_payload(&standard_rules(), &risky_payload).is_err());

        let unknown = PredictionPayload::Risky {
            selections: vec!["hat_trick".to_string()],
        };
        assert!(matches!(
            validate_payload(&risky_rules(), &unknown),
            Err(ScoringError::UnknownSlug(_))
        ));
    }

    #[test]
    fn test_totalizator_and_relay_grade_like_standard() {
        let totalizator = RulesDocument::Totalizator {
            totalizator: TotalizatorRules {
                event_count: 10,
                scoring: default_scoring(),
            },
        };
        let relay = RulesDocument::Relay {
            relay: RelayRules {
                team_size: 4,
                event_count: 10,
                scoring: default_scoring(),
                allow_reassign: false,
            },
        };
        for rules in [totalizator, relay] {
            let breakdown = score_prediction(&rules, &score(2, 1), &completed(2, 1)).unwrap();
            assert_eq!(breakdown.base_points, Points::from_i64(5));
            assert_eq!(breakdown.rule, RuleHit::ExactScore);
        }
    }
}
