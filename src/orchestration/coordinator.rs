//! Grading coordinator: the only component that mutates the ledger, the
//! streak store and the leaderboard projection.
//!
//! Steps 1-7 (resolve, classify, score, streak) are pure computation; the
//! ledger insert is the commit point. Everything before it retries without
//! side effects; everything after it is repaired by reconciliation because
//! the ledger is the source of truth.

use crate::db::repo::ScoreRow;
use crate::db::Repository;
use crate::domain::{
    ContestId, MatchId, Points, Prediction, PredictionId, PredictionState, RulesError,
};
use crate::engine::{score_prediction, timing_tier, ScoringError, StreakMode};
use crate::events::{EventSink, PredictionScored};
use crate::orchestration::locks::ScopeLocks;
use crate::orchestration::queue::GradingTask;
use crate::projection::LeaderboardProjection;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum GradingError {
    #[error("prediction not found: {0}")]
    PredictionNotFound(PredictionId),
    #[error("contest not found: {0}")]
    ContestNotFound(ContestId),
    #[error("match not found: {0}")]
    MatchNotFound(MatchId),
    #[error("invalid rules document: {0}")]
    InvalidRules(#[from] RulesError),
    #[error(transparent)]
    InvalidSelection(#[from] ScoringError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

impl GradingError {
    /// Transient failures are retried with backoff; everything else poisons
    /// the task.
    pub fn is_transient(&self) -> bool {
        matches!(self, GradingError::Db(_))
    }
}

/// Terminal result of one grading task.
#[derive(Debug, Clone, PartialEq)]
pub enum GradingOutcome {
    Scored(Box<PredictionScored>),
    /// The ledger already holds this prediction; nothing changed, no event.
    AlreadyScored,
    /// Contest left the active state before grading.
    SkippedContestClosed,
    /// The prediction reached a terminal state (voided, skipped) earlier.
    SkippedTerminalState,
}

pub struct GradingCoordinator {
    repo: Arc<Repository>,
    projection: Arc<LeaderboardProjection>,
    events: Arc<dyn EventSink>,
    scope_locks: ScopeLocks,
    streak_mode: StreakMode,
}

impl GradingCoordinator {
    pub fn new(
        repo: Arc<Repository>,
        projection: Arc<LeaderboardProjection>,
        events: Arc<dyn EventSink>,
        streak_mode: StreakMode,
    ) -> Self {
        Self {
            repo,
            projection,
            events,
            scope_locks: ScopeLocks::new(),
            streak_mode,
        }
    }

    /// Execute one grading task to a terminal outcome.
    ///
    /// Idempotent on the ledger's `(user, contest, prediction)` key: replaying
    /// a task yields `AlreadyScored` with no state change and no event.
    pub async fn grade(&self, task: &GradingTask) -> Result<GradingOutcome, GradingError> {
        // Step 1: resolve the prediction; short-circuit if already in the ledger.
        let prediction = self
            .repo
            .get_prediction(task.prediction_id)
            .await?
            .ok_or(GradingError::PredictionNotFound(task.prediction_id))?;

        if self.already_ledgered(&prediction).await? {
            debug!(prediction = %prediction.prediction_id, "already scored, idempotent return");
            return Ok(GradingOutcome::AlreadyScored);
        }
        if prediction.state.is_terminal() {
            warn!(
                prediction = %prediction.prediction_id,
                state = prediction.state.as_str(),
                "task for terminal prediction, skipping"
            );
            return Ok(GradingOutcome::SkippedTerminalState);
        }

        // Step 2: resolve contest and rules as of the match finalization.
        let contest = self
            .repo
            .get_contest(prediction.contest_id)
            .await?
            .ok_or(GradingError::ContestNotFound(prediction.contest_id))?;
        contest.rules.validate()?;

        if !contest.is_active_at(task.outcome.finalized_at) {
            info!(
                contest = %contest.contest_id,
                prediction = %prediction.prediction_id,
                "contest not active at finalization, skipping"
            );
            self.repo
                .set_prediction_state(prediction.prediction_id, PredictionState::Skipped)
                .await?;
            return Ok(GradingOutcome::SkippedContestClosed);
        }

        let match_row = self
            .repo
            .get_match(task.outcome.match_id)
            .await?
            .ok_or(GradingError::MatchNotFound(task.outcome.match_id))?;

        // Step 3: serialize within the (user, contest) scope.
        let scope_lock = self
            .scope_locks
            .for_scope(&prediction.user_id, prediction.contest_id);
        let _scope_guard = scope_lock.lock().await;

        // Re-check under the lock: a concurrent replay may have committed.
        if self.already_ledgered(&prediction).await? {
            return Ok(GradingOutcome::AlreadyScored);
        }

        // Steps 4-5: base points and timing coefficient. Pure.
        let breakdown = score_prediction(&contest.rules, &prediction.payload, &task.outcome)?;
        let tier = timing_tier(prediction.submitted_at, match_row.starts_at);
        let time_coefficient = tier.multiplier();

        // Step 6: fold into streak state in memory; nothing is persisted
        // until the ledger insert commits.
        let scored_at = Utc::now();
        let mut streak = self
            .repo
            .get_streak(&prediction.user_id, prediction.contest_id)
            .await?;
        let successful = self
            .streak_mode
            .is_successful(breakdown.base_points, contest.rules.is_risky());
        let streak_multiplier = streak.apply(successful, scored_at);

        // Step 7: compose the modifiers, rounding only at the storage edge.
        let final_points = (breakdown.base_points * time_coefficient * streak_multiplier).round2();

        // Step 8: the commit point.
        let score = ScoreRow {
            user_id: prediction.user_id.clone(),
            contest_id: prediction.contest_id,
            prediction_id: prediction.prediction_id,
            base_points: breakdown.base_points,
            time_coefficient,
            streak_multiplier,
            final_points,
            scored_at,
            corrected: false,
        };
        if !self.repo.insert_score(&score).await? {
            return Ok(GradingOutcome::AlreadyScored);
        }

        self.repo
            .upsert_streak(&prediction.user_id, prediction.contest_id, &streak)
            .await?;
        self.repo
            .set_prediction_state(prediction.prediction_id, PredictionState::Scored)
            .await?;

        // Step 9: projection delta under the per-contest lock.
        let applied = self
            .projection
            .apply_delta(
                prediction.contest_id,
                &prediction.user_id,
                final_points,
                scored_at,
            )
            .await?;

        // Step 10: emit the scored event.
        let event = PredictionScored {
            user_id: prediction.user_id.clone(),
            contest_id: prediction.contest_id,
            prediction_id: prediction.prediction_id,
            base_points: breakdown.base_points,
            time_coefficient,
            streak_multiplier,
            final_points,
            new_total: applied.new_total,
            new_rank: applied.new_rank,
        };
        self.events.publish(event.clone()).await;

        info!(
            user = %prediction.user_id,
            contest = %prediction.contest_id,
            prediction = %prediction.prediction_id,
            rule = ?breakdown.rule,
            tier = tier.as_str(),
            base = %breakdown.base_points,
            final_points = %final_points,
            "graded prediction"
        );
        Ok(GradingOutcome::Scored(Box::new(event)))
    }

    async fn already_ledgered(&self, prediction: &Prediction) -> Result<bool, GradingError> {
        Ok(self
            .repo
            .get_score(
                &prediction.user_id,
                prediction.contest_id,
                prediction.prediction_id,
            )
            .await?
            .is_some())
    }

    /// Dead-letter path: release a prediction as skipped so its match can
    /// still reach `grading_complete`.
    pub async fn release_as_skipped(
        &self,
        prediction_id: PredictionId,
    ) -> Result<(), GradingError> {
        self.repo
            .set_prediction_state(prediction_id, PredictionState::Skipped)
            .await?;
        Ok(())
    }

    /// Administrator action: void a prediction.
    ///
    /// An unscored prediction is released as-is. A scored one gets a
    /// compensating, audit-flagged correction to zero, and the projection
    /// absorbs the negative delta.
    pub async fn void_prediction(
        &self,
        prediction_id: PredictionId,
    ) -> Result<(), GradingError> {
        let prediction = self
            .repo
            .get_prediction(prediction_id)
            .await?
            .ok_or(GradingError::PredictionNotFound(prediction_id))?;

        let scope_lock = self
            .scope_locks
            .for_scope(&prediction.user_id, prediction.contest_id);
        let _scope_guard = scope_lock.lock().await;

        let delta = self
            .repo
            .correct_score(
                &prediction.user_id,
                prediction.contest_id,
                prediction.prediction_id,
                Points::zero(),
            )
            .await?;

        if let Some(delta) = delta {
            if !delta.is_zero() {
                self.projection
                    .apply_delta(
                        prediction.contest_id,
                        &prediction.user_id,
                        delta,
                        Utc::now(),
                    )
                    .await?;
            }
        }

        self.repo
            .set_prediction_state(prediction_id, PredictionState::Voided)
            .await?;
        info!(prediction = %prediction_id, "prediction voided");
        Ok(())
    }
}

impl std::fmt::Debug for GradingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingCoordinator")
            .field("streak_mode", &self.streak_mode)
            .finish()
    }
}
