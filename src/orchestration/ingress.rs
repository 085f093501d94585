//! Result ingress: finalized match outcomes become grading tasks.
//!
//! One task per unscored prediction tied to the match. Publication is
//! at-least-once: tasks are re-derived from the database, and matches whose
//! grading never finished are re-enumerated on startup. Replays are safe
//! because the coordinator is idempotent on the ledger key.

use crate::db::repo::GradingState;
use crate::db::Repository;
use crate::domain::{MatchId, MatchOutcome, MatchStatus};
use crate::orchestration::queue::{GradingTask, TaskQueue};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngressError {
    #[error("match not registered: {0}")]
    UnknownMatch(MatchId),
    #[error("outcome for match {0} is not terminal")]
    NotTerminal(MatchId),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// What one ingested outcome turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngressSummary {
    pub tasks_published: usize,
    pub predictions_voided: u64,
}

pub struct ResultIngress {
    repo: Arc<Repository>,
    queue: Arc<TaskQueue>,
}

impl ResultIngress {
    pub fn new(repo: Arc<Repository>, queue: Arc<TaskQueue>) -> Self {
        Self { repo, queue }
    }

    /// Ingest one finalized outcome.
    ///
    /// Completed matches publish one grading task per unscored prediction
    /// and move to `grading_started`; cancelled and postponed matches void
    /// their predictions unscored.
    pub async fn handle_outcome(
        &self,
        outcome: &MatchOutcome,
    ) -> Result<IngressSummary, IngressError> {
        if self
            .repo
            .get_match(outcome.match_id)
            .await?
            .is_none()
        {
            return Err(IngressError::UnknownMatch(outcome.match_id));
        }

        match outcome.status {
            MatchStatus::Completed => {
                self.repo.apply_match_outcome(outcome).await?;
                self.publish_tasks(outcome).await
            }
            MatchStatus::Cancelled | MatchStatus::Postponed => {
                self.repo.apply_match_outcome(outcome).await?;
                let voided = self.repo.void_predictions_for_match(outcome.match_id).await?;
                self.repo
                    .set_grading_state(outcome.match_id, GradingState::Complete)
                    .await?;
                info!(
                    match_id = %outcome.match_id,
                    status = outcome.status.as_str(),
                    voided,
                    "match released without grading"
                );
                Ok(IngressSummary {
                    tasks_published: 0,
                    predictions_voided: voided,
                })
            }
            MatchStatus::Scheduled => Err(IngressError::NotTerminal(outcome.match_id)),
        }
    }

    async fn publish_tasks(&self, outcome: &MatchOutcome) -> Result<IngressSummary, IngressError> {
        let predictions = self
            .repo
            .unscored_predictions_for_match(outcome.match_id)
            .await?;

        if predictions.is_empty() {
            self.repo
                .set_grading_state(outcome.match_id, GradingState::Complete)
                .await?;
            return Ok(IngressSummary::default());
        }

        self.repo.mark_predictions_gradable(outcome.match_id).await?;
        self.repo
            .set_grading_state(outcome.match_id, GradingState::Started)
            .await?;

        let mut published = 0;
        for prediction in predictions {
            let accepted = self.queue.push(GradingTask {
                prediction_id: prediction.prediction_id,
                outcome: outcome.clone(),
            });
            if !accepted {
                warn!(
                    match_id = %outcome.match_id,
                    "queue closed during publication, remaining tasks resume on next start"
                );
                break;
            }
            published += 1;
        }

        info!(match_id = %outcome.match_id, published, "grading tasks published");
        Ok(IngressSummary {
            tasks_published: published,
            predictions_voided: 0,
        })
    }

    /// Mark the match `grading_complete` once no unscored predictions remain.
    /// Called by workers after each terminated task.
    pub async fn mark_if_complete(&self, match_id: MatchId) -> Result<bool, IngressError> {
        let remaining = self
            .repo
            .count_unscored_predictions_for_match(match_id)
            .await?;
        if remaining == 0 {
            self.repo
                .set_grading_state(match_id, GradingState::Complete)
                .await?;
            info!(match_id = %match_id, "grading complete");
            return Ok(true);
        }
        Ok(false)
    }

    /// Republish tasks for matches whose grading never completed. Run at
    /// startup; harmless to run again because grading is idempotent.
    pub async fn resume_incomplete(&self) -> Result<usize, IngressError> {
        let matches = self.repo.matches_with_incomplete_grading().await?;
        let mut republished = 0;

        for row in matches {
            let (Some(home), Some(away), Some(finalized_at)) =
                (row.home_score, row.away_score, row.finalized_at)
            else {
                warn!(match_id = %row.match_id, "incomplete grading but no stored outcome, skipping");
                continue;
            };
            let outcome = MatchOutcome {
                match_id: row.match_id,
                home_score: home,
                away_score: away,
                status: row.status,
                finalized_at,
                event_outcomes: row.event_outcomes.clone(),
            };
            let summary = self.handle_outcome(&outcome).await?;
            republished += summary.tasks_published;
        }

        if republished > 0 {
            info!(republished, "republished grading tasks on startup");
        }
        Ok(republished)
    }
}

impl std::fmt::Debug for ResultIngress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultIngress").finish()
    }
}
