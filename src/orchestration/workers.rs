//! Worker pool draining the grading task queue.
//!
//! Transient failures retry with exponential backoff inside the worker;
//! permanent failures dead-letter the task with an alert log and release the
//! prediction as skipped. Shutdown closes the queue, lets workers drain what
//! is left, then joins them before callers drop storage resources.

use crate::orchestration::coordinator::{GradingCoordinator, GradingError};
use crate::orchestration::ingress::ResultIngress;
use crate::orchestration::queue::{GradingTask, TaskQueue};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers over the shared queue.
    pub fn spawn(
        size: usize,
        queue: Arc<TaskQueue>,
        coordinator: Arc<GradingCoordinator>,
        ingress: Arc<ResultIngress>,
    ) -> Self {
        let handles = (0..size)
            .map(|worker_id| {
                let queue = queue.clone();
                let coordinator = coordinator.clone();
                let ingress = ingress.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, queue, coordinator, ingress).await;
                })
            })
            .collect();

        info!(workers = size, "worker pool started");
        Self { queue, handles }
    }

    /// Graceful shutdown: stop accepting tasks, drain in-flight work, join
    /// every worker.
    pub async fn shutdown(self) {
        self.queue.close();
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked during shutdown");
            }
        }
        info!("worker pool drained and stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<TaskQueue>,
    coordinator: Arc<GradingCoordinator>,
    ingress: Arc<ResultIngress>,
) {
    while let Some(task) = queue.pop().await {
        process_task(worker_id, &task, &coordinator, &ingress).await;
    }
    debug!(worker_id, "worker exiting");
}

async fn process_task(
    worker_id: usize,
    task: &GradingTask,
    coordinator: &GradingCoordinator,
    ingress: &ResultIngress,
) {
    let backoff_policy = ExponentialBackoff {
        max_elapsed_time: Some(Duration::from_secs(30)),
        ..Default::default()
    };

    let result = retry(backoff_policy, || async {
        coordinator.grade(task).await.map_err(|e| {
            if e.is_transient() {
                warn!(
                    worker_id,
                    prediction = %task.prediction_id,
                    error = %e,
                    "transient grading failure, retrying"
                );
                backoff::Error::transient(e)
            } else {
                backoff::Error::permanent(e)
            }
        })
    })
    .await;

    match result {
        Ok(outcome) => {
            debug!(worker_id, prediction = %task.prediction_id, ?outcome, "task finished");
        }
        Err(e) => {
            dead_letter(task, &e, coordinator).await;
        }
    }

    if let Err(e) = ingress.mark_if_complete(task.outcome.match_id).await {
        warn!(
            match_id = %task.outcome.match_id,
            error = %e,
            "failed to update match grading state"
        );
    }
}

/// Permanent failure: alert and release the prediction so the match can
/// still reach `grading_complete`.
async fn dead_letter(task: &GradingTask, e: &GradingError, coordinator: &GradingCoordinator) {
    error!(
        prediction = %task.prediction_id,
        match_id = %task.outcome.match_id,
        error = %e,
        "grading task dead-lettered, administrator attention required"
    );
    if let Err(release_err) = coordinator.release_as_skipped(task.prediction_id).await {
        error!(
            prediction = %task.prediction_id,
            error = %release_err,
            "failed to release dead-lettered prediction"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryIndex;
    use crate::config::RankRecomputeMode;
    use crate::db::{init_db, Repository};
    use crate::domain::{
        Contest, ContestId, ContestStatus, MatchId, MatchOutcome, MatchStatus, Points, Prediction,
        PredictionId, PredictionPayload, PredictionState, RulesDocument, StandardScoring, UserId,
    };
    use crate::engine::StreakMode;
    use crate::events::RecordingEventSink;
    use crate::projection::LeaderboardProjection;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn kickoff() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap()
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_pool_drains_tasks_and_shuts_down() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("test.db").to_string_lossy().to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        let repo = Arc::new(Repository::new(pool));
        let projection = Arc::new(LeaderboardProjection::new(
            repo.clone(),
            Arc::new(MemoryIndex::new()),
            RankRecomputeMode::Lazy,
            Duration::from_secs(5),
        ));
        let events = Arc::new(RecordingEventSink::new());
        let coordinator = Arc::new(GradingCoordinator::new(
            repo.clone(),
            projection,
            events.clone(),
            StreakMode::Default,
        ));
        let queue = Arc::new(TaskQueue::new(100));
        let ingress = Arc::new(ResultIngress::new(repo.clone(), queue.clone()));

        let contest = Contest {
            contest_id: ContestId::generate(),
            status: ContestStatus::Active,
            starts_at: kickoff() - ChronoDuration::days(10),
            ends_at: kickoff() + ChronoDuration::days(10),
            rules: RulesDocument::Standard {
                scoring: StandardScoring {
                    exact_score: Points::from_i64(5),
                    goal_difference: Points::from_i64(3),
                    correct_outcome: Points::from_i64(1),
                    outcome_plus_team_goals: Points::from_i64(1),
                    any_other: Points::from_i64(4),
                },
            },
            created_at: kickoff() - ChronoDuration::days(10),
        };
        repo.insert_contest(&contest).await.unwrap();

        let match_id = MatchId::generate();
        repo.register_match(match_id, "football", "serie-a", kickoff())
            .await
            .unwrap();

        let users = ["u1", "u2", "u3", "u4"];
        for user in users {
            let prediction = Prediction {
                prediction_id: PredictionId::generate(),
                user_id: UserId::new(user.to_string()),
                contest_id: contest.contest_id,
                match_id,
                payload: PredictionPayload::Score {
                    home: 2,
                    away: 1,
                    any_other: false,
                },
                submitted_at: kickoff() - ChronoDuration::hours(3),
                state: PredictionState::Submitted,
            };
            repo.upsert_prediction(&prediction).await.unwrap();
        }

        let outcome = MatchOutcome {
            match_id,
            home_score: 2,
            away_score: 1,
            status: MatchStatus::Completed,
            finalized_at: kickoff() + ChronoDuration::hours(2),
            event_outcomes: BTreeMap::new(),
        };

        let worker_pool = WorkerPool::spawn(3, queue.clone(), coordinator, ingress.clone());
        ingress.handle_outcome(&outcome).await.unwrap();

        {
            let queue = queue.clone();
            wait_for(move || queue.is_empty()).await;
        }
        worker_pool.shutdown().await;

        for user in users {
            let total = repo
                .ledger_total_for_user(&UserId::new(user.to_string()), contest.contest_id)
                .await
                .unwrap();
            assert_eq!(total, Points::from_i64(5));
        }
        assert_eq!(events.events().await.len(), users.len());

        let row = repo.get_match(match_id).await.unwrap().unwrap();
        assert_eq!(
            row.grading_state,
            crate::db::repo::GradingState::Complete,
            "grading_complete once every task terminated"
        );
    }
}
