//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `scores.rs` - ledger and streak operations
//! - `leaderboards.rs` - durable leaderboard projection rows
//! - `analytics.rs` - read-only aggregation queries
//!
//! Timestamps cross the boundary as millisecond integers; point values as
//! canonical decimal strings.

mod analytics;
mod leaderboards;
mod scores;

pub use analytics::ScoredRow;
pub use leaderboards::LeaderboardRow;
pub use scores::ScoreRow;

use crate::domain::{
    Contest, ContestId, ContestStatus, MatchId, MatchOutcome, MatchStatus, Points, Prediction,
    PredictionId, PredictionPayload, PredictionState, RulesDocument, UserId,
};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::BTreeMap;
use std::str::FromStr;
use tracing::warn;

/// Grading lifecycle of a finalized match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradingState {
    Pending,
    Started,
    Complete,
}

impl GradingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradingState::Pending => "pending",
            GradingState::Started => "started",
            GradingState::Complete => "complete",
        }
    }
}

impl FromStr for GradingState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GradingState::Pending),
            "started" => Ok(GradingState::Started),
            "complete" => Ok(GradingState::Complete),
            other => Err(format!("unknown grading state: {}", other)),
        }
    }
}

/// A match as stored, with feed metadata and grading bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchRow {
    pub match_id: MatchId,
    pub sport: String,
    pub league: String,
    pub starts_at: DateTime<Utc>,
    pub home_score: Option<i64>,
    pub away_score: Option<i64>,
    pub status: MatchStatus,
    pub finalized_at: Option<DateTime<Utc>>,
    pub event_outcomes: BTreeMap<String, bool>,
    pub grading_state: GradingState,
}

pub(crate) fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub(crate) fn from_ms(ms: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ms).unwrap_or_else(|| {
        warn!(ms, "timestamp out of range, clamping to epoch");
        DateTime::<Utc>::UNIX_EPOCH
    })
}

pub(crate) fn parse_points(s: &str, context: &str) -> Points {
    Points::from_str_canonical(s).unwrap_or_else(|e| {
        warn!(value = %s, context, error = %e, "failed to parse stored decimal, using zero");
        Points::zero()
    })
}

fn decode_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(e))
}

fn parse_state(s: &str) -> PredictionState {
    PredictionState::from_str(s).unwrap_or_else(|e| {
        warn!(error = %e, "unknown prediction state in storage, treating as pending");
        PredictionState::Pending
    })
}

/// Repository for database operations.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    /// Storage liveness probe for the readiness endpoint.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    // =========================================================================
    // Contest operations
    // =========================================================================

    /// Insert a new contest. Fails if the id already exists.
    pub async fn insert_contest(&self, contest: &Contest) -> Result<(), sqlx::Error> {
        let rules_json = serde_json::to_string(&contest.rules).map_err(decode_err)?;
        sqlx::query(
            r#"
            INSERT INTO contests (contest_id, status, starts_at, ends_at, rules_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(contest.contest_id.to_string())
        .bind(contest.status.as_str())
        .bind(to_ms(contest.starts_at))
        .bind(to_ms(contest.ends_at))
        .bind(rules_json)
        .bind(to_ms(contest.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_contest(&self, contest_id: ContestId) -> Result<Option<Contest>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT contest_id, status, starts_at, ends_at, rules_json, created_at
            FROM contests WHERE contest_id = ?
            "#,
        )
        .bind(contest_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| contest_from_row(&row)).transpose()
    }

    /// Drive `draft -> active`. Returns false when the contest was not in
    /// draft (activation happens exactly once).
    pub async fn activate_contest(&self, contest_id: ContestId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE contests SET status = 'active' WHERE contest_id = ? AND status = 'draft'",
        )
        .bind(contest_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Move an active contest to a terminal status. Terminal rows are never
    /// updated again.
    pub async fn close_contest(
        &self,
        contest_id: ContestId,
        status: ContestStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE contests SET status = ? WHERE contest_id = ? AND status = 'active'",
        )
        .bind(status.as_str())
        .bind(contest_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a contest. Refused (returns false) while any ledger row
    /// references it.
    pub async fn delete_contest(&self, contest_id: ContestId) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let ledger_rows: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM scores WHERE contest_id = ?")
                .bind(contest_id.to_string())
                .fetch_one(&mut *tx)
                .await?;
        if ledger_rows.0 > 0 {
            return Ok(false);
        }

        for table in ["leaderboards", "user_streaks", "predictions"] {
            sqlx::query(&format!("DELETE FROM {} WHERE contest_id = ?", table))
                .bind(contest_id.to_string())
                .execute(&mut *tx)
                .await?;
        }
        let result = sqlx::query("DELETE FROM contests WHERE contest_id = ?")
            .bind(contest_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_contests(&self) -> Result<Vec<Contest>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT contest_id, status, starts_at, ends_at, rules_json, created_at
            FROM contests ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(contest_from_row).collect()
    }

    // =========================================================================
    // Match operations
    // =========================================================================

    /// Register a match from the schedule feed. Re-registration refreshes
    /// metadata but never touches scores or grading state.
    pub async fn register_match(
        &self,
        match_id: MatchId,
        sport: &str,
        league: &str,
        starts_at: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO matches (match_id, sport, league, starts_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(match_id) DO UPDATE SET
                sport = excluded.sport,
                league = excluded.league,
                starts_at = excluded.starts_at
            "#,
        )
        .bind(match_id.to_string())
        .bind(sport)
        .bind(league)
        .bind(to_ms(starts_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_match(&self, match_id: MatchId) -> Result<Option<MatchRow>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT match_id, sport, league, starts_at, home_score, away_score,
                   status, finalized_at, event_outcomes_json, grading_state
            FROM matches WHERE match_id = ?
            "#,
        )
        .bind(match_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| match_from_row(&row)).transpose()
    }

    /// Record a finalized outcome on the match row.
    pub async fn apply_match_outcome(&self, outcome: &MatchOutcome) -> Result<(), sqlx::Error> {
        let events_json = serde_json::to_string(&outcome.event_outcomes).map_err(decode_err)?;
        sqlx::query(
            r#"
            UPDATE matches
            SET home_score = ?, away_score = ?, status = ?, finalized_at = ?,
                event_outcomes_json = ?
            WHERE match_id = ?
            "#,
        )
        .bind(outcome.home_score)
        .bind(outcome.away_score)
        .bind(outcome.status.as_str())
        .bind(to_ms(outcome.finalized_at))
        .bind(events_json)
        .bind(outcome.match_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_grading_state(
        &self,
        match_id: MatchId,
        state: GradingState,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE matches SET grading_state = ? WHERE match_id = ?")
            .bind(state.as_str())
            .bind(match_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Matches whose grading was started but never finished, plus completed
    /// matches never picked up at all. Used to republish tasks on startup.
    pub async fn matches_with_incomplete_grading(&self) -> Result<Vec<MatchRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT match_id, sport, league, starts_at, home_score, away_score,
                   status, finalized_at, event_outcomes_json, grading_state
            FROM matches
            WHERE grading_state = 'started'
               OR (status IN ('completed', 'cancelled', 'postponed') AND grading_state = 'pending')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(match_from_row).collect()
    }

    // =========================================================================
    // Prediction operations
    // =========================================================================

    /// Insert or replace a user's prediction for a match.
    ///
    /// The `(user, contest, match)` row is unique; a re-submission replaces
    /// the payload in place and keeps the original prediction id. Rows in a
    /// terminal state are never overwritten.
    pub async fn upsert_prediction(
        &self,
        prediction: &Prediction,
    ) -> Result<PredictionId, sqlx::Error> {
        let payload_json = serde_json::to_string(&prediction.payload).map_err(decode_err)?;
        sqlx::query(
            r#"
            INSERT INTO predictions
                (prediction_id, user_id, contest_id, match_id, payload_json, submitted_at, state)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, contest_id, match_id) DO UPDATE SET
                payload_json = excluded.payload_json,
                submitted_at = excluded.submitted_at,
                state = excluded.state
            WHERE predictions.state NOT IN ('scored', 'voided', 'skipped')
            "#,
        )
        .bind(prediction.prediction_id.to_string())
        .bind(prediction.user_id.as_str())
        .bind(prediction.contest_id.to_string())
        .bind(prediction.match_id.to_string())
        .bind(payload_json)
        .bind(to_ms(prediction.submitted_at))
        .bind(prediction.state.as_str())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT prediction_id FROM predictions WHERE user_id = ? AND contest_id = ? AND match_id = ?",
        )
        .bind(prediction.user_id.as_str())
        .bind(prediction.contest_id.to_string())
        .bind(prediction.match_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        let id: String = row.get("prediction_id");
        PredictionId::from_str(&id).map_err(decode_err)
    }

    pub async fn get_prediction(
        &self,
        prediction_id: PredictionId,
    ) -> Result<Option<Prediction>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT prediction_id, user_id, contest_id, match_id, payload_json, submitted_at, state
            FROM predictions WHERE prediction_id = ?
            "#,
        )
        .bind(prediction_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| prediction_from_row(&row)).transpose()
    }

    /// Predictions for a match that have not reached a terminal state.
    pub async fn unscored_predictions_for_match(
        &self,
        match_id: MatchId,
    ) -> Result<Vec<Prediction>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT prediction_id, user_id, contest_id, match_id, payload_json, submitted_at, state
            FROM predictions
            WHERE match_id = ? AND state IN ('submitted', 'pending', 'gradable')
            ORDER BY submitted_at ASC, prediction_id ASC
            "#,
        )
        .bind(match_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(prediction_from_row).collect()
    }

    pub async fn count_unscored_predictions_for_match(
        &self,
        match_id: MatchId,
    ) -> Result<i64, sqlx::Error> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM predictions
            WHERE match_id = ? AND state IN ('submitted', 'pending', 'gradable')
            "#,
        )
        .bind(match_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn set_prediction_state(
        &self,
        prediction_id: PredictionId,
        state: PredictionState,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE predictions SET state = ? WHERE prediction_id = ?")
            .bind(state.as_str())
            .bind(prediction_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a match's waiting predictions to `gradable` once its outcome is
    /// final. Terminal rows are untouched.
    pub async fn mark_predictions_gradable(&self, match_id: MatchId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE predictions SET state = 'gradable'
            WHERE match_id = ? AND state IN ('submitted', 'pending')
            "#,
        )
        .bind(match_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Void every unscored prediction tied to a match (cancellation or
    /// postponement). Returns the number of rows released.
    pub async fn void_predictions_for_match(&self, match_id: MatchId) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE predictions SET state = 'voided'
            WHERE match_id = ? AND state IN ('submitted', 'pending', 'gradable')
            "#,
        )
        .bind(match_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn contest_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Contest, sqlx::Error> {
    let contest_id: String = row.get("contest_id");
    let status: String = row.get("status");
    let rules_json: String = row.get("rules_json");

    let rules: RulesDocument = serde_json::from_str(&rules_json).map_err(decode_err)?;
    Ok(Contest {
        contest_id: ContestId::from_str(&contest_id).map_err(decode_err)?,
        status: ContestStatus::from_str(&status)
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
        starts_at: from_ms(row.get("starts_at")),
        ends_at: from_ms(row.get("ends_at")),
        rules,
        created_at: from_ms(row.get("created_at")),
    })
}

fn match_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MatchRow, sqlx::Error> {
    let match_id: String = row.get("match_id");
    let status: String = row.get("status");
    let grading_state: String = row.get("grading_state");
    let events_json: Option<String> = row.get("event_outcomes_json");

    let event_outcomes = match events_json {
        Some(json) => serde_json::from_str(&json).map_err(decode_err)?,
        None => BTreeMap::new(),
    };

    Ok(MatchRow {
        match_id: MatchId::from_str(&match_id).map_err(decode_err)?,
        sport: row.get("sport"),
        league: row.get("league"),
        starts_at: from_ms(row.get("starts_at")),
        home_score: row.get("home_score"),
        away_score: row.get("away_score"),
        status: MatchStatus::from_str(&status).map_err(|e| sqlx::Error::Decode(e.into()))?,
        finalized_at: row.get::<Option<i64>, _>("finalized_at").map(from_ms),
        event_outcomes,
        grading_state: GradingState::from_str(&grading_state)
            .map_err(|e| sqlx::Error::Decode(e.into()))?,
    })
}

fn prediction_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Prediction, sqlx::Error> {
    let prediction_id: String = row.get("prediction_id");
    let user_id: String = row.get("user_id");
    let contest_id: String = row.get("contest_id");
    let match_id: String = row.get("match_id");
    let payload_json: String = row.get("payload_json");
    let state: String = row.get("state");

    let payload: PredictionPayload = serde_json::from_str(&payload_json).map_err(decode_err)?;
    Ok(Prediction {
        prediction_id: PredictionId::from_str(&prediction_id).map_err(decode_err)?,
        user_id: UserId::new(user_id),
        contest_id: ContestId::from_str(&contest_id).map_err(decode_err)?,
        match_id: MatchId::from_str(&match_id).map_err(decode_err)?,
        payload,
        submitted_at: from_ms(row.get("submitted_at")),
        state: parse_state(&state),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::init_db;
    use crate::domain::StandardScoring;
    use chrono::TimeZone;
    use tempfile::TempDir;

    pub(crate) async fn setup_repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }

    pub(crate) fn test_contest() -> Contest {
        let starts = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        Contest {
            contest_id: ContestId::generate(),
            status: ContestStatus::Active,
            starts_at: starts,
            ends_at: starts + chrono::Duration::days(30),
            rules: RulesDocument::Standard {
                scoring: StandardScoring {
                    exact_score: Points::from_i64(5),
                    goal_difference: Points::from_i64(3),
                    correct_outcome: Points::from_i64(1),
                    outcome_plus_team_goals: Points::from_i64(1),
                    any_other: Points::from_i64(4),
                },
            },
            created_at: starts,
        }
    }

    #[tokio::test]
    async fn test_contest_roundtrip() {
        let (repo, _temp) = setup_repo().await;
        let contest = test_contest();
        repo.insert_contest(&contest).await.unwrap();

        let loaded = repo.get_contest(contest.contest_id).await.unwrap().unwrap();
        assert_eq!(loaded, contest);
    }

    #[tokio::test]
    async fn test_activate_contest_exactly_once() {
        let (repo, _temp) = setup_repo().await;
        let mut contest = test_contest();
        contest.status = ContestStatus::Draft;
        repo.insert_contest(&contest).await.unwrap();

        assert!(repo.activate_contest(contest.contest_id).await.unwrap());
        assert!(!repo.activate_contest(contest.contest_id).await.unwrap());

        let loaded = repo.get_contest(contest.contest_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, ContestStatus::Active);
    }

    #[tokio::test]
    async fn test_prediction_upsert_replaces_before_grading() {
        let (repo, _temp) = setup_repo().await;
        let contest = test_contest();
        let match_id = MatchId::generate();
        let submitted = contest.starts_at + chrono::Duration::days(1);

        let mut prediction = Prediction {
            prediction_id: PredictionId::generate(),
            user_id: UserId::new("u1".to_string()),
            contest_id: contest.contest_id,
            match_id,
            payload: PredictionPayload::Score {
                home: 1,
                away: 0,
                any_other: false,
            },
            submitted_at: submitted,
            state: PredictionState::Submitted,
        };

        let first_id = repo.upsert_prediction(&prediction).await.unwrap();

        prediction.prediction_id = PredictionId::generate();
        prediction.payload = PredictionPayload::Score {
            home: 2,
            away: 1,
            any_other: false,
        };
        let second_id = repo.upsert_prediction(&prediction).await.unwrap();
        assert_eq!(first_id, second_id, "resubmission keeps the original id");

        let loaded = repo.get_prediction(first_id).await.unwrap().unwrap();
        assert_eq!(
            loaded.payload,
            PredictionPayload::Score {
                home: 2,
                away: 1,
                any_other: false
            }
        );
    }

    #[tokio::test]
    async fn test_void_predictions_for_match() {
        let (repo, _temp) = setup_repo().await;
        let contest = test_contest();
        let match_id = MatchId::generate();

        for user in ["u1", "u2"] {
            let prediction = Prediction {
                prediction_id: PredictionId::generate(),
                user_id: UserId::new(user.to_string()),
                contest_id: contest.contest_id,
                match_id,
                payload: PredictionPayload::Score {
                    home: 1,
                    away: 0,
                    any_other: false,
                },
                submitted_at: contest.starts_at,
                state: PredictionState::Submitted,
            };
            repo.upsert_prediction(&prediction).await.unwrap();
        }

        let voided = repo.void_predictions_for_match(match_id).await.unwrap();
        assert_eq!(voided, 2);
        assert_eq!(
            repo.count_unscored_predictions_for_match(match_id)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_match_registration_and_outcome() {
        let (repo, _temp) = setup_repo().await;
        let match_id = MatchId::generate();
        let starts = Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap();

        repo.register_match(match_id, "football", "premier-league", starts)
            .await
            .unwrap();

        let outcome = MatchOutcome {
            match_id,
            home_score: 2,
            away_score: 1,
            status: MatchStatus::Completed,
            finalized_at: starts + chrono::Duration::hours(2),
            event_outcomes: BTreeMap::new(),
        };
        repo.apply_match_outcome(&outcome).await.unwrap();
        repo.set_grading_state(match_id, GradingState::Started)
            .await
            .unwrap();

        let row = repo.get_match(match_id).await.unwrap().unwrap();
        assert_eq!(row.home_score, Some(2));
        assert_eq!(row.status, MatchStatus::Completed);
        assert_eq!(row.grading_state, GradingState::Started);
    }

    #[tokio::test]
    async fn test_delete_contest_refused_with_ledger_rows() {
        let (repo, _temp) = setup_repo().await;
        let contest = test_contest();
        repo.insert_contest(&contest).await.unwrap();

        let score = ScoreRow {
            user_id: UserId::new("u1".to_string()),
            contest_id: contest.contest_id,
            prediction_id: PredictionId::generate(),
            base_points: Points::from_i64(5),
            time_coefficient: Points::one(),
            streak_multiplier: Points::one(),
            final_points: Points::from_i64(5),
            scored_at: contest.starts_at,
            corrected: false,
        };
        assert!(repo.insert_score(&score).await.unwrap());

        assert!(!repo.delete_contest(contest.contest_id).await.unwrap());
        assert!(repo.get_contest(contest.contest_id).await.unwrap().is_some());
    }
}
