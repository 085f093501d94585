//! Ledger and streak operations.
//!
//! The scores table is the write-authoritative store; every projection is
//! rebuildable from it. Inserts are idempotent on the
//! `(user, contest, prediction)` composite key.

use super::{from_ms, parse_points, to_ms, Repository};
use crate::domain::{ContestId, Points, PredictionId, UserId};
use crate::engine::StreakState;
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::HashMap;
use std::str::FromStr;

/// One ledger row: the immutable record of a graded prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub user_id: UserId,
    pub contest_id: ContestId,
    pub prediction_id: PredictionId,
    pub base_points: Points,
    pub time_coefficient: Points,
    pub streak_multiplier: Points,
    pub final_points: Points,
    pub scored_at: DateTime<Utc>,
    pub corrected: bool,
}

impl Repository {
    /// Insert a ledger row idempotently.
    ///
    /// Returns true if the row was new, false on a composite-key conflict
    /// (an earlier grade of the same prediction already landed).
    pub async fn insert_score(&self, score: &ScoreRow) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO scores
                (user_id, contest_id, prediction_id, base_points, time_coefficient,
                 streak_multiplier, final_points, scored_at, corrected)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, contest_id, prediction_id) DO NOTHING
            "#,
        )
        .bind(score.user_id.as_str())
        .bind(score.contest_id.to_string())
        .bind(score.prediction_id.to_string())
        .bind(score.base_points.to_canonical_string())
        .bind(score.time_coefficient.to_canonical_string())
        .bind(score.streak_multiplier.to_canonical_string())
        .bind(score.final_points.to_canonical_string())
        .bind(to_ms(score.scored_at))
        .bind(score.corrected as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn get_score(
        &self,
        user_id: &UserId,
        contest_id: ContestId,
        prediction_id: PredictionId,
    ) -> Result<Option<ScoreRow>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT user_id, contest_id, prediction_id, base_points, time_coefficient,
                   streak_multiplier, final_points, scored_at, corrected
            FROM scores
            WHERE user_id = ? AND contest_id = ? AND prediction_id = ?
            "#,
        )
        .bind(user_id.as_str())
        .bind(contest_id.to_string())
        .bind(prediction_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| score_from_row(&row)).transpose()
    }

    /// Corrective re-grade: rewrite `final_points` and flag the row in audit.
    ///
    /// Returns the delta (`new - old`) the projection must absorb, or None
    /// if no such ledger row exists.
    pub async fn correct_score(
        &self,
        user_id: &UserId,
        contest_id: ContestId,
        prediction_id: PredictionId,
        new_final_points: Points,
    ) -> Result<Option<Points>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            r#"
            SELECT final_points FROM scores
            WHERE user_id = ? AND contest_id = ? AND prediction_id = ?
            "#,
        )
        .bind(user_id.as_str())
        .bind(contest_id.to_string())
        .bind(prediction_id.to_string())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let old: String = row.get("final_points");
        let old = parse_points(&old, "scores.final_points");

        sqlx::query(
            r#"
            UPDATE scores SET final_points = ?, corrected = 1
            WHERE user_id = ? AND contest_id = ? AND prediction_id = ?
            "#,
        )
        .bind(new_final_points.to_canonical_string())
        .bind(user_id.as_str())
        .bind(contest_id.to_string())
        .bind(prediction_id.to_string())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(new_final_points - old))
    }

    /// Ledger aggregate per user for one contest: the ground truth every
    /// projection must agree with.
    pub async fn ledger_totals(
        &self,
        contest_id: ContestId,
    ) -> Result<HashMap<UserId, Points>, sqlx::Error> {
        let rows = sqlx::query("SELECT user_id, final_points FROM scores WHERE contest_id = ?")
            .bind(contest_id.to_string())
            .fetch_all(&self.pool)
            .await?;

        let mut totals: HashMap<UserId, Points> = HashMap::new();
        for row in rows {
            let user: String = row.get("user_id");
            let points: String = row.get("final_points");
            let entry = totals
                .entry(UserId::new(user))
                .or_insert_with(Points::zero);
            *entry = *entry + parse_points(&points, "scores.final_points");
        }
        Ok(totals)
    }

    pub async fn ledger_total_for_user(
        &self,
        user_id: &UserId,
        contest_id: ContestId,
    ) -> Result<Points, sqlx::Error> {
        let rows = sqlx::query(
            "SELECT final_points FROM scores WHERE user_id = ? AND contest_id = ?",
        )
        .bind(user_id.as_str())
        .bind(contest_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| parse_points(&row.get::<String, _>("final_points"), "scores.final_points"))
            .sum())
    }

    /// Earliest `scored_at` per user in a contest, for the rank tie-break.
    pub async fn first_scored_at(
        &self,
        contest_id: ContestId,
    ) -> Result<HashMap<UserId, DateTime<Utc>>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, MIN(scored_at) AS first_scored
            FROM scores WHERE contest_id = ? GROUP BY user_id
            "#,
        )
        .bind(contest_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let user: String = row.get("user_id");
                let at: i64 = row.get("first_scored");
                (UserId::new(user), from_ms(at))
            })
            .collect())
    }

    // =========================================================================
    // Streak operations
    // =========================================================================

    pub async fn get_streak(
        &self,
        user_id: &UserId,
        contest_id: ContestId,
    ) -> Result<StreakState, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT current_streak, max_streak, last_prediction, last_correct
            FROM user_streaks WHERE user_id = ? AND contest_id = ?
            "#,
        )
        .bind(user_id.as_str())
        .bind(contest_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => StreakState {
                current_streak: row.get("current_streak"),
                max_streak: row.get("max_streak"),
                last_prediction: row.get::<Option<i64>, _>("last_prediction").map(from_ms),
                last_correct: row.get::<Option<i64>, _>("last_correct").map(from_ms),
            },
            None => StreakState::new(),
        })
    }

    pub async fn upsert_streak(
        &self,
        user_id: &UserId,
        contest_id: ContestId,
        state: &StreakState,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_streaks
                (user_id, contest_id, current_streak, max_streak, last_prediction, last_correct)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, contest_id) DO UPDATE SET
                current_streak = excluded.current_streak,
                max_streak = excluded.max_streak,
                last_prediction = excluded.last_prediction,
                last_correct = excluded.last_correct
            "#,
        )
        .bind(user_id.as_str())
        .bind(contest_id.to_string())
        .bind(state.current_streak)
        .bind(state.max_streak)
        .bind(state.last_prediction.map(to_ms))
        .bind(state.last_correct.map(to_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Streak states for a set of users in one contest (leaderboard
    /// enrichment).
    pub async fn streaks_for_contest(
        &self,
        contest_id: ContestId,
    ) -> Result<HashMap<UserId, StreakState>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, current_streak, max_streak, last_prediction, last_correct
            FROM user_streaks WHERE contest_id = ?
            "#,
        )
        .bind(contest_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let user: String = row.get("user_id");
                (
                    UserId::new(user),
                    StreakState {
                        current_streak: row.get("current_streak"),
                        max_streak: row.get("max_streak"),
                        last_prediction: row
                            .get::<Option<i64>, _>("last_prediction")
                            .map(from_ms),
                        last_correct: row.get::<Option<i64>, _>("last_correct").map(from_ms),
                    },
                )
            })
            .collect())
    }
}

fn score_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScoreRow, sqlx::Error> {
    let user_id: String = row.get("user_id");
    let contest_id: String = row.get("contest_id");
    let prediction_id: String = row.get("prediction_id");

    Ok(ScoreRow {
        user_id: UserId::new(user_id),
        contest_id: ContestId::from_str(&contest_id)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        prediction_id: PredictionId::from_str(&prediction_id)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        base_points: parse_points(&row.get::<String, _>("base_points"), "scores.base_points"),
        time_coefficient: parse_points(
            &row.get::<String, _>("time_coefficient"),
            "scores.time_coefficient",
        ),
        streak_multiplier: parse_points(
            &row.get::<String, _>("streak_multiplier"),
            "scores.streak_multiplier",
        ),
        final_points: parse_points(&row.get::<String, _>("final_points"), "scores.final_points"),
        scored_at: from_ms(row.get("scored_at")),
        corrected: row.get::<i64, _>("corrected") != 0,
    })
}
