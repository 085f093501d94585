//! Durable leaderboard rows.
//!
//! These rows are a projection of the ledger: rebuildable at any time, and
//! authoritative for reads only when the hot index is cold or dirty.

use super::{from_ms, parse_points, to_ms, Repository};
use crate::domain::{ContestId, Points, UserId};
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardRow {
    pub contest_id: ContestId,
    pub user_id: UserId,
    pub total_points: Points,
    pub rank: Option<i64>,
    pub updated_at: DateTime<Utc>,
}

impl Repository {
    /// Add a grading delta to a user's durable total, creating the row on
    /// first score. Returns the new total.
    pub async fn add_to_leaderboard_total(
        &self,
        contest_id: ContestId,
        user_id: &UserId,
        delta: Points,
        now: DateTime<Utc>,
    ) -> Result<Points, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT total_points FROM leaderboards WHERE contest_id = ? AND user_id = ?",
        )
        .bind(contest_id.to_string())
        .bind(user_id.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let new_total = match row {
            Some(row) => {
                let current: String = row.get("total_points");
                parse_points(&current, "leaderboards.total_points") + delta
            }
            None => delta,
        };

        sqlx::query(
            r#"
            INSERT INTO leaderboards (contest_id, user_id, total_points, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(contest_id, user_id) DO UPDATE SET
                total_points = excluded.total_points,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(contest_id.to_string())
        .bind(user_id.as_str())
        .bind(new_total.to_canonical_string())
        .bind(to_ms(now))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(new_total)
    }

    pub async fn get_leaderboard_entry(
        &self,
        contest_id: ContestId,
        user_id: &UserId,
    ) -> Result<Option<LeaderboardRow>, sqlx::Error> {
        let row = sqlx::query(
            r#"
            SELECT contest_id, user_id, total_points, rank, updated_at
            FROM leaderboards WHERE contest_id = ? AND user_id = ?
            "#,
        )
        .bind(contest_id.to_string())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| leaderboard_from_row(&row)).transpose()
    }

    /// Every durable entry for a contest. Ordering is applied by the caller;
    /// totals are canonical strings the database cannot compare numerically.
    pub async fn leaderboard_entries(
        &self,
        contest_id: ContestId,
    ) -> Result<Vec<LeaderboardRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT contest_id, user_id, total_points, rank, updated_at
            FROM leaderboards WHERE contest_id = ?
            "#,
        )
        .bind(contest_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(leaderboard_from_row).collect()
    }

    /// Rewrite ranks for a contest in a single pass.
    pub async fn write_ranks(
        &self,
        contest_id: ContestId,
        ranks: &[(UserId, i64)],
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        for (user_id, rank) in ranks {
            sqlx::query(
                r#"
                UPDATE leaderboards SET rank = ?, updated_at = ?
                WHERE contest_id = ? AND user_id = ?
                "#,
            )
            .bind(*rank)
            .bind(to_ms(now))
            .bind(contest_id.to_string())
            .bind(user_id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Replace a contest's durable rows with ledger-aggregated totals.
    ///
    /// Idempotent; the reconciliation path when the durable table itself is
    /// suspected stale.
    pub async fn replace_leaderboard_totals(
        &self,
        contest_id: ContestId,
        totals: &[(UserId, Points)],
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM leaderboards WHERE contest_id = ?")
            .bind(contest_id.to_string())
            .execute(&mut *tx)
            .await?;

        for (user_id, total) in totals {
            sqlx::query(
                r#"
                INSERT INTO leaderboards (contest_id, user_id, total_points, updated_at)
                VALUES (?, ?, ?, ?)
                "#,
            )
            .bind(contest_id.to_string())
            .bind(user_id.as_str())
            .bind(total.to_canonical_string())
            .bind(to_ms(now))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn leaderboard_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<LeaderboardRow, sqlx::Error> {
    let contest_id: String = row.get("contest_id");
    let user_id: String = row.get("user_id");

    Ok(LeaderboardRow {
        contest_id: ContestId::from_str(&contest_id)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
        user_id: UserId::new(user_id),
        total_points: parse_points(
            &row.get::<String, _>("total_points"),
            "leaderboards.total_points",
        ),
        rank: row.get("rank"),
        updated_at: from_ms(row.get("updated_at")),
    })
}
