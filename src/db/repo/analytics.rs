//! Read-only aggregation queries over the ledger.
//!
//! Analytics takes no locks and tolerates reading a snapshot that trails
//! in-flight grading by a bounded amount.

use super::{from_ms, parse_points, to_ms, Repository};
use crate::domain::{Points, PredictionPayload, UserId};
use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::warn;

/// One scored prediction joined with its match metadata, the unit the
/// analytics view aggregates over.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRow {
    pub user_id: UserId,
    pub final_points: Points,
    pub scored_at: DateTime<Utc>,
    pub sport: String,
    pub league: String,
    pub prediction_kind: &'static str,
}

impl Repository {
    /// Scored rows for one user, optionally bounded below in time.
    pub async fn scored_rows_for_user(
        &self,
        user_id: &UserId,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ScoredRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT s.user_id, s.final_points, s.scored_at,
                   m.sport, m.league, p.payload_json
            FROM scores s
            JOIN predictions p ON p.prediction_id = s.prediction_id
            JOIN matches m ON m.match_id = p.match_id
            WHERE s.user_id = ? AND s.scored_at >= ?
            ORDER BY s.scored_at ASC
            "#,
        )
        .bind(user_id.as_str())
        .bind(since.map(to_ms).unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(scored_from_row).collect())
    }

    /// Scored rows across all users in a window, for platform comparison.
    pub async fn scored_rows_for_platform(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<ScoredRow>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT s.user_id, s.final_points, s.scored_at,
                   m.sport, m.league, p.payload_json
            FROM scores s
            JOIN predictions p ON p.prediction_id = s.prediction_id
            JOIN matches m ON m.match_id = p.match_id
            WHERE s.scored_at >= ?
            ORDER BY s.scored_at ASC
            "#,
        )
        .bind(since.map(to_ms).unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(scored_from_row).collect())
    }
}

fn scored_from_row(row: &sqlx::sqlite::SqliteRow) -> ScoredRow {
    let user_id: String = row.get("user_id");
    let payload_json: String = row.get("payload_json");

    let prediction_kind = match serde_json::from_str::<PredictionPayload>(&payload_json) {
        Ok(payload) => payload.kind(),
        Err(e) => {
            warn!(error = %e, "unparseable prediction payload in analytics join");
            "unknown"
        }
    };

    ScoredRow {
        user_id: UserId::new(user_id),
        final_points: parse_points(&row.get::<String, _>("final_points"), "scores.final_points"),
        scored_at: from_ms(row.get("scored_at")),
        sport: row.get("sport"),
        league: row.get("league"),
        prediction_kind,
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{setup_repo, test_contest};
    use super::*;
    use crate::db::repo::ScoreRow;
    use crate::domain::{MatchId, Prediction, PredictionId, PredictionState};
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_scored_rows_join_and_window() {
        let (repo, _temp) = setup_repo().await;
        let contest = test_contest();
        repo.insert_contest(&contest).await.unwrap();

        let match_id = MatchId::generate();
        let kickoff = Utc.with_ymd_and_hms(2026, 3, 10, 18, 0, 0).unwrap();
        repo.register_match(match_id, "football", "bundesliga", kickoff)
            .await
            .unwrap();

        let user = UserId::new("u1".to_string());
        let prediction = Prediction {
            prediction_id: PredictionId::generate(),
            user_id: user.clone(),
            contest_id: contest.contest_id,
            match_id,
            payload: PredictionPayload::Score {
                home: 2,
                away: 1,
                any_other: false,
            },
            submitted_at: kickoff - chrono::Duration::days(1),
            state: PredictionState::Scored,
        };
        repo.upsert_prediction(&prediction).await.unwrap();

        let scored_at = kickoff + chrono::Duration::hours(2);
        repo.insert_score(&ScoreRow {
            user_id: user.clone(),
            contest_id: contest.contest_id,
            prediction_id: prediction.prediction_id,
            base_points: Points::from_i64(5),
            time_coefficient: Points::from_parts(125, 2),
            streak_multiplier: Points::one(),
            final_points: Points::from_parts(625, 2),
            scored_at,
            corrected: false,
        })
        .await
        .unwrap();

        let rows = repo.scored_rows_for_user(&user, None).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sport, "football");
        assert_eq!(rows[0].league, "bundesliga");
        assert_eq!(rows[0].prediction_kind, "score");
        assert_eq!(rows[0].final_points, Points::from_parts(625, 2));

        let later = repo
            .scored_rows_for_user(&user, Some(scored_at + chrono::Duration::hours(1)))
            .await
            .unwrap();
        assert!(later.is_empty(), "window lower bound excludes older rows");
    }
}
