use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::api::contests::parse_contest_id;
use crate::api::AppState;
use crate::domain::{Points, UserId};
use crate::engine::streak_multiplier;
use crate::error::AppError;
use crate::projection::RankedEntry;

const DEFAULT_TOP_N: usize = 10;
const MAX_TOP_N: usize = 500;

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub contest: String,
    pub top: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: i64,
    pub user: String,
    pub total_points: Points,
    pub current_streak: i64,
    pub max_streak: i64,
    pub multiplier: Points,
}

impl From<RankedEntry> for LeaderboardEntry {
    fn from(entry: RankedEntry) -> Self {
        let multiplier = streak_multiplier(entry.current_streak);
        LeaderboardEntry {
            rank: entry.rank,
            user: entry.user_id.as_str().to_string(),
            total_points: entry.total_points,
            current_streak: entry.current_streak,
            max_streak: entry.max_streak,
            multiplier,
        }
    }
}

pub async fn get_leaderboard(
    Query(params): Query<LeaderboardQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    let contest_id = parse_contest_id(&params.contest)?;
    let top = params.top.unwrap_or(DEFAULT_TOP_N).min(MAX_TOP_N);
    if top == 0 {
        return Err(AppError::BadRequest("top must be positive".to_string()));
    }

    let entries = state.projection.top_n(contest_id, top).await?;
    Ok(Json(entries.into_iter().map(LeaderboardEntry::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct UserRankQuery {
    pub contest: String,
    pub user: String,
}

#[derive(Debug, Serialize)]
pub struct UserRankResponse {
    pub rank: i64,
    pub total_points: Points,
    pub current_streak: i64,
    pub max_streak: i64,
}

pub async fn get_user_rank(
    Query(params): Query<UserRankQuery>,
    State(state): State<AppState>,
) -> Result<Json<UserRankResponse>, AppError> {
    let contest_id = parse_contest_id(&params.contest)?;
    let user = UserId::new(params.user);

    let entry = state
        .projection
        .user_rank(contest_id, &user)
        .await?
        .ok_or_else(|| AppError::NotFound("not_ranked".to_string()))?;

    Ok(Json(UserRankResponse {
        rank: entry.rank,
        total_points: entry.total_points,
        current_streak: entry.current_streak,
        max_streak: entry.max_streak,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RecomputeQuery {
    pub contest: String,
}

#[derive(Debug, Serialize)]
pub struct RecomputeResponse {
    pub users_ranked: usize,
}

/// Administrator-triggered rank recomputation. Repairs the hot index first
/// when it is flagged dirty.
pub async fn recompute_leaderboard(
    Query(params): Query<RecomputeQuery>,
    State(state): State<AppState>,
) -> Result<Json<RecomputeResponse>, AppError> {
    let contest_id = parse_contest_id(&params.contest)?;

    if state.projection.is_dirty(contest_id) {
        state.projection.rebuild_hot(contest_id).await?;
    }
    let ranked = state.projection.recompute_ranks(contest_id, Utc::now()).await?;

    Ok(Json(RecomputeResponse {
        users_ranked: ranked.len(),
    }))
}
