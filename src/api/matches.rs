use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::AppState;
use crate::domain::{MatchId, MatchOutcome, MatchStatus};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct RegisterMatchRequest {
    pub match_id: Option<MatchId>,
    pub sport: String,
    pub league: String,
    pub starts_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct RegisterMatchResponse {
    pub match_id: MatchId,
}

/// Register a match from the schedule feed so predictions can reference it.
pub async fn register_match(
    State(state): State<AppState>,
    Json(body): Json<RegisterMatchRequest>,
) -> Result<Json<RegisterMatchResponse>, AppError> {
    if body.sport.trim().is_empty() || body.league.trim().is_empty() {
        return Err(AppError::BadRequest(
            "sport and league must be non-empty".to_string(),
        ));
    }

    let match_id = body.match_id.unwrap_or_else(MatchId::generate);
    state
        .repo
        .register_match(match_id, body.sport.trim(), body.league.trim(), body.starts_at)
        .await?;

    Ok(Json(RegisterMatchResponse { match_id }))
}

#[derive(Debug, Deserialize)]
pub struct FinalizeMatchRequest {
    pub match_id: MatchId,
    pub home_score: i64,
    pub away_score: i64,
    /// Defaults to completed; cancelled and postponed void instead of grade.
    pub status: Option<MatchStatus>,
    pub finalized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub event_outcomes: BTreeMap<String, bool>,
}

#[derive(Debug, Serialize)]
pub struct FinalizeMatchResponse {
    pub tasks_published: usize,
    pub predictions_voided: u64,
}

/// Entry point of Result Ingress: a finalized outcome fans out into one
/// grading task per unscored prediction.
pub async fn finalize_match(
    State(state): State<AppState>,
    Json(body): Json<FinalizeMatchRequest>,
) -> Result<Json<FinalizeMatchResponse>, AppError> {
    let outcome = MatchOutcome {
        match_id: body.match_id,
        home_score: body.home_score,
        away_score: body.away_score,
        status: body.status.unwrap_or(MatchStatus::Completed),
        finalized_at: body.finalized_at.unwrap_or_else(Utc::now),
        event_outcomes: body.event_outcomes,
    };

    let summary = state.ingress.handle_outcome(&outcome).await?;
    Ok(Json(FinalizeMatchResponse {
        tasks_published: summary.tasks_published,
        predictions_voided: summary.predictions_voided,
    }))
}
