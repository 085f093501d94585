use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{
    ContestId, MatchId, Prediction, PredictionId, PredictionPayload, PredictionState, UserId,
};
use crate::engine::validate_payload;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct SubmitPredictionRequest {
    pub user_id: String,
    pub contest_id: ContestId,
    pub match_id: MatchId,
    pub payload: PredictionPayload,
    /// Trusted capture time from the gateway; defaults to the server clock.
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SubmitPredictionResponse {
    pub prediction_id: PredictionId,
}

/// Accept or replace a user's prediction for a match.
///
/// Rejections are final: contest not active, match cutoff passed, or a
/// payload that does not fit the contest's rules.
pub async fn submit_prediction(
    State(state): State<AppState>,
    Json(body): Json<SubmitPredictionRequest>,
) -> Result<Json<SubmitPredictionResponse>, AppError> {
    let submitted_at = body.submitted_at.unwrap_or_else(Utc::now);

    let contest = state
        .repo
        .get_contest(body.contest_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("contest {}", body.contest_id)))?;
    if !contest.is_active_at(submitted_at) {
        return Err(AppError::BadRequest(format!(
            "contest {} is not accepting predictions",
            body.contest_id
        )));
    }

    let match_row = state
        .repo
        .get_match(body.match_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("match {}", body.match_id)))?;
    if submitted_at >= match_row.starts_at {
        return Err(AppError::BadRequest(format!(
            "match {} cutoff has passed",
            body.match_id
        )));
    }

    validate_payload(&contest.rules, &body.payload)?;

    let prediction = Prediction {
        prediction_id: PredictionId::generate(),
        user_id: UserId::new(body.user_id),
        contest_id: body.contest_id,
        match_id: body.match_id,
        payload: body.payload,
        submitted_at,
        state: PredictionState::Submitted,
    };
    let prediction_id = state.repo.upsert_prediction(&prediction).await?;

    Ok(Json(SubmitPredictionResponse { prediction_id }))
}

/// Administrator action: void a prediction, compensating the ledger and
/// projection if it was already scored.
pub async fn void_prediction(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let prediction_id = PredictionId::from_str(&id)
        .map_err(|_| AppError::BadRequest(format!("invalid prediction id: {}", id)))?;

    state.coordinator.void_prediction(prediction_id).await?;
    Ok(Json(serde_json::json!({"status": "voided"})))
}
