use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{Contest, ContestId, ContestStatus, RulesDocument};
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CreateContestRequest {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub rules: RulesDocument,
}

#[derive(Debug, Serialize)]
pub struct CreateContestResponse {
    pub contest_id: ContestId,
    pub status: ContestStatus,
}

/// Create a contest in draft. The rules document is validated here; a
/// contest with invalid rules never exists.
pub async fn create_contest(
    State(state): State<AppState>,
    Json(body): Json<CreateContestRequest>,
) -> Result<Json<CreateContestResponse>, AppError> {
    body.rules.validate()?;
    if body.ends_at <= body.starts_at {
        return Err(AppError::BadRequest(
            "ends_at must be after starts_at".to_string(),
        ));
    }

    let contest = Contest {
        contest_id: ContestId::generate(),
        status: ContestStatus::Draft,
        starts_at: body.starts_at,
        ends_at: body.ends_at,
        rules: body.rules,
        created_at: Utc::now(),
    };
    state.repo.insert_contest(&contest).await?;

    Ok(Json(CreateContestResponse {
        contest_id: contest.contest_id,
        status: contest.status,
    }))
}

/// Drive `draft -> active`. A second activation is a conflict: contests
/// activate exactly once.
pub async fn activate_contest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let contest_id = parse_contest_id(&id)?;
    let contest = state
        .repo
        .get_contest(contest_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("contest {}", contest_id)))?;

    if state.repo.activate_contest(contest_id).await? {
        Ok(Json(serde_json::json!({"status": "active"})))
    } else {
        Err(AppError::Conflict(format!(
            "contest {} is {} and cannot be activated",
            contest_id,
            contest.status.as_str()
        )))
    }
}

pub async fn delete_contest(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let contest_id = parse_contest_id(&id)?;
    if state.repo.get_contest(contest_id).await?.is_none() {
        return Err(AppError::NotFound(format!("contest {}", contest_id)));
    }

    if state.repo.delete_contest(contest_id).await? {
        Ok(Json(serde_json::json!({"status": "deleted"})))
    } else {
        Err(AppError::Conflict(format!(
            "contest {} has ledger rows and cannot be deleted",
            contest_id
        )))
    }
}

pub(crate) fn parse_contest_id(raw: &str) -> Result<ContestId, AppError> {
    ContestId::from_str(raw)
        .map_err(|_| AppError::BadRequest(format!("invalid contest id: {}", raw)))
}
