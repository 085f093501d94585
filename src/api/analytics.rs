use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::str::FromStr;

use crate::analytics::{TimeRange, UserAnalytics};
use crate::api::AppState;
use crate::domain::UserId;
use crate::error::AppError;

#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    pub user: String,
    pub range: Option<String>,
}

pub async fn get_user_analytics(
    Query(params): Query<AnalyticsQuery>,
    State(state): State<AppState>,
) -> Result<Json<UserAnalytics>, AppError> {
    if params.user.trim().is_empty() {
        return Err(AppError::BadRequest("user must be non-empty".to_string()));
    }
    let range = match params.range.as_deref() {
        None => TimeRange::All,
        Some(raw) => TimeRange::from_str(raw)
            .map_err(|_| AppError::BadRequest("range must be one of: 7d, 30d, 90d, all".to_string()))?,
    };

    let user = UserId::new(params.user.trim().to_string());
    let analytics = state
        .analytics
        .user_analytics(&user, range, Utc::now())
        .await?;
    Ok(Json(analytics))
}
