pub mod analytics;
pub mod contests;
pub mod health;
pub mod leaderboard;
pub mod matches;
pub mod predictions;

use crate::analytics::AnalyticsView;
use crate::config::Config;
use crate::db::Repository;
use crate::orchestration::{GradingCoordinator, ResultIngress};
use crate::projection::LeaderboardProjection;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub projection: Arc<LeaderboardProjection>,
    pub coordinator: Arc<GradingCoordinator>,
    pub ingress: Arc<ResultIngress>,
    pub analytics: Arc<AnalyticsView>,
}

impl AppState {
    pub fn new(
        repo: Arc<Repository>,
        config: Config,
        projection: Arc<LeaderboardProjection>,
        coordinator: Arc<GradingCoordinator>,
        ingress: Arc<ResultIngress>,
    ) -> Self {
        let analytics = Arc::new(AnalyticsView::new(repo.clone()));
        Self {
            repo,
            config,
            projection,
            coordinator,
            ingress,
            analytics,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/contests", post(contests::create_contest))
        .route("/v1/contests/:id", delete(contests::delete_contest))
        .route("/v1/contests/:id/activate", post(contests::activate_contest))
        .route("/v1/predictions", post(predictions::submit_prediction))
        .route("/v1/predictions/:id/void", post(predictions::void_prediction))
        .route("/v1/matches", post(matches::register_match))
        .route("/v1/matches/finalize", post(matches::finalize_match))
        .route("/v1/leaderboard", get(leaderboard::get_leaderboard))
        .route("/v1/leaderboard/rank", get(leaderboard::get_user_rank))
        .route(
            "/v1/leaderboard/recompute",
            post(leaderboard::recompute_leaderboard),
        )
        .route("/v1/analytics", get(analytics::get_user_analytics))
        .layer(cors)
        .with_state(state)
}
