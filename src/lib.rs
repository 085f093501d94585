pub mod analytics;
pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod events;
pub mod orchestration;
pub mod projection;

pub use cache::{HotIndex, MemoryIndex};
pub use config::Config;
pub use db::{init_db, Repository};
pub use domain::{
    Contest, ContestId, ContestStatus, MatchId, MatchOutcome, MatchStatus, Points, Prediction,
    PredictionId, PredictionPayload, PredictionState, RulesDocument, UserId,
};
pub use error::AppError;
pub use events::{EventSink, LogEventSink, PredictionScored, RecordingEventSink};
pub use orchestration::{GradingCoordinator, GradingTask, ResultIngress, TaskQueue, WorkerPool};
pub use projection::LeaderboardProjection;
