//! Events emitted by the grading pipeline.
//!
//! Delivery (chat, email) is outside this service; the sink trait is the
//! boundary. The shipped sink logs structured events; tests use the
//! recording sink.

use crate::domain::{ContestId, Points, PredictionId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Mutex;

/// Emitted exactly once per newly scored prediction (suppressed when a
/// re-grade short-circuits on the ledger's composite key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionScored {
    pub user_id: UserId,
    pub contest_id: ContestId,
    pub prediction_id: PredictionId,
    pub base_points: Points,
    pub time_coefficient: Points,
    pub streak_multiplier: Points,
    pub final_points: Points,
    pub new_total: Points,
    pub new_rank: Option<i64>,
}

#[async_trait]
pub trait EventSink: Send + Sync + fmt::Debug {
    async fn publish(&self, event: PredictionScored);
}

/// Sink that emits events as structured log lines.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(&self, event: PredictionScored) {
        tracing::info!(
            user = %event.user_id,
            contest = %event.contest_id,
            prediction = %event.prediction_id,
            final_points = %event.final_points,
            new_total = %event.new_total,
            new_rank = ?event.new_rank,
            "prediction scored"
        );
    }
}

/// Sink that records every published event, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<PredictionScored>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<PredictionScored> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: PredictionScored) {
        self.events.lock().await.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> PredictionScored {
        PredictionScored {
            user_id: UserId::new("u1".to_string()),
            contest_id: ContestId::generate(),
            prediction_id: PredictionId::generate(),
            base_points: Points::from_i64(5),
            time_coefficient: Points::from_parts(20, 1),
            streak_multiplier: Points::one(),
            final_points: Points::from_i64(10),
            new_total: Points::from_i64(10),
            new_rank: Some(1),
        }
    }

    #[tokio::test]
    async fn test_recording_sink_captures_events() {
        let sink = RecordingEventSink::new();
        let event = sample_event();
        sink.publish(event.clone()).await;

        let events = sink.events().await;
        assert_eq!(events, vec![event]);
    }

    #[test]
    fn test_event_json_roundtrip() {
        let event = sample_event();
        let json = serde_json::to_string(&event).unwrap();
        let back: PredictionScored = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
