//! Bounded grading task queue.
//!
//! Backpressure drops the oldest task first: tasks are re-derivable from the
//! database (unscored predictions of a finalized match), so a dropped task
//! is republished by the next resume pass rather than lost.

use crate::domain::{MatchOutcome, PredictionId};
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::Notify;
use tracing::warn;

/// Unit of grading work: one unscored prediction plus the finalized outcome
/// of its match.
#[derive(Debug, Clone, PartialEq)]
pub struct GradingTask {
    pub prediction_id: PredictionId,
    pub outcome: MatchOutcome,
}

#[derive(Debug)]
struct QueueInner {
    tasks: VecDeque<GradingTask>,
    closed: bool,
}

/// Multi-producer multi-consumer bounded queue drained by the worker pool.
#[derive(Debug)]
pub struct TaskQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                tasks: VecDeque::new(),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Enqueue a task. Returns false if the queue is closed.
    ///
    /// At capacity the oldest task is dropped to make room.
    pub fn push(&self, task: GradingTask) -> bool {
        {
            let mut inner = self.inner.lock().expect("task queue poisoned");
            if inner.closed {
                return false;
            }
            if inner.tasks.len() >= self.capacity {
                if let Some(dropped) = inner.tasks.pop_front() {
                    warn!(
                        prediction = %dropped.prediction_id,
                        "task queue saturated, dropping oldest task"
                    );
                }
            }
            inner.tasks.push_back(task);
        }
        self.notify.notify_one();
        true
    }

    /// Wait for the next task. Returns None once the queue is closed and
    /// fully drained.
    pub async fn pop(&self) -> Option<GradingTask> {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().expect("task queue poisoned");
                if let Some(task) = inner.tasks.pop_front() {
                    return Some(task);
                }
                if inner.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Stop accepting tasks. Workers drain what is queued, then exit.
    pub fn close(&self) {
        self.inner.lock().expect("task queue poisoned").closed = true;
        self.notify.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("task queue poisoned").tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MatchId, MatchStatus};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn task() -> GradingTask {
        GradingTask {
            prediction_id: PredictionId::generate(),
            outcome: MatchOutcome {
                match_id: MatchId::generate(),
                home_score: 1,
                away_score: 0,
                status: MatchStatus::Completed,
                finalized_at: Utc::now(),
                event_outcomes: BTreeMap::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new(10);
        let t1 = task();
        let t2 = task();
        queue.push(t1.clone());
        queue.push(t2.clone());

        assert_eq!(queue.pop().await, Some(t1));
        assert_eq!(queue.pop().await, Some(t2));
    }

    #[tokio::test]
    async fn test_saturation_drops_oldest() {
        let queue = TaskQueue::new(2);
        let t1 = task();
        let t2 = task();
        let t3 = task();
        queue.push(t1);
        queue.push(t2.clone());
        queue.push(t3.clone());

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().await, Some(t2));
        assert_eq!(queue.pop().await, Some(t3));
    }

    #[tokio::test]
    async fn test_close_rejects_new_and_drains_existing() {
        let queue = TaskQueue::new(10);
        let t1 = task();
        queue.push(t1.clone());
        queue.close();

        assert!(!queue.push(task()), "closed queue rejects pushes");
        assert_eq!(queue.pop().await, Some(t1));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let queue = std::sync::Arc::new(TaskQueue::new(10));
        let popper = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::task::yield_now().await;
        let t = task();
        queue.push(t.clone());

        let popped = popper.await.unwrap();
        assert_eq!(popped, Some(t));
    }
}
