//! Hot leaderboard index: a per-contest sorted set.
//!
//! The index is a derived view of the durable leaderboard table and is
//! authoritative for interactive reads while clean. The trait is the seam;
//! the consistency contract (bounded op timeouts, dirty fallback, rebuild
//! from durable) lives in the projection, not in implementations.

use crate::domain::{ContestId, Points, UserId};
use async_trait::async_trait;
use std::fmt;

pub mod memory;

pub use memory::MemoryIndex;

/// Error type for hot index operations.
#[derive(Debug, Clone)]
pub enum CacheError {
    /// The operation did not complete within the configured budget.
    Timeout,
    /// The index is unreachable or refused the operation.
    Unavailable(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Timeout => write!(f, "cache operation timed out"),
            CacheError::Unavailable(msg) => write!(f, "cache unavailable: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {}

/// Sorted-set index over `(contest, user) -> total_points`.
///
/// Members order by descending score; ties order by ascending user id so
/// that reads are deterministic. Increments are idempotent when driven from
/// a ledger-backed delta.
#[async_trait]
pub trait HotIndex: Send + Sync + fmt::Debug {
    /// Add `delta` to a member's score, inserting it at `delta` if absent.
    /// Returns the new score.
    async fn increment(
        &self,
        contest: ContestId,
        user: &UserId,
        delta: Points,
    ) -> Result<Points, CacheError>;

    /// Set a member's score outright (rebuild path).
    async fn set_score(
        &self,
        contest: ContestId,
        user: &UserId,
        total: Points,
    ) -> Result<(), CacheError>;

    /// Top `n` members in descending score order.
    async fn top_n(&self, contest: ContestId, n: usize)
        -> Result<Vec<(UserId, Points)>, CacheError>;

    /// 1-based descending rank of a member plus its score, or None if the
    /// member is absent.
    async fn rank_of(
        &self,
        contest: ContestId,
        user: &UserId,
    ) -> Result<Option<(i64, Points)>, CacheError>;

    /// Drop every member of a contest's set.
    async fn clear_contest(&self, contest: ContestId) -> Result<(), CacheError>;

    /// Number of members in a contest's set.
    async fn member_count(&self, contest: ContestId) -> Result<usize, CacheError>;
}
