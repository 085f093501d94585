//! In-process sorted-set index.
//!
//! Keeps a by-user map plus an ordered set keyed `(score, Reverse(user))`,
//! so reverse iteration yields descending score with ascending user id on
//! ties.

use super::{CacheError, HotIndex};
use crate::domain::{ContestId, Points, UserId};
use async_trait::async_trait;
use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct ContestSet {
    by_user: HashMap<UserId, Points>,
    ordered: BTreeSet<(Points, Reverse<UserId>)>,
}

impl ContestSet {
    fn put(&mut self, user: UserId, score: Points) {
        if let Some(old) = self.by_user.insert(user.clone(), score) {
            self.ordered.remove(&(old, Reverse(user.clone())));
        }
        self.ordered.insert((score, Reverse(user)));
    }
}

/// In-memory `HotIndex` implementation.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    contests: RwLock<HashMap<ContestId, ContestSet>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HotIndex for MemoryIndex {
    async fn increment(
        &self,
        contest: ContestId,
        user: &UserId,
        delta: Points,
    ) -> Result<Points, CacheError> {
        let mut contests = self.contests.write().await;
        let set = contests.entry(contest).or_default();
        let new_score = set
            .by_user
            .get(user)
            .copied()
            .unwrap_or_else(Points::zero)
            + delta;
        set.put(user.clone(), new_score);
        Ok(new_score)
    }

    async fn set_score(
        &self,
        contest: ContestId,
        user: &UserId,
        total: Points,
    ) -> Result<(), CacheError> {
        let mut contests = self.contests.write().await;
        contests.entry(contest).or_default().put(user.clone(), total);
        Ok(())
    }

    async fn top_n(
        &self,
        contest: ContestId,
        n: usize,
    ) -> Result<Vec<(UserId, Points)>, CacheError> {
        let contests = self.contests.read().await;
        Ok(contests
            .get(&contest)
            .map(|set| {
                set.ordered
                    .iter()
                    .rev()
                    .take(n)
                    .map(|(score, Reverse(user))| (user.clone(), *score))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn rank_of(
        &self,
        contest: ContestId,
        user: &UserId,
    ) -> Result<Option<(i64, Points)>, CacheError> {
        let contests = self.contests.read().await;
        let Some(set) = contests.get(&contest) else {
            return Ok(None);
        };
        let Some(score) = set.by_user.get(user).copied() else {
            return Ok(None);
        };
        let position = set
            .ordered
            .iter()
            .rev()
            .position(|(_, Reverse(member))| member == user)
            .map(|idx| idx as i64 + 1);
        Ok(position.map(|rank| (rank, score)))
    }

    async fn clear_contest(&self, contest: ContestId) -> Result<(), CacheError> {
        self.contests.write().await.remove(&contest);
        Ok(())
    }

    async fn member_count(&self, contest: ContestId) -> Result<usize, CacheError> {
        let contests = self.contests.read().await;
        Ok(contests.get(&contest).map(|s| s.by_user.len()).unwrap_or(0))
    }
}
