//! Leaderboard projection: durable table + hot sorted-set index.
//!
//! Both stores are projections of the ledger. The hot index serves
//! interactive reads while clean; the durable table answers after cold start,
//! for audit, and whenever the index is dirty. There is no two-phase commit
//! across them: deltas are idempotent and reconciliation rebuilds either side
//! from the layer below it (hot from durable, durable from ledger).

use crate::cache::{CacheError, HotIndex};
use crate::config::RankRecomputeMode;
use crate::db::repo::LeaderboardRow;
use crate::db::Repository;
use crate::domain::{ContestId, Points, UserId};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Registry of per-contest read-write locks guarding rank recomputation.
/// Queries take the read side; rank rewrites and reconciliation the write
/// side.
#[derive(Debug, Default)]
struct ContestLocks {
    inner: Mutex<HashMap<ContestId, Arc<RwLock<()>>>>,
}

impl ContestLocks {
    fn for_contest(&self, contest: ContestId) -> Arc<RwLock<()>> {
        let mut map = self.inner.lock().expect("contest lock registry poisoned");
        map.entry(contest).or_default().clone()
    }
}

/// One fully ordered leaderboard position.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedEntry {
    pub rank: i64,
    pub user_id: UserId,
    pub total_points: Points,
    pub current_streak: i64,
    pub max_streak: i64,
    pub first_scored_at: Option<DateTime<Utc>>,
}

/// Result of folding one grading delta into the projection.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedDelta {
    pub new_total: Points,
    pub new_rank: Option<i64>,
}

/// Ordering contract: descending total, then higher max streak, then
/// earlier first score in the contest, then lower user id.
pub fn rank_cmp(a: &RankedEntry, b: &RankedEntry) -> Ordering {
    b.total_points
        .cmp(&a.total_points)
        .then_with(|| b.max_streak.cmp(&a.max_streak))
        .then_with(|| {
            let a_first = a.first_scored_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
            let b_first = b.first_scored_at.unwrap_or(DateTime::<Utc>::MAX_UTC);
            a_first.cmp(&b_first)
        })
        .then_with(|| a.user_id.cmp(&b.user_id))
}

pub struct LeaderboardProjection {
    repo: Arc<Repository>,
    hot: Arc<dyn HotIndex>,
    locks: ContestLocks,
    rank_mode: RankRecomputeMode,
    cache_op_timeout: Duration,
    dirty: Mutex<HashSet<ContestId>>,
}

impl LeaderboardProjection {
    pub fn new(
        repo: Arc<Repository>,
        hot: Arc<dyn HotIndex>,
        rank_mode: RankRecomputeMode,
        cache_op_timeout: Duration,
    ) -> Self {
        Self {
            repo,
            hot,
            locks: ContestLocks::default(),
            rank_mode,
            cache_op_timeout,
            dirty: Mutex::new(HashSet::new()),
        }
    }

    fn mark_dirty(&self, contest: ContestId) {
        self.dirty
            .lock()
            .expect("dirty set poisoned")
            .insert(contest);
    }

    fn clear_dirty(&self, contest: ContestId) {
        self.dirty
            .lock()
            .expect("dirty set poisoned")
            .remove(&contest);
    }

    pub fn is_dirty(&self, contest: ContestId) -> bool {
        self.dirty
            .lock()
            .expect("dirty set poisoned")
            .contains(&contest)
    }

    /// Run one hot-index operation under the per-op timeout budget.
    async fn hot_op<T, F>(&self, op: F) -> Result<T, CacheError>
    where
        F: Future<Output = Result<T, CacheError>>,
    {
        match tokio::time::timeout(self.cache_op_timeout, op).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout),
        }
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Fold one grading delta into both stores.
    ///
    /// The durable write is the commit point; a hot-index failure only dirties
    /// the index. Callers hold the per-(user, contest) grading lock; the
    /// per-contest write lock is taken here.
    pub async fn apply_delta(
        &self,
        contest: ContestId,
        user: &UserId,
        delta: Points,
        now: DateTime<Utc>,
    ) -> Result<AppliedDelta, sqlx::Error> {
        let lock = self.locks.for_contest(contest);
        let _guard = lock.write().await;

        let new_total = self
            .repo
            .add_to_leaderboard_total(contest, user, delta, now)
            .await?;

        match self.hot_op(self.hot.increment(contest, user, delta)).await {
            Ok(hot_total) if hot_total != new_total => {
                // The member drifted (e.g. a crash between stores earlier);
                // pin it to the durable value.
                if let Err(e) = self.hot_op(self.hot.set_score(contest, user, new_total)).await {
                    warn!(contest = %contest, user = %user, error = %e, "hot index resync failed");
                    self.mark_dirty(contest);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(contest = %contest, user = %user, error = %e, "hot index increment failed");
                self.mark_dirty(contest);
            }
        }

        if self.rank_mode == RankRecomputeMode::Eager {
            self.recompute_ranks_locked(contest, now).await?;
        }

        let new_rank = self.current_rank(contest, user).await?;
        Ok(AppliedDelta { new_total, new_rank })
    }

    async fn current_rank(
        &self,
        contest: ContestId,
        user: &UserId,
    ) -> Result<Option<i64>, sqlx::Error> {
        if !self.is_dirty(contest) {
            if let Ok(Some((rank, _))) = self.hot_op(self.hot.rank_of(contest, user)).await {
                return Ok(Some(rank));
            }
        }
        Ok(self
            .repo
            .get_leaderboard_entry(contest, user)
            .await?
            .and_then(|row| row.rank))
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Top-N leaderboard, enriched with streak fields and ordered under the
    /// full tie-break contract.
    pub async fn top_n(
        &self,
        contest: ContestId,
        n: usize,
    ) -> Result<Vec<RankedEntry>, sqlx::Error> {
        let lock = self.locks.for_contest(contest);
        let _guard = lock.read().await;

        let members = self.read_members(contest, n).await?;
        self.enrich_and_order(contest, members).await
    }

    /// One user's rank and totals, or None when unranked.
    pub async fn user_rank(
        &self,
        contest: ContestId,
        user: &UserId,
    ) -> Result<Option<RankedEntry>, sqlx::Error> {
        let lock = self.locks.for_contest(contest);
        let _guard = lock.read().await;

        let (rank, total) = if !self.is_dirty(contest) {
            match self.hot_op(self.hot.rank_of(contest, user)).await {
                Ok(Some(found)) => found,
                Ok(None) => return Ok(None),
                Err(e) => {
                    warn!(contest = %contest, error = %e, "hot index rank read failed");
                    self.mark_dirty(contest);
                    match self.durable_rank(contest, user).await? {
                        Some(found) => found,
                        None => return Ok(None),
                    }
                }
            }
        } else {
            match self.durable_rank(contest, user).await? {
                Some(found) => found,
                None => return Ok(None),
            }
        };

        let streak = self.repo.get_streak(user, contest).await?;
        Ok(Some(RankedEntry {
            rank,
            user_id: user.clone(),
            total_points: total,
            current_streak: streak.current_streak,
            max_streak: streak.max_streak,
            first_scored_at: None,
        }))
    }

    async fn durable_rank(
        &self,
        contest: ContestId,
        user: &UserId,
    ) -> Result<Option<(i64, Points)>, sqlx::Error> {
        let Some(entry) = self.repo.get_leaderboard_entry(contest, user).await? else {
            return Ok(None);
        };
        if let Some(rank) = entry.rank {
            return Ok(Some((rank, entry.total_points)));
        }
        // No persisted rank yet (lazy mode before any recompute): derive it
        // from the ordered durable rows.
        let ordered = self.ordered_durable(contest).await?;
        let rank = ordered
            .iter()
            .position(|row| &row.user_id == user)
            .map(|idx| idx as i64 + 1);
        Ok(rank.map(|r| (r, entry.total_points)))
    }

    async fn read_members(
        &self,
        contest: ContestId,
        n: usize,
    ) -> Result<Vec<(UserId, Points)>, sqlx::Error> {
        if !self.is_dirty(contest) {
            match self.hot_op(self.hot.top_n(contest, n)).await {
                Ok(members) => return Ok(members),
                Err(e) => {
                    warn!(contest = %contest, error = %e, "hot index top-n failed, serving durable");
                    self.mark_dirty(contest);
                }
            }
        }
        Ok(self
            .ordered_durable(contest)
            .await?
            .into_iter()
            .take(n)
            .map(|row| (row.user_id, row.total_points))
            .collect())
    }

    async fn ordered_durable(&self, contest: ContestId) -> Result<Vec<LeaderboardRow>, sqlx::Error> {
        let mut entries = self.repo.leaderboard_entries(contest).await?;
        entries.sort_by(|a, b| {
            b.total_points
                .cmp(&a.total_points)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(entries)
    }

    async fn enrich_and_order(
        &self,
        contest: ContestId,
        members: Vec<(UserId, Points)>,
    ) -> Result<Vec<RankedEntry>, sqlx::Error> {
        let streaks = self.repo.streaks_for_contest(contest).await?;
        let first_scored = self.repo.first_scored_at(contest).await?;

        let mut entries: Vec<RankedEntry> = members
            .into_iter()
            .map(|(user_id, total_points)| {
                let streak = streaks.get(&user_id);
                RankedEntry {
                    rank: 0,
                    total_points,
                    current_streak: streak.map(|s| s.current_streak).unwrap_or(0),
                    max_streak: streak.map(|s| s.max_streak).unwrap_or(0),
                    first_scored_at: first_scored.get(&user_id).copied(),
                    user_id,
                }
            })
            .collect();

        entries.sort_by(rank_cmp);
        for (idx, entry) in entries.iter_mut().enumerate() {
            entry.rank = idx as i64 + 1;
        }
        Ok(entries)
    }

    // =========================================================================
    // Rank recomputation
    // =========================================================================

    /// Rewrite persisted ranks for a contest in a single ordered pass.
    pub async fn recompute_ranks(
        &self,
        contest: ContestId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedEntry>, sqlx::Error> {
        let lock = self.locks.for_contest(contest);
        let _guard = lock.write().await;
        self.recompute_ranks_locked(contest, now).await
    }

    async fn recompute_ranks_locked(
        &self,
        contest: ContestId,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedEntry>, sqlx::Error> {
        let members: Vec<(UserId, Points)> = self
            .repo
            .leaderboard_entries(contest)
            .await?
            .into_iter()
            .map(|row| (row.user_id, row.total_points))
            .collect();

        let ranked = self.enrich_and_order(contest, members).await?;
        let ranks: Vec<(UserId, i64)> = ranked
            .iter()
            .map(|entry| (entry.user_id.clone(), entry.rank))
            .collect();
        self.repo.write_ranks(contest, &ranks, now).await?;
        Ok(ranked)
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Rebuild the hot index from the durable table. Idempotent.
    pub async fn rebuild_hot(&self, contest: ContestId) -> Result<(), sqlx::Error> {
        let lock = self.locks.for_contest(contest);
        let _guard = lock.write().await;
        self.rebuild_hot_locked(contest).await
    }

    async fn rebuild_hot_locked(&self, contest: ContestId) -> Result<(), sqlx::Error> {
        let entries = self.repo.leaderboard_entries(contest).await?;

        if let Err(e) = self.hot_op(self.hot.clear_contest(contest)).await {
            warn!(contest = %contest, error = %e, "hot index clear failed, rebuild aborted");
            self.mark_dirty(contest);
            return Ok(());
        }
        for row in &entries {
            if let Err(e) = self
                .hot_op(self.hot.set_score(contest, &row.user_id, row.total_points))
                .await
            {
                warn!(contest = %contest, error = %e, "hot index rebuild write failed");
                self.mark_dirty(contest);
                return Ok(());
            }
        }

        self.clear_dirty(contest);
        info!(contest = %contest, members = entries.len(), "hot index rebuilt from durable table");
        Ok(())
    }

    /// Rebuild the durable table from the ledger, then the hot index from the
    /// durable table. The recovery path when the durable rows themselves are
    /// suspected stale.
    pub async fn rebuild_from_ledger(
        &self,
        contest: ContestId,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        let lock = self.locks.for_contest(contest);
        let _guard = lock.write().await;

        let totals: Vec<(UserId, Points)> =
            self.repo.ledger_totals(contest).await?.into_iter().collect();
        self.repo
            .replace_leaderboard_totals(contest, &totals, now)
            .await?;
        self.rebuild_hot_locked(contest).await?;
        self.recompute_ranks_locked(contest, now).await?;
        info!(contest = %contest, users = totals.len(), "projection rebuilt from ledger");
        Ok(())
    }

    /// Compare durable totals against ledger sums. On mismatch the contest is
    /// flagged dirty and false is returned; reads then serve the durable table
    /// until a rebuild lands.
    pub async fn check_consistency(&self, contest: ContestId) -> Result<bool, sqlx::Error> {
        let ledger = self.repo.ledger_totals(contest).await?;
        let durable: HashMap<UserId, Points> = self
            .repo
            .leaderboard_entries(contest)
            .await?
            .into_iter()
            .map(|row| (row.user_id, row.total_points))
            .collect();

        let consistent = ledger.len() == durable.len()
            && ledger
                .iter()
                .all(|(user, total)| durable.get(user) == Some(total));

        if !consistent {
            warn!(contest = %contest, "projection drift detected, marking dirty");
            self.mark_dirty(contest);
        }
        Ok(consistent)
    }
}

impl std::fmt::Debug for LeaderboardProjection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaderboardProjection")
            .field("rank_mode", &self.rank_mode)
            .field("cache_op_timeout", &self.cache_op_timeout)
            .finish()
    }
}
