//! Analytics view: read-only aggregation over the ledger.
//!
//! Nothing here is persisted; every number is derived from scored rows
//! joined with match metadata at query time. Queries take no locks and may
//! trail in-flight grading by a bounded amount.

use crate::db::repo::ScoredRow;
use crate::db::Repository;
use crate::domain::{Points, UserId};
use chrono::{DateTime, Duration, Utc};
use futures::future::try_join;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rolling aggregation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Days7,
    Days30,
    Days90,
    All,
}

impl TimeRange {
    pub const ALL_WINDOWS: [TimeRange; 4] = [
        TimeRange::Days7,
        TimeRange::Days30,
        TimeRange::Days90,
        TimeRange::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Days7 => "7d",
            TimeRange::Days30 => "30d",
            TimeRange::Days90 => "90d",
            TimeRange::All => "all",
        }
    }

    /// Lower bound of the window, or None for the full history.
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeRange::Days7 => Some(now - Duration::days(7)),
            TimeRange::Days30 => Some(now - Duration::days(30)),
            TimeRange::Days90 => Some(now - Duration::days(90)),
            TimeRange::All => None,
        }
    }
}

impl std::str::FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "7d" => Ok(TimeRange::Days7),
            "30d" => Ok(TimeRange::Days30),
            "90d" => Ok(TimeRange::Days90),
            "all" => Ok(TimeRange::All),
            other => Err(format!("unknown time range: {}", other)),
        }
    }
}

/// Counters shared by every grouping level.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccuracyStats {
    pub total_predictions: usize,
    pub correct_predictions: usize,
    pub accuracy_pct: Points,
    pub total_points: Points,
}

impl AccuracyStats {
    fn from_rows<'a>(rows: impl Iterator<Item = &'a ScoredRow>) -> Self {
        let mut total = 0usize;
        let mut correct = 0usize;
        let mut points = Points::zero();
        for row in rows {
            total += 1;
            if row.final_points.is_positive() {
                correct += 1;
            }
            points = points + row.final_points;
        }
        let accuracy_pct = if total == 0 {
            Points::zero()
        } else {
            (Points::from_i64(correct as i64) * Points::from_i64(100)
                / Points::from_i64(total as i64))
            .round2()
        };
        AccuracyStats {
            total_predictions: total,
            correct_predictions: correct,
            accuracy_pct,
            total_points: points,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStats {
    pub key: String,
    #[serde(flatten)]
    pub stats: AccuracyStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub window: &'static str,
    #[serde(flatten)]
    pub stats: AccuracyStats,
}

/// The user's window against the cross-user average over the same window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlatformComparison {
    pub user_accuracy_pct: Points,
    pub platform_accuracy_pct: Points,
    pub user_total_points: Points,
    pub platform_avg_points: Points,
    pub users_compared: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserAnalytics {
    pub overall: AccuracyStats,
    pub by_sport: Vec<GroupStats>,
    pub by_league: Vec<GroupStats>,
    pub by_type: Vec<GroupStats>,
    pub trend: Vec<TrendPoint>,
    pub platform_comparison: PlatformComparison,
}

pub struct AnalyticsView {
    repo: Arc<Repository>,
}

impl AnalyticsView {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    pub async fn user_analytics(
        &self,
        user: &UserId,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> Result<UserAnalytics, sqlx::Error> {
        // One full-history fetch serves the windowed aggregations too; the
        // platform sweep runs concurrently.
        let since = range.since(now);
        let (all_rows, platform_rows) = try_join(
            self.repo.scored_rows_for_user(user, None),
            self.repo.scored_rows_for_platform(since),
        )
        .await?;
        let rows: Vec<&ScoredRow> = all_rows
            .iter()
            .filter(|row| since.map(|s| row.scored_at >= s).unwrap_or(true))
            .collect();

        let overall = AccuracyStats::from_rows(rows.iter().copied());
        let by_sport = group_by(&rows, |row| row.sport.clone());
        let by_league = group_by(&rows, |row| row.league.clone());
        let by_type = group_by(&rows, |row| row.prediction_kind.to_string());

        let trend = TimeRange::ALL_WINDOWS
            .iter()
            .map(|window| {
                let lower = window.since(now);
                let stats = AccuracyStats::from_rows(
                    all_rows
                        .iter()
                        .filter(|row| lower.map(|s| row.scored_at >= s).unwrap_or(true)),
                );
                TrendPoint {
                    window: window.as_str(),
                    stats,
                }
            })
            .collect();

        let platform_comparison = platform_comparison(&overall, &platform_rows);

        Ok(UserAnalytics {
            overall,
            by_sport,
            by_league,
            by_type,
            trend,
            platform_comparison,
        })
    }
}

fn platform_comparison(user_stats: &AccuracyStats, platform_rows: &[ScoredRow]) -> PlatformComparison {
    let mut per_user: BTreeMap<&UserId, Vec<&ScoredRow>> = BTreeMap::new();
    for row in platform_rows {
        per_user.entry(&row.user_id).or_default().push(row);
    }

    let users_compared = per_user.len();
    if users_compared == 0 {
        return PlatformComparison {
            user_accuracy_pct: user_stats.accuracy_pct,
            platform_accuracy_pct: Points::zero(),
            user_total_points: user_stats.total_points,
            platform_avg_points: Points::zero(),
            users_compared: 0,
        };
    }

    let mut accuracy_sum = Points::zero();
    let mut points_sum = Points::zero();
    for rows in per_user.values() {
        let stats = AccuracyStats::from_rows(rows.iter().copied());
        accuracy_sum = accuracy_sum + stats.accuracy_pct;
        points_sum = points_sum + stats.total_points;
    }
    let divisor = Points::from_i64(users_compared as i64);

    PlatformComparison {
        user_accuracy_pct: user_stats.accuracy_pct,
        platform_accuracy_pct: (accuracy_sum / divisor).round2(),
        user_total_points: user_stats.total_points,
        platform_avg_points: (points_sum / divisor).round2(),
        users_compared,
    }
}

fn group_by<F: Fn(&ScoredRow) -> String>(rows: &[&ScoredRow], key_fn: F) -> Vec<GroupStats> {
    let mut groups: BTreeMap<String, Vec<&ScoredRow>> = BTreeMap::new();
    for row in rows {
        groups.entry(key_fn(row)).or_default().push(row);
    }
    groups
        .into_iter()
        .map(|(key, rows)| GroupStats {
            key,
            stats: AccuracyStats::from_rows(rows.into_iter()),
        })
        .collect()
}

impl std::fmt::Debug for AnalyticsView {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyticsView").finish()
    }
}
