//! Reconciliation: both leaderboard projections must be rebuildable from
//! the layer below them, and rebuilds must be idempotent.

use chrono::{DateTime, Duration, TimeZone, Utc};
use matchday::cache::{HotIndex, MemoryIndex};
use matchday::config::RankRecomputeMode;
use matchday::db::init_db;
use matchday::db::repo::ScoreRow;
use matchday::domain::{ContestId, Points, PredictionId, UserId};
use matchday::projection::LeaderboardProjection;
use matchday::Repository;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn user(id: &str) -> UserId {
    UserId::new(id.to_string())
}

async fn setup() -> (Arc<Repository>, Arc<MemoryIndex>, LeaderboardProjection, TempDir) {
    let temp = TempDir::new().unwrap();
    let db_path = temp.path().join("test.db").to_string_lossy().to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let hot = Arc::new(MemoryIndex::new());
    let projection = LeaderboardProjection::new(
        repo.clone(),
        hot.clone(),
        RankRecomputeMode::Lazy,
        StdDuration::from_secs(5),
    );
    (repo, hot, projection, temp)
}

async fn ledger_row(repo: &Repository, contest: ContestId, uid: &str, points: i64, minute: i64) {
    repo.insert_score(&ScoreRow {
        user_id: user(uid),
        contest_id: contest,
        prediction_id: PredictionId::generate(),
        base_points: Points::from_i64(points),
        time_coefficient: Points::one(),
        streak_multiplier: Points::one(),
        final_points: Points::from_i64(points),
        scored_at: t0() + Duration::minutes(minute),
        corrected: false,
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_cold_start_rebuilds_hot_from_durable() {
    let (repo, _hot, projection, _temp) = setup().await;
    let contest = ContestId::generate();

    projection
        .apply_delta(contest, &user("u1"), Points::from_i64(12), t0())
        .await
        .unwrap();
    projection
        .apply_delta(contest, &user("u2"), Points::from_i64(7), t0())
        .await
        .unwrap();

    // Simulate a restart: a fresh, empty hot index over the same database.
    let fresh_hot = Arc::new(MemoryIndex::new());
    let restarted = LeaderboardProjection::new(
        repo.clone(),
        fresh_hot.clone(),
        RankRecomputeMode::Lazy,
        StdDuration::from_secs(5),
    );
    restarted.rebuild_hot(contest).await.unwrap();

    let members = fresh_hot.top_n(contest, 10).await.unwrap();
    assert_eq!(
        members,
        vec![
            (user("u1"), Points::from_i64(12)),
            (user("u2"), Points::from_i64(7)),
        ]
    );
}

#[tokio::test]
async fn test_stale_durable_rebuilt_from_ledger() {
    let (repo, hot, projection, _temp) = setup().await;
    let contest = ContestId::generate();

    // Ledger rows exist...
    ledger_row(&repo, contest, "u1", 5, 0).await;
    ledger_row(&repo, contest, "u1", 3, 1).await;
    ledger_row(&repo, contest, "u2", 4, 2).await;
    // ...but the durable table only absorbed part of them.
    repo.add_to_leaderboard_total(contest, &user("u1"), Points::from_i64(5), t0())
        .await
        .unwrap();

    assert!(!projection.check_consistency(contest).await.unwrap());

    projection.rebuild_from_ledger(contest, t0()).await.unwrap();

    assert!(projection.check_consistency(contest).await.unwrap());
    let entries = repo.leaderboard_entries(contest).await.unwrap();
    let u1 = entries.iter().find(|e| e.user_id == user("u1")).unwrap();
    assert_eq!(u1.total_points, Points::from_i64(8));
    assert_eq!(u1.rank, Some(1));

    let members = hot.top_n(contest, 10).await.unwrap();
    assert_eq!(members[0], (user("u1"), Points::from_i64(8)));
    assert_eq!(members[1], (user("u2"), Points::from_i64(4)));
}

#[tokio::test]
async fn test_rebuild_is_idempotent() {
    let (repo, hot, projection, _temp) = setup().await;
    let contest = ContestId::generate();

    ledger_row(&repo, contest, "u1", 9, 0).await;

    projection.rebuild_from_ledger(contest, t0()).await.unwrap();
    let first = repo.leaderboard_entries(contest).await.unwrap();

    projection.rebuild_from_ledger(contest, t0()).await.unwrap();
    let second = repo.leaderboard_entries(contest).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(hot.member_count(contest).await.unwrap(), 1);
}

#[tokio::test]
async fn test_ledger_sum_equals_projection_total_invariant() {
    let (repo, _hot, projection, _temp) = setup().await;
    let contest = ContestId::generate();

    // Apply deltas through the projection as grading would.
    let values = [(5i64, "u1"), (3, "u1"), (4, "u2"), (7, "u3")];
    for (idx, (points, uid)) in values.iter().enumerate() {
        ledger_row(&repo, contest, uid, *points, idx as i64).await;
        projection
            .apply_delta(contest, &user(uid), Points::from_i64(*points), t0())
            .await
            .unwrap();
    }

    let ledger = repo.ledger_totals(contest).await.unwrap();
    for (uid, total) in ledger {
        let entry = repo
            .get_leaderboard_entry(contest, &uid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.total_points, total, "invariant broken for {}", uid);
    }
    assert!(projection.check_consistency(contest).await.unwrap());
}
