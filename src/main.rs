use matchday::cache::MemoryIndex;
use matchday::config::RankRecomputeMode;
use matchday::events::LogEventSink;
use matchday::projection::LeaderboardProjection;
use matchday::{
    api, config::Config, db::init_db, GradingCoordinator, Repository, ResultIngress, TaskQueue,
    WorkerPool,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    let port = config.port;

    // Initialize database and dependencies
    let pool = match init_db(&config.database_path).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to initialize database: {}", e);
            std::process::exit(1);
        }
    };

    let repo = Arc::new(Repository::new(pool));
    let hot_index = Arc::new(MemoryIndex::new());
    let projection = Arc::new(LeaderboardProjection::new(
        repo.clone(),
        hot_index,
        config.rank_recompute_mode,
        Duration::from_millis(config.cache_op_timeout_ms),
    ));
    let coordinator = Arc::new(GradingCoordinator::new(
        repo.clone(),
        projection.clone(),
        Arc::new(LogEventSink::new()),
        config.streak_mode,
    ));
    let queue = Arc::new(TaskQueue::new(config.queue_buffer));
    let ingress = Arc::new(ResultIngress::new(repo.clone(), queue.clone()));

    // Cold start: the hot index is empty; rebuild it per contest from the
    // durable table, then republish grading work that never completed.
    if let Err(e) = warm_start(&repo, &projection, &ingress, config.rank_recompute_mode).await {
        eprintln!("Failed to restore projection state: {}", e);
        std::process::exit(1);
    }

    let worker_pool = WorkerPool::spawn(
        config.worker_pool_size,
        queue.clone(),
        coordinator.clone(),
        ingress.clone(),
    );

    // Create router
    let app = api::create_router(api::AppState::new(
        repo,
        config,
        projection,
        coordinator,
        ingress,
    ));

    // Bind to address
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("Failed to bind to {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("Server listening on {}", addr);

    // Run server until ctrl-c, then drain the worker pool before dropping
    // storage resources.
    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = server.await {
        eprintln!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Shutting down, draining grading workers");
    worker_pool.shutdown().await;
}

async fn warm_start(
    repo: &Arc<Repository>,
    projection: &Arc<LeaderboardProjection>,
    ingress: &Arc<ResultIngress>,
    rank_mode: RankRecomputeMode,
) -> anyhow::Result<()> {
    for contest in repo.list_contests().await? {
        projection.rebuild_hot(contest.contest_id).await?;
        if rank_mode == RankRecomputeMode::Eager {
            projection
                .recompute_ranks(contest.contest_id, chrono::Utc::now())
                .await?;
        }
    }
    let republished = ingress.resume_incomplete().await?;
    if republished > 0 {
        tracing::info!(republished, "resumed incomplete grading");
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        eprintln!("Failed to listen for shutdown signal: {}", e);
    }
}
