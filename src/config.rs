use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::engine::StreakMode;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub worker_pool_size: usize,
    pub queue_buffer: usize,
    pub cache_op_timeout_ms: u64,
    pub rank_recompute_mode: RankRecomputeMode,
    pub streak_mode: StreakMode,
}

/// When leaderboard ranks are rewritten: on read, or after every applied
/// grading delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankRecomputeMode {
    Lazy,
    Eager,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = env_map
            .get("PORT")
            .map(|s| s.as_str())
            .unwrap_or("8080")
            .parse::<u16>()
            .map_err(|_| {
                ConfigError::InvalidValue("PORT".to_string(), "must be a valid u16".to_string())
            })?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let worker_pool_size = env_map
            .get("WORKER_POOL_SIZE")
            .map(|s| s.as_str())
            .unwrap_or("5")
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "WORKER_POOL_SIZE".to_string(),
                    "must be a positive integer".to_string(),
                )
            })?;

        // The queue must absorb a full burst from every worker: at least 100
        // slots and at least 20x the pool size.
        let queue_floor = 100.max(worker_pool_size * 20);
        let queue_buffer = match env_map.get("QUEUE_BUFFER") {
            None => queue_floor,
            Some(s) => {
                let parsed = s.parse::<usize>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "QUEUE_BUFFER".to_string(),
                        "must be a positive integer".to_string(),
                    )
                })?;
                if parsed < queue_floor {
                    return Err(ConfigError::InvalidValue(
                        "QUEUE_BUFFER".to_string(),
                        format!("must be at least {} for pool size {}", queue_floor, worker_pool_size),
                    ));
                }
                parsed
            }
        };

        let cache_op_timeout_ms = env_map
            .get("CACHE_OP_TIMEOUT_MS")
            .map(|s| s.as_str())
            .unwrap_or("5000")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CACHE_OP_TIMEOUT_MS".to_string(),
                    "must be a valid u64".to_string(),
                )
            })?;

        let rank_recompute_mode = match env_map
            .get("RANK_RECOMPUTE_MODE")
            .map(|s| s.as_str())
            .unwrap_or("lazy")
        {
            "lazy" => RankRecomputeMode::Lazy,
            "eager" => RankRecomputeMode::Eager,
            other => {
                return Err(ConfigError::InvalidValue(
                    "RANK_RECOMPUTE_MODE".to_string(),
                    format!("must be lazy or eager, got {}", other),
                ))
            }
        };

        let streak_mode = StreakMode::from_str(
            env_map
                .get("STREAK_MODE")
                .map(|s| s.as_str())
                .unwrap_or("default"),
        )
        .map_err(|e| ConfigError::InvalidValue("STREAK_MODE".to_string(), e))?;

        Ok(Config {
            port,
            database_path,
            worker_pool_size,
            queue_buffer,
            cache_op_timeout_ms,
            rank_recompute_mode,
            streak_mode,
        })
    }
}
