use std::env;
use std::fmt::Display;
use std::str::FromStr;

use log::{info, warn};

use crate::errors::RatingResult;
use crate::rating::config::{RatingConfig, SEED_GLOBAL_AVERAGE, SEED_MINIMUM_RATINGS_THRESHOLD};

pub const DATABASE_PATH_VAR: &str = "DATABASE_PATH";
pub const SEED_AVERAGE_VAR: &str = "RATING_SEED_AVERAGE";
pub const MINIMUM_THRESHOLD_VAR: &str = "RATING_MINIMUM_THRESHOLD";
pub const MAX_CONCURRENCY_VAR: &str = "RATING_MAX_CONCURRENCY";

#[derive(Debug, Clone)]
pub struct RatingSettings {
    pub seed_global_average: f64,
    pub minimum_ratings_threshold: f64,
    pub max_concurrent_updates: usize,
    pub refresh_retries: u32,
    pub retry_backoff_ms: u64,
    pub progress_log_every: usize,
}

impl Default for RatingSettings {
    fn default() -> Self {
        Self {
            seed_global_average: SEED_GLOBAL_AVERAGE,
            minimum_ratings_threshold: SEED_MINIMUM_RATINGS_THRESHOLD,
            max_concurrent_updates: 8,
            refresh_retries: 2,
            retry_backoff_ms: 50,
            progress_log_every: 100,
        }
    }
}

impl RatingSettings {
    /// Config used until a global average has been computed and stored.
    pub fn seed_config(&self) -> RatingResult<RatingConfig> {
        RatingConfig::new(self.seed_global_average, self.minimum_ratings_threshold)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "rpg_vault.db".to_string(),
            pool_size: 8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub rating: RatingSettings,
    pub database: DatabaseSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AppConfig {
    pub fn new() -> Self {
        Self {
            rating: RatingSettings::default(),
            database: DatabaseSettings::default(),
        }
    }

    /// Defaults overridden by whatever is set in the environment.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        if let Some(path) = var(DATABASE_PATH_VAR) {
            config.database.path = path;
        }
        override_from_env(SEED_AVERAGE_VAR, &mut config.rating.seed_global_average);
        override_from_env(MINIMUM_THRESHOLD_VAR, &mut config.rating.minimum_ratings_threshold);
        override_from_env(MAX_CONCURRENCY_VAR, &mut config.rating.max_concurrent_updates);
        config.rating.max_concurrent_updates = config.rating.max_concurrent_updates.max(1);
        config
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn override_from_env<T>(key: &str, target: &mut T)
where
    T: FromStr + Display,
    T::Err: Display,
{
    if let Some(raw) = var(key) {
        apply_override(key, &raw, target);
    }
}

fn apply_override<T>(key: &str, raw: &str, target: &mut T)
where
    T: FromStr + Display,
    T::Err: Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) => {
            info!("{key} set, using {value}");
            *target = value;
        }
        Err(e) => warn!("Invalid {key} value {raw:?}: {e}, keeping {target}"),
    }
}
