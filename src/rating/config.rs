use std::sync::{PoisonError, RwLock};

use chrono::NaiveDateTime;
use log::info;
use serde::{Deserialize, Serialize};

use super::types::{MAX_REVIEW_RATING, MIN_REVIEW_RATING, RatingValue};
use crate::errors::{RatingError, RatingResult};

pub const SEED_GLOBAL_AVERAGE: RatingValue = 7.0;
pub const SEED_MINIMUM_RATINGS_THRESHOLD: f64 = 10.0;

/// Parameters of the Bayesian smoothing formula.
///
/// `global_average` is the baseline `C` every item regresses toward and
/// `minimum_ratings_threshold` is `m`, the number of virtual reviews at that
/// baseline blended into every item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingConfig {
    global_average: RatingValue,
    minimum_ratings_threshold: f64,
}

impl RatingConfig {
    pub fn new(global_average: RatingValue, minimum_ratings_threshold: f64) -> RatingResult<Self> {
        let config = Self {
            global_average,
            minimum_ratings_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn seed() -> Self {
        Self {
            global_average: SEED_GLOBAL_AVERAGE,
            minimum_ratings_threshold: SEED_MINIMUM_RATINGS_THRESHOLD,
        }
    }

    pub fn global_average(&self) -> RatingValue {
        self.global_average
    }

    pub fn minimum_ratings_threshold(&self) -> f64 {
        self.minimum_ratings_threshold
    }

    /// Same threshold, new baseline.
    pub fn with_global_average(&self, global_average: RatingValue) -> RatingResult<Self> {
        Self::new(global_average, self.minimum_ratings_threshold)
    }

    /// Deserialized configs bypass `new`, so the calculator re-checks.
    pub fn validate(&self) -> RatingResult<()> {
        let m = self.minimum_ratings_threshold;
        if !m.is_finite() || m <= 0.0 {
            return Err(RatingError::invalid(format!(
                "minimum ratings threshold must be a positive number, got {}",
                m
            )));
        }

        let c = self.global_average;
        if !c.is_finite() || !(MIN_REVIEW_RATING..=MAX_REVIEW_RATING).contains(&c) {
            return Err(RatingError::invalid(format!(
                "global average must be within {}..={}, got {}",
                MIN_REVIEW_RATING, MAX_REVIEW_RATING, c
            )));
        }

        Ok(())
    }
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self::seed()
    }
}

/// A config together with the moment its baseline was last derived.
/// `computed_at` is `None` while the seed value is in use.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CachedConfig {
    pub config: RatingConfig,
    pub computed_at: Option<NaiveDateTime>,
}

/// A config as persisted by the bulk recalculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StoredConfig {
    pub config: RatingConfig,
    pub computed_at: NaiveDateTime,
}

impl From<StoredConfig> for CachedConfig {
    fn from(stored: StoredConfig) -> Self {
        Self {
            config: stored.config,
            computed_at: Some(stored.computed_at),
        }
    }
}

/// Shared, cached `RatingConfig`.
///
/// Item refreshes read whatever is current; only the bulk recalculation
/// publishes a new value.
#[derive(Debug)]
pub struct RatingConfigProvider {
    current: RwLock<CachedConfig>,
}

impl RatingConfigProvider {
    pub fn new(config: RatingConfig, computed_at: Option<NaiveDateTime>) -> Self {
        Self {
            current: RwLock::new(CachedConfig {
                config,
                computed_at,
            }),
        }
    }

    /// Starts from the persisted baseline when there is one, else from `seed`.
    /// The threshold always comes from `seed`, which carries the configured `m`.
    pub fn from_stored(stored: Option<StoredConfig>, seed: RatingConfig) -> Self {
        match stored {
            Some(stored) => {
                let config = RatingConfig {
                    global_average: stored.config.global_average,
                    ..seed
                };
                Self::new(config, Some(stored.computed_at))
            }
            None => Self::new(seed, None),
        }
    }

    pub fn current(&self) -> RatingConfig {
        self.snapshot().config
    }

    pub fn snapshot(&self) -> CachedConfig {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publish(&self, stored: StoredConfig) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            "Global average {} -> {} (threshold {})",
            current.config.global_average(),
            stored.config.global_average(),
            stored.config.minimum_ratings_threshold()
        );
        *current = stored.into();
    }
}

impl Default for RatingConfigProvider {
    fn default() -> Self {
        Self::new(RatingConfig::seed(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_config_rejects_bad_threshold() {
        assert!(RatingConfig::new(7.0, 0.0).is_err());
        assert!(RatingConfig::new(7.0, -3.0).is_err());
        assert!(RatingConfig::new(7.0, f64::NAN).is_err());
        assert!(RatingConfig::new(7.0, 10.0).is_ok());
    }

    #[test]
    fn test_config_rejects_out_of_scale_average() {
        assert!(RatingConfig::new(0.5, 10.0).is_err());
        assert!(RatingConfig::new(10.5, 10.0).is_err());
        assert!(RatingConfig::new(f64::INFINITY, 10.0).is_err());
    }

    #[test]
    fn test_with_global_average_keeps_threshold() {
        let config = RatingConfig::new(7.0, 25.0).unwrap();
        let refreshed = config.with_global_average(6.4).unwrap();
        assert_eq!(refreshed.global_average(), 6.4);
        assert_eq!(refreshed.minimum_ratings_threshold(), 25.0);
    }

    #[test]
    fn test_deserialized_config_is_validated() {
        let config: RatingConfig =
            serde_json::from_str(r#"{"globalAverage": 7.0, "minimumRatingsThreshold": 0.0}"#)
                .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_publish_updates_snapshot() {
        let provider = RatingConfigProvider::default();
        assert_eq!(provider.current(), RatingConfig::seed());
        assert!(provider.snapshot().computed_at.is_none());

        let now = Utc::now().naive_utc();
        let config = RatingConfig::new(6.8, 10.0).unwrap();
        provider.publish(StoredConfig {
            config,
            computed_at: now,
        });

        let snapshot = provider.snapshot();
        assert_eq!(snapshot.config, config);
        assert_eq!(snapshot.computed_at, Some(now));
    }

    #[test]
    fn test_provider_prefers_stored_config() {
        let now = Utc::now().naive_utc();
        let stored = StoredConfig {
            config: RatingConfig::new(6.1, 10.0).unwrap(),
            computed_at: now,
        };

        let seed = RatingConfig::new(7.0, 25.0).unwrap();
        let provider = RatingConfigProvider::from_stored(Some(stored), seed);
        assert_eq!(provider.current().global_average(), 6.1);
        assert_eq!(provider.current().minimum_ratings_threshold(), 25.0);
        assert_eq!(provider.snapshot().computed_at, Some(now));

        let provider = RatingConfigProvider::from_stored(None, RatingConfig::seed());
        assert_eq!(provider.current(), RatingConfig::seed());
        assert!(provider.snapshot().computed_at.is_none());
    }
}
