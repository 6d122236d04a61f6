use futures::{Stream, TryStreamExt};

use super::bayesian::round2;
use super::config::SEED_GLOBAL_AVERAGE;
use super::types::RatingValue;
use crate::errors::{RatingError, RatingResult};

/// Running sum and count over a corpus of ratings.
///
/// Holds two numbers no matter how many ratings pass through, so the corpus
/// can be streamed straight out of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GlobalAverageEstimator {
    sum: f64,
    count: u64,
}

impl GlobalAverageEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rating: RatingValue) -> RatingResult<()> {
        if !rating.is_finite() {
            return Err(RatingError::invalid(format!(
                "corpus contains a non-finite rating: {}",
                rating
            )));
        }
        self.sum += rating;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Mean rounded to two decimals, or the seed baseline for an empty corpus.
    pub fn finish(&self) -> RatingValue {
        if self.count == 0 {
            return SEED_GLOBAL_AVERAGE;
        }
        round2(self.sum / self.count as f64)
    }
}

pub fn estimate_global_average<I>(ratings: I) -> RatingResult<RatingValue>
where
    I: IntoIterator<Item = RatingValue>,
{
    let mut estimator = GlobalAverageEstimator::new();
    for rating in ratings {
        estimator.push(rating)?;
    }
    Ok(estimator.finish())
}

/// Folds a stream of store reads into an estimate.
///
/// Read errors surface as `StoreUnavailable`, malformed values as
/// `InvalidArgument`.
pub async fn estimate_from_stream<S>(ratings: S) -> RatingResult<GlobalAverageEstimator>
where
    S: Stream<Item = anyhow::Result<RatingValue>>,
{
    ratings
        .map_err(|e| RatingError::StoreUnavailable(e.context("Failed to stream all ratings")))
        .try_fold(GlobalAverageEstimator::new(), |mut estimator, rating| async move {
            estimator.push(rating)?;
            Ok::<_, RatingError>(estimator)
        })
        .await
}
