use super::config::RatingConfig;
use super::types::{ItemAggregate, ItemId, RatingValue};
use crate::errors::{RatingError, RatingResult};

/// Rounds to two decimal places, halves away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Bayesian adjusted rating of an item.
///
/// `(v / (v + m)) * R + (m / (v + m)) * C`, rounded to two decimals. With no
/// reviews the baseline `C` is returned unrounded and `raw_average` is not
/// inspected. Large `v` converges on `R`, small `v` on `C`.
///
/// The result lies within `[min(R, C), max(R, C)]` widened by 0.005 on each
/// side, the most the final rounding can add. With `R` and `C` on the cent
/// grid the bound holds exactly.
pub fn compute_smoothed_rating(
    review_count: u64,
    raw_average: RatingValue,
    config: &RatingConfig,
) -> RatingResult<RatingValue> {
    config.validate()?;

    let c = config.global_average();
    if review_count == 0 {
        return Ok(c);
    }

    if !raw_average.is_finite() {
        return Err(RatingError::invalid(format!(
            "raw average must be finite, got {}",
            raw_average
        )));
    }

    let v = review_count as f64;
    let m = config.minimum_ratings_threshold();
    let total = v + m;
    let smoothed = (v / total) * raw_average + (m / total) * c;

    Ok(round2(smoothed))
}

/// Entry point for callers holding a signed count, e.g. straight from SQL.
pub fn compute_smoothed_rating_signed(
    review_count: i64,
    raw_average: RatingValue,
    config: &RatingConfig,
) -> RatingResult<RatingValue> {
    let count = u64::try_from(review_count).map_err(|_| {
        RatingError::invalid(format!(
            "review count must not be negative, got {}",
            review_count
        ))
    })?;
    compute_smoothed_rating(count, raw_average, config)
}

/// The stored aggregate of an item with the given ratings.
pub fn aggregate_from_ratings(
    item_id: ItemId,
    ratings: &[RatingValue],
    config: &RatingConfig,
) -> RatingResult<ItemAggregate> {
    let (review_count, raw_average) = summarize(ratings);
    let smoothed_rating = compute_smoothed_rating(review_count, raw_average, config)?;
    Ok(ItemAggregate {
        item_id,
        raw_average: round2(raw_average),
        review_count,
        smoothed_rating,
    })
}

/// Review count and unrounded mean of a set of ratings.
pub fn summarize(ratings: &[RatingValue]) -> (u64, RatingValue) {
    if ratings.is_empty() {
        return (0, 0.0);
    }
    let sum: f64 = ratings.iter().sum();
    (ratings.len() as u64, sum / ratings.len() as f64)
}
