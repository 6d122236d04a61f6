pub mod bayesian;
pub mod config;
pub mod global_average;
pub mod types;

pub use bayesian::{
    aggregate_from_ratings, compute_smoothed_rating, compute_smoothed_rating_signed, round2,
};
pub use config::{CachedConfig, RatingConfig, RatingConfigProvider, StoredConfig};
pub use global_average::{GlobalAverageEstimator, estimate_global_average};
pub use types::{
    Genre, ItemAggregate, ItemId, RatedItem, RatingValue, ReviewId, ReviewRating, TopRatedPage,
    UserId,
};
