use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use serde::Serialize;

use super::recalculation::{CancelFlag, RecalculationOrchestrator, RecalculationReport};
use super::updater::ItemRatingUpdater;
use crate::config::RatingSettings;
use crate::errors::{RatingError, RatingResult, StoreContext};
use crate::rating::{
    CachedConfig, Genre, ItemAggregate, ItemId, RatedItem, RatingConfig, RatingConfigProvider,
    RatingValue, ReviewId, ReviewRating, TopRatedPage, UserId, compute_smoothed_rating,
};
use crate::store::RatingStore;

pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedReview {
    pub review_id: ReviewId,
    pub aggregate: ItemAggregate,
}

/// Entry point for hosts: review submission, refreshes, rankings and the
/// admin recalculation, all sharing one config cache and one lock table.
pub struct RatingEngine {
    store: Arc<dyn RatingStore>,
    provider: Arc<RatingConfigProvider>,
    updater: Arc<ItemRatingUpdater>,
    orchestrator: RecalculationOrchestrator,
    settings: RatingSettings,
}

impl RatingEngine {
    pub fn new(
        store: Arc<dyn RatingStore>,
        provider: Arc<RatingConfigProvider>,
        settings: RatingSettings,
    ) -> Self {
        let updater = Arc::new(ItemRatingUpdater::new(store.clone(), provider.clone()));
        let orchestrator = RecalculationOrchestrator::new(
            store.clone(),
            provider.clone(),
            updater.clone(),
            settings.clone(),
        );
        Self {
            store,
            provider,
            updater,
            orchestrator,
            settings,
        }
    }

    /// Builds an engine around the persisted baseline, or the seed if none
    /// has been computed yet.
    pub async fn bootstrap(
        store: Arc<dyn RatingStore>,
        settings: RatingSettings,
    ) -> RatingResult<Self> {
        let seed = settings.seed_config()?;
        let stored = store.load_config().await.store_context("load rating config")?;

        match &stored {
            Some(stored) => info!(
                "Using stored global average {} (computed {})",
                stored.config.global_average(),
                stored.computed_at
            ),
            None => info!("No stored global average, seeding with {}", seed.global_average()),
        }

        let provider = Arc::new(RatingConfigProvider::from_stored(stored, seed));
        Ok(Self::new(store, provider, settings))
    }

    pub fn current_config(&self) -> RatingConfig {
        self.provider.current()
    }

    pub fn config_snapshot(&self) -> CachedConfig {
        self.provider.snapshot()
    }

    /// Smoothed rating under the engine's current config.
    pub fn compute_smoothed_rating(
        &self,
        review_count: u64,
        raw_average: RatingValue,
    ) -> RatingResult<RatingValue> {
        compute_smoothed_rating(review_count, raw_average, &self.provider.current())
    }

    /// Registers an item that ranks at the current baseline until reviewed.
    pub async fn add_item(&self, title: &str, genre: Genre) -> RatingResult<RatedItem> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RatingError::invalid("item title must not be empty"));
        }

        let baseline = self.provider.current().global_average();
        let item = self
            .store
            .insert_item(title.to_string(), genre, baseline)
            .await
            .store_context("insert item")?;
        info!("Added item {} ({}, {})", item.id, item.title, item.genre);
        Ok(item)
    }

    /// Stores a review and the refreshed aggregate of its item before
    /// returning.
    ///
    /// Both are written atomically, so a failed attempt leaves nothing
    /// behind and transient failures are retried as a whole, up to the
    /// configured number of retries.
    pub async fn submit_review(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: RatingValue,
        review_text: Option<String>,
    ) -> RatingResult<SubmittedReview> {
        let rating = ReviewRating::new(rating)?;

        let mut attempt: u32 = 0;
        loop {
            match self
                .updater
                .submit(item_id, user_id, rating, review_text.clone())
                .await
            {
                Ok((review_id, aggregate)) => {
                    return Ok(SubmittedReview {
                        review_id,
                        aggregate,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.settings.refresh_retries => {
                    attempt += 1;
                    warn!(
                        "Review for item {} failed (attempt {}): {}",
                        item_id, attempt, e
                    );
                    let backoff = self.settings.retry_backoff_ms * u64::from(attempt);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn refresh_item_rating(&self, item_id: ItemId) -> RatingResult<ItemAggregate> {
        self.updater.refresh(item_id).await
    }

    pub async fn recalculate_all_ratings(&self) -> RatingResult<RecalculationReport> {
        self.recalculate_all_ratings_with(&CancelFlag::new()).await
    }

    pub async fn recalculate_all_ratings_with(
        &self,
        cancel: &CancelFlag,
    ) -> RatingResult<RecalculationReport> {
        self.orchestrator.run(cancel).await
    }

    /// Items ordered by smoothed rating, optionally restricted to one genre.
    pub async fn list_top_rated(
        &self,
        genre: Option<Genre>,
        limit: usize,
        offset: usize,
    ) -> RatingResult<TopRatedPage> {
        if !(1..=MAX_PAGE_SIZE).contains(&limit) {
            return Err(RatingError::invalid(format!(
                "limit must be within 1..={}, got {}",
                MAX_PAGE_SIZE, limit
            )));
        }
        if i64::try_from(offset).is_err() {
            return Err(RatingError::invalid(format!(
                "offset must be at most {}, got {}",
                i64::MAX,
                offset
            )));
        }

        let items = self
            .store
            .list_top_rated(genre, limit, offset)
            .await
            .store_context("list top rated items")?;
        let total_count = self
            .store
            .count_items(genre)
            .await
            .store_context("count items")?;

        Ok(TopRatedPage::new(items, total_count, limit, offset))
    }
}
