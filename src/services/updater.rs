use std::sync::Arc;

use log::debug;

use super::locks::ItemLocks;
use crate::errors::{RatingError, RatingResult, StoreContext};
use crate::rating::{ItemAggregate, ItemId, RatingConfigProvider, ReviewId, ReviewRating, UserId};
use crate::store::RatingStore;

/// Keeps one item's stored aggregate in line with its reviews.
pub struct ItemRatingUpdater {
    store: Arc<dyn RatingStore>,
    provider: Arc<RatingConfigProvider>,
    locks: ItemLocks,
}

impl ItemRatingUpdater {
    pub fn new(store: Arc<dyn RatingStore>, provider: Arc<RatingConfigProvider>) -> Self {
        Self {
            store,
            provider,
            locks: ItemLocks::new(),
        }
    }

    /// Recomputes and persists the aggregate for `item_id`.
    ///
    /// The store performs the read and the write as one atomic unit, which
    /// holds across processes sharing it. The item lock additionally queues
    /// this process's own refreshes of one item instead of letting them
    /// contend inside the store. Running this twice without new reviews or a
    /// new config writes the same values.
    pub async fn refresh(&self, item_id: ItemId) -> RatingResult<ItemAggregate> {
        let _guard = self.locks.acquire(item_id).await;

        let config = self.provider.current();
        config.validate()?;

        let aggregate = self
            .store
            .refresh_aggregate(item_id, config)
            .await
            .store_context(&format!("refresh aggregate of item {}", item_id))?
            .ok_or(RatingError::ItemNotFound(item_id))?;

        debug!(
            "Item {}: {} reviews, raw {:.2}, smoothed {:.2} (C = {})",
            item_id,
            aggregate.review_count,
            aggregate.raw_average,
            aggregate.smoothed_rating,
            config.global_average()
        );
        Ok(aggregate)
    }

    /// Stores a review together with the refreshed aggregate of its item.
    /// On failure neither is stored, so the call can be retried as a whole.
    pub async fn submit(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: ReviewRating,
        review_text: Option<String>,
    ) -> RatingResult<(ReviewId, ItemAggregate)> {
        let _guard = self.locks.acquire(item_id).await;

        let config = self.provider.current();
        config.validate()?;

        let (review_id, aggregate) = self
            .store
            .insert_review_and_refresh(item_id, user_id, rating, review_text, config)
            .await
            .store_context(&format!("store review for item {}", item_id))?
            .ok_or(RatingError::ItemNotFound(item_id))?;

        debug!(
            "Review {} on item {}: now {} reviews, smoothed {:.2}",
            review_id, item_id, aggregate.review_count, aggregate.smoothed_rating
        );
        Ok((review_id, aggregate))
    }
}
