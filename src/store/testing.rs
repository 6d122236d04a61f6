//! Fault injection around `MemoryStore` for service tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use super::{AggregateStore, ConfigStore, ItemStore, MemoryStore, ReviewStore};
use crate::rating::{
    Genre, ItemAggregate, ItemId, RatedItem, RatingConfig, RatingValue, ReviewId, ReviewRating,
    StoredConfig, UserId,
};
use crate::services::CancelFlag;

#[derive(Debug, Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    /// Aggregate writes for these items always fail.
    pub broken_items: HashSet<ItemId>,
    /// The full rating scan yields an error.
    pub broken_scan: bool,
    /// Number of upcoming aggregate refreshes that fail.
    pub failing_refreshes: AtomicU32,
    /// Cancelled once an aggregate refresh has been written.
    pub cancel_after_refresh: Option<CancelFlag>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_refreshes(&self, count: u32) {
        self.failing_refreshes.store(count, Ordering::SeqCst);
    }

    fn take_refresh_failure(&self) -> bool {
        self.failing_refreshes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ReviewStore for FaultyStore {
    async fn insert_review(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: ReviewRating,
        review_text: Option<String>,
    ) -> Result<ReviewId> {
        self.inner
            .insert_review(item_id, user_id, rating, review_text)
            .await
    }

    async fn list_ratings_for_item(&self, item_id: ItemId) -> Result<Vec<RatingValue>> {
        self.inner.list_ratings_for_item(item_id).await
    }

    fn stream_all_ratings(&self) -> BoxStream<'static, Result<RatingValue>> {
        if self.broken_scan {
            return stream::iter(vec![Err(anyhow::anyhow!("database is locked"))]).boxed();
        }
        self.inner.stream_all_ratings()
    }
}

#[async_trait]
impl ItemStore for FaultyStore {
    async fn insert_item(
        &self,
        title: String,
        genre: Genre,
        baseline: RatingValue,
    ) -> Result<RatedItem> {
        self.inner.insert_item(title, genre, baseline).await
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<RatedItem>> {
        self.inner.get_item(item_id).await
    }

    async fn list_all_item_ids(&self) -> Result<Vec<ItemId>> {
        self.inner.list_all_item_ids().await
    }

    async fn update_item_aggregate(&self, aggregate: ItemAggregate) -> Result<bool> {
        if self.broken_items.contains(&aggregate.item_id) {
            anyhow::bail!("disk I/O error");
        }
        self.inner.update_item_aggregate(aggregate).await
    }

    async fn list_top_rated(
        &self,
        genre: Option<Genre>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RatedItem>> {
        self.inner.list_top_rated(genre, limit, offset).await
    }

    async fn count_items(&self, genre: Option<Genre>) -> Result<u64> {
        self.inner.count_items(genre).await
    }
}

#[async_trait]
impl ConfigStore for FaultyStore {
    async fn load_config(&self) -> Result<Option<StoredConfig>> {
        self.inner.load_config().await
    }

    async fn save_config(&self, stored: StoredConfig) -> Result<()> {
        self.inner.save_config(stored).await
    }
}

#[async_trait]
impl AggregateStore for FaultyStore {
    async fn refresh_aggregate(
        &self,
        item_id: ItemId,
        config: RatingConfig,
    ) -> Result<Option<ItemAggregate>> {
        if self.take_refresh_failure() {
            anyhow::bail!("database is locked");
        }
        if self.broken_items.contains(&item_id) {
            anyhow::bail!("disk I/O error");
        }

        let aggregate = self.inner.refresh_aggregate(item_id, config).await?;
        if let Some(cancel) = &self.cancel_after_refresh {
            cancel.cancel();
        }
        Ok(aggregate)
    }

    async fn insert_review_and_refresh(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: ReviewRating,
        review_text: Option<String>,
        config: RatingConfig,
    ) -> Result<Option<(ReviewId, ItemAggregate)>> {
        if self.take_refresh_failure() {
            anyhow::bail!("database is locked");
        }
        self.inner
            .insert_review_and_refresh(item_id, user_id, rating, review_text, config)
            .await
    }
}
