//! Storage seams the rating engine reads from and writes to.
//!
//! Every method returns `anyhow::Result`; the engine decides which failures
//! are fatal and lifts them into `RatingError::StoreUnavailable`.

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::rating::{
    Genre, ItemAggregate, ItemId, RatedItem, RatingConfig, RatingValue, ReviewId, ReviewRating,
    StoredConfig, UserId,
};

mod memory;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;

#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert_review(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: ReviewRating,
        review_text: Option<String>,
    ) -> Result<ReviewId>;

    async fn list_ratings_for_item(&self, item_id: ItemId) -> Result<Vec<RatingValue>>;

    /// Every rating in the system, produced lazily.
    fn stream_all_ratings(&self) -> BoxStream<'static, Result<RatingValue>>;
}

#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Registers an item with no reviews, ranked at `baseline`.
    async fn insert_item(&self, title: String, genre: Genre, baseline: RatingValue)
    -> Result<RatedItem>;

    async fn get_item(&self, item_id: ItemId) -> Result<Option<RatedItem>>;

    async fn list_all_item_ids(&self) -> Result<Vec<ItemId>>;

    /// Single-row write of all aggregate fields. `Ok(false)` if the item is gone.
    async fn update_item_aggregate(&self, aggregate: ItemAggregate) -> Result<bool>;

    async fn list_top_rated(
        &self,
        genre: Option<Genre>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RatedItem>>;

    async fn count_items(&self, genre: Option<Genre>) -> Result<u64>;
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn load_config(&self) -> Result<Option<StoredConfig>>;

    async fn save_config(&self, stored: StoredConfig) -> Result<()>;
}

/// Read-recompute-write of an item's aggregate as one atomic unit of the
/// store, so writers in other processes sharing the store cannot interleave.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Recomputes the item's aggregate from its current reviews under
    /// `config` and writes it. `Ok(None)` if the item does not exist.
    async fn refresh_aggregate(
        &self,
        item_id: ItemId,
        config: RatingConfig,
    ) -> Result<Option<ItemAggregate>>;

    /// Inserts a review and refreshes the item's aggregate. Either both are
    /// stored or neither is. `Ok(None)` if the item does not exist.
    async fn insert_review_and_refresh(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: ReviewRating,
        review_text: Option<String>,
        config: RatingConfig,
    ) -> Result<Option<(ReviewId, ItemAggregate)>>;
}

pub trait RatingStore: ReviewStore + ItemStore + ConfigStore + AggregateStore {}

impl<T> RatingStore for T where T: ReviewStore + ItemStore + ConfigStore + AggregateStore {}
