use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};

use super::{AggregateStore, ConfigStore, ItemStore, ReviewStore};
use crate::rating::{
    Genre, ItemAggregate, ItemId, RatedItem, RatingConfig, RatingValue, ReviewId, ReviewRating,
    StoredConfig, UserId, aggregate_from_ratings,
};

#[derive(Debug, Default)]
struct MemoryState {
    items: BTreeMap<ItemId, RatedItem>,
    reviews: Vec<StoredReview>,
    config: Option<StoredConfig>,
    next_item_id: ItemId,
    next_review_id: ReviewId,
}

#[derive(Debug, Clone)]
struct StoredReview {
    item_id: ItemId,
    rating: RatingValue,
}

impl MemoryState {
    fn ratings_for(&self, item_id: ItemId) -> Vec<RatingValue> {
        self.reviews
            .iter()
            .filter(|review| review.item_id == item_id)
            .map(|review| review.rating)
            .collect()
    }

    fn push_review(&mut self, item_id: ItemId, rating: ReviewRating) -> ReviewId {
        self.next_review_id += 1;
        self.reviews.push(StoredReview {
            item_id,
            rating: rating.value(),
        });
        self.next_review_id
    }

    fn write_aggregate(&mut self, aggregate: ItemAggregate) -> bool {
        let Some(item) = self.items.get_mut(&aggregate.item_id) else {
            return false;
        };
        item.raw_average = aggregate.raw_average;
        item.review_count = aggregate.review_count;
        item.smoothed_rating = aggregate.smoothed_rating;
        true
    }
}

/// Process-local store, for embedding in a long-lived host and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ReviewStore for MemoryStore {
    async fn insert_review(
        &self,
        item_id: ItemId,
        _user_id: UserId,
        rating: ReviewRating,
        _review_text: Option<String>,
    ) -> Result<ReviewId> {
        let mut state = self.state();
        if !state.items.contains_key(&item_id) {
            anyhow::bail!("Cannot review unknown item {}", item_id);
        }

        Ok(state.push_review(item_id, rating))
    }

    async fn list_ratings_for_item(&self, item_id: ItemId) -> Result<Vec<RatingValue>> {
        Ok(self.state().ratings_for(item_id))
    }

    fn stream_all_ratings(&self) -> BoxStream<'static, Result<RatingValue>> {
        let ratings: Vec<Result<RatingValue>> = self
            .state()
            .reviews
            .iter()
            .map(|review| Ok(review.rating))
            .collect();
        stream::iter(ratings).boxed()
    }
}

#[async_trait]
impl ItemStore for MemoryStore {
    async fn insert_item(
        &self,
        title: String,
        genre: Genre,
        baseline: RatingValue,
    ) -> Result<RatedItem> {
        let mut state = self.state();
        state.next_item_id += 1;
        let item = RatedItem {
            id: state.next_item_id,
            title,
            genre,
            raw_average: 0.0,
            review_count: 0,
            smoothed_rating: baseline,
            created_at: Utc::now().naive_utc(),
        };
        state.items.insert(item.id, item.clone());
        Ok(item)
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<RatedItem>> {
        Ok(self.state().items.get(&item_id).cloned())
    }

    async fn list_all_item_ids(&self) -> Result<Vec<ItemId>> {
        Ok(self.state().items.keys().copied().collect())
    }

    async fn update_item_aggregate(&self, aggregate: ItemAggregate) -> Result<bool> {
        Ok(self.state().write_aggregate(aggregate))
    }

    async fn list_top_rated(
        &self,
        genre: Option<Genre>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RatedItem>> {
        let state = self.state();
        let mut items: Vec<RatedItem> = state
            .items
            .values()
            .filter(|item| genre.is_none_or(|g| item.genre == g))
            .cloned()
            .collect();

        items.sort_by(|a, b| {
            b.smoothed_rating
                .total_cmp(&a.smoothed_rating)
                .then(b.review_count.cmp(&a.review_count))
                .then(a.id.cmp(&b.id))
        });

        Ok(items.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_items(&self, genre: Option<Genre>) -> Result<u64> {
        let state = self.state();
        let count = state
            .items
            .values()
            .filter(|item| genre.is_none_or(|g| item.genre == g))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn load_config(&self) -> Result<Option<StoredConfig>> {
        Ok(self.state().config)
    }

    async fn save_config(&self, stored: StoredConfig) -> Result<()> {
        self.state().config = Some(stored);
        Ok(())
    }
}

/// Both operations run under the state lock, which makes them atomic for
/// every user of this store.
#[async_trait]
impl AggregateStore for MemoryStore {
    async fn refresh_aggregate(
        &self,
        item_id: ItemId,
        config: RatingConfig,
    ) -> Result<Option<ItemAggregate>> {
        let mut state = self.state();
        if !state.items.contains_key(&item_id) {
            return Ok(None);
        }

        let aggregate = aggregate_from_ratings(item_id, &state.ratings_for(item_id), &config)?;
        state.write_aggregate(aggregate);
        Ok(Some(aggregate))
    }

    async fn insert_review_and_refresh(
        &self,
        item_id: ItemId,
        _user_id: UserId,
        rating: ReviewRating,
        _review_text: Option<String>,
        config: RatingConfig,
    ) -> Result<Option<(ReviewId, ItemAggregate)>> {
        let mut state = self.state();
        if !state.items.contains_key(&item_id) {
            return Ok(None);
        }

        // Computed before anything is written, so a failure leaves no trace.
        let mut ratings = state.ratings_for(item_id);
        ratings.push(rating.value());
        let aggregate = aggregate_from_ratings(item_id, &ratings, &config)?;

        let review_id = state.push_review(item_id, rating);
        state.write_aggregate(aggregate);
        Ok(Some((review_id, aggregate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    fn rating(value: f64) -> ReviewRating {
        ReviewRating::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_reviews_are_scoped_to_item() -> Result<()> {
        let store = MemoryStore::new();
        let first = store.insert_item("Mothership".into(), Genre::Horror, 7.0).await?;
        let second = store.insert_item("Blades in the Dark".into(), Genre::Fantasy, 7.0).await?;

        store.insert_review(first.id, 1, rating(9.0), None).await?;
        store.insert_review(second.id, 1, rating(4.0), None).await?;
        store.insert_review(first.id, 2, rating(8.0), Some("Tense".into())).await?;

        assert_eq!(store.list_ratings_for_item(first.id).await?, vec![9.0, 8.0]);
        assert_eq!(store.list_ratings_for_item(second.id).await?, vec![4.0]);

        let all: Vec<f64> = store.stream_all_ratings().try_collect().await?;
        assert_eq!(all, vec![9.0, 4.0, 8.0]);
        Ok(())
    }

    #[tokio::test]
    async fn test_review_for_unknown_item_fails() {
        let store = MemoryStore::new();
        assert!(store.insert_review(42, 1, rating(5.0), None).await.is_err());
    }

    #[tokio::test]
    async fn test_update_unknown_item_reports_false() -> Result<()> {
        let store = MemoryStore::new();
        let updated = store
            .update_item_aggregate(ItemAggregate {
                item_id: 7,
                raw_average: 8.0,
                review_count: 1,
                smoothed_rating: 7.09,
            })
            .await?;
        assert!(!updated);
        Ok(())
    }

    #[tokio::test]
    async fn test_insert_review_and_refresh() -> Result<()> {
        let store = MemoryStore::new();
        let item = store.insert_item("Kids on Bikes".into(), Genre::Modern, 7.0).await?;

        let (first, _) = store
            .insert_review_and_refresh(item.id, 1, rating(10.0), None, RatingConfig::seed())
            .await?
            .expect("item exists");
        let (second, aggregate) = store
            .insert_review_and_refresh(item.id, 2, rating(10.0), None, RatingConfig::seed())
            .await?
            .expect("item exists");

        assert!(second > first);
        assert_eq!(aggregate.review_count, 2);
        assert_eq!(aggregate.smoothed_rating, 7.5);
        assert_eq!(store.get_item(item.id).await?.unwrap().aggregate(), aggregate);

        let missing = store
            .insert_review_and_refresh(item.id + 1, 1, rating(5.0), None, RatingConfig::seed())
            .await?;
        assert!(missing.is_none());
        assert_eq!(store.stream_all_ratings().try_collect::<Vec<_>>().await?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_top_rated_order_and_filter() -> Result<()> {
        let store = MemoryStore::new();
        for (title, genre, smoothed, count) in [
            ("Traveller", Genre::SciFi, 7.2, 3),
            ("Call of Cthulhu", Genre::Horror, 7.8, 10),
            ("Lancer", Genre::SciFi, 7.8, 4),
            ("Alien", Genre::SciFi, 6.5, 2),
        ] {
            let item = store.insert_item(title.into(), genre, 7.0).await?;
            store
                .update_item_aggregate(ItemAggregate {
                    item_id: item.id,
                    raw_average: smoothed,
                    review_count: count,
                    smoothed_rating: smoothed,
                })
                .await?;
        }

        let titles = |items: Vec<RatedItem>| items.into_iter().map(|i| i.title).collect::<Vec<_>>();

        assert_eq!(
            titles(store.list_top_rated(None, 10, 0).await?),
            vec!["Call of Cthulhu", "Lancer", "Traveller", "Alien"]
        );
        assert_eq!(
            titles(store.list_top_rated(Some(Genre::SciFi), 2, 1).await?),
            vec!["Traveller", "Alien"]
        );
        assert_eq!(store.count_items(Some(Genre::SciFi)).await?, 3);
        assert_eq!(store.count_items(None).await?, 4);
        Ok(())
    }
}
