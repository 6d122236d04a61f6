use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use log::debug;
use tokio::sync::mpsc;

use super::connection::{create_pool, get_connection, DbConn, DbPool};
use super::{aggregates, items, rating_config, reviews, setup};
use crate::config::DatabaseSettings;
use crate::rating::{
    Genre, ItemAggregate, ItemId, RatedItem, RatingConfig, RatingValue, ReviewId, ReviewRating,
    StoredConfig, UserId,
};
use crate::store::{AggregateStore, ConfigStore, ItemStore, ReviewStore};

const RATING_STREAM_BUFFER: usize = 1024;

/// SQLite-backed store. Queries run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens the pool and makes sure the schema exists.
    pub fn open(settings: &DatabaseSettings) -> Result<Self> {
        let pool = create_pool(settings)?;
        let mut conn = get_connection(&pool)?;
        setup::initialize_schema(&mut conn)?;
        Ok(Self::new(pool))
    }

    async fn with_conn<T, F>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut DbConn) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = get_connection(&pool)?;
            operation(&mut conn)
        })
        .await
        .context("Database task panicked or was cancelled")?
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    async fn insert_review(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: ReviewRating,
        review_text: Option<String>,
    ) -> Result<ReviewId> {
        let created_at = Utc::now().naive_utc();
        let review = self
            .with_conn(move |conn| {
                reviews::insert_review(
                    conn,
                    item_id,
                    user_id,
                    rating,
                    review_text.as_deref(),
                    created_at,
                )
            })
            .await?;
        Ok(review.id)
    }

    async fn list_ratings_for_item(&self, item_id: ItemId) -> Result<Vec<RatingValue>> {
        self.with_conn(move |conn| reviews::list_ratings_for_item(conn, item_id))
            .await
    }

    /// Must be called from within a Tokio runtime. Rows are pushed through a
    /// bounded channel so the producer never runs far ahead of the consumer.
    fn stream_all_ratings(&self) -> BoxStream<'static, Result<RatingValue>> {
        let pool = self.pool.clone();
        let (tx, rx) = mpsc::channel(RATING_STREAM_BUFFER);

        tokio::task::spawn_blocking(move || {
            let scanned = get_connection(&pool).and_then(|mut conn| {
                reviews::scan_all_ratings(&mut conn, |rating| tx.blocking_send(Ok(rating)).is_ok())
            });
            match scanned {
                Ok(count) => debug!("Streamed {} ratings", count),
                Err(e) => {
                    // Receiver may already be gone; nothing left to report to.
                    let _ = tx.blocking_send(Err(e));
                }
            }
        });

        stream::unfold(rx, |mut rx| async move {
            let next = rx.recv().await?;
            Some((next, rx))
        })
        .boxed()
    }
}

#[async_trait]
impl ItemStore for SqliteStore {
    async fn insert_item(
        &self,
        title: String,
        genre: Genre,
        baseline: RatingValue,
    ) -> Result<RatedItem> {
        let created_at = Utc::now().naive_utc();
        self.with_conn(move |conn| items::insert_item(conn, &title, genre, baseline, created_at))
            .await
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<RatedItem>> {
        self.with_conn(move |conn| items::find_by_id(conn, item_id))
            .await
    }

    async fn list_all_item_ids(&self) -> Result<Vec<ItemId>> {
        self.with_conn(|conn| items::list_all_ids(conn)).await
    }

    async fn update_item_aggregate(&self, aggregate: ItemAggregate) -> Result<bool> {
        self.with_conn(move |conn| {
            items::update_aggregate(
                conn,
                aggregate.item_id,
                aggregate.raw_average,
                aggregate.review_count,
                aggregate.smoothed_rating,
            )
        })
        .await
    }

    async fn list_top_rated(
        &self,
        genre: Option<Genre>,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RatedItem>> {
        self.with_conn(move |conn| items::list_top_rated(conn, genre, limit, offset))
            .await
    }

    async fn count_items(&self, genre: Option<Genre>) -> Result<u64> {
        self.with_conn(move |conn| items::count(conn, genre)).await
    }
}

#[async_trait]
impl ConfigStore for SqliteStore {
    async fn load_config(&self) -> Result<Option<StoredConfig>> {
        self.with_conn(rating_config::load).await
    }

    async fn save_config(&self, stored: StoredConfig) -> Result<()> {
        self.with_conn(move |conn| rating_config::save(conn, &stored))
            .await
    }
}

#[async_trait]
impl AggregateStore for SqliteStore {
    async fn refresh_aggregate(
        &self,
        item_id: ItemId,
        config: RatingConfig,
    ) -> Result<Option<ItemAggregate>> {
        self.with_conn(move |conn| aggregates::refresh(conn, item_id, &config))
            .await
    }

    async fn insert_review_and_refresh(
        &self,
        item_id: ItemId,
        user_id: UserId,
        rating: ReviewRating,
        review_text: Option<String>,
        config: RatingConfig,
    ) -> Result<Option<(ReviewId, ItemAggregate)>> {
        let created_at = Utc::now().naive_utc();
        let submitted = self
            .with_conn(move |conn| {
                aggregates::insert_review_and_refresh(
                    conn,
                    item_id,
                    user_id,
                    rating,
                    review_text.as_deref(),
                    created_at,
                    &config,
                )
            })
            .await?;
        Ok(submitted.map(|(review, aggregate)| (review.id, aggregate)))
    }
}
