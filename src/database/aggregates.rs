use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction, TransactionBehavior};

use super::models::Review;
use super::{items, reviews};
use crate::rating::{ItemAggregate, ItemId, RatingConfig, ReviewRating, UserId, aggregate_from_ratings};

/// Takes the write lock up front, so two connections never both read an
/// item's reviews and then race to write its aggregate.
fn begin(conn: &mut Connection) -> Result<Transaction<'_>> {
    conn.transaction_with_behavior(TransactionBehavior::Immediate)
        .context("Failed to begin aggregate transaction")
}

fn recompute(conn: &Connection, item_id: ItemId, config: &RatingConfig) -> Result<Option<ItemAggregate>> {
    let ratings = reviews::list_ratings_for_item(conn, item_id)?;
    let aggregate = aggregate_from_ratings(item_id, &ratings, config)?;

    let updated = items::update_aggregate(
        conn,
        item_id,
        aggregate.raw_average,
        aggregate.review_count,
        aggregate.smoothed_rating,
    )?;
    Ok(updated.then_some(aggregate))
}

pub fn refresh(
    conn: &mut Connection,
    item_id: ItemId,
    config: &RatingConfig,
) -> Result<Option<ItemAggregate>> {
    let tx = begin(conn)?;
    let aggregate = recompute(&tx, item_id, config)?;
    tx.commit().context("Failed to commit aggregate refresh")?;
    Ok(aggregate)
}

/// Dropping the transaction on any early return rolls the review back.
pub fn insert_review_and_refresh(
    conn: &mut Connection,
    item_id: ItemId,
    user_id: UserId,
    rating: ReviewRating,
    review_text: Option<&str>,
    created_at: NaiveDateTime,
    config: &RatingConfig,
) -> Result<Option<(Review, ItemAggregate)>> {
    let tx = begin(conn)?;
    if items::find_by_id(&tx, item_id)?.is_none() {
        return Ok(None);
    }

    let review = reviews::insert_review(&tx, item_id, user_id, rating, review_text, created_at)?;
    let Some(aggregate) = recompute(&tx, item_id, config)? else {
        return Ok(None);
    };

    tx.commit().context("Failed to commit review")?;
    Ok(Some((review, aggregate)))
}
