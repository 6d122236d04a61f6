use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};

use super::models::Review;
use crate::rating::{ItemId, RatingValue, ReviewRating, UserId};

pub fn insert_review(
    conn: &Connection,
    item_id: ItemId,
    user_id: UserId,
    rating: ReviewRating,
    review_text: Option<&str>,
    created_at: NaiveDateTime,
) -> Result<Review> {
    let sql = "INSERT INTO reviews (rpg_item_id, user_id, rating, review_text, created_at) VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id, rpg_item_id, user_id, rating, review_text, created_at";

    conn.query_row(
        sql,
        params![item_id, user_id, rating.value(), review_text, created_at],
        parse_review_row,
    )
    .context("Failed to insert review")
}

fn parse_review_row(row: &rusqlite::Row) -> rusqlite::Result<Review> {
    Ok(Review {
        id: row.get(0)?,
        item_id: row.get(1)?,
        user_id: row.get(2)?,
        rating: row.get(3)?,
        review_text: row.get(4)?,
        created_at: row.get(5)?,
    })
}

pub fn list_ratings_for_item(conn: &Connection, item_id: ItemId) -> Result<Vec<RatingValue>> {
    let sql = "SELECT rating FROM reviews WHERE rpg_item_id = ?1";

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![item_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list ratings for item")?;

    Ok(rows)
}

/// Walks every rating in the system without collecting them.
///
/// `visit` returns false to stop early. Returns how many rows were visited.
pub fn scan_all_ratings<F>(conn: &Connection, mut visit: F) -> Result<u64>
where
    F: FnMut(RatingValue) -> bool,
{
    let mut stmt = conn.prepare("SELECT rating FROM reviews")?;
    let mut rows = stmt.query([])?;
    let mut visited = 0;

    while let Some(row) = rows.next().context("Failed to read rating row")? {
        visited += 1;
        if !visit(row.get(0)?) {
            break;
        }
    }

    Ok(visited)
}
