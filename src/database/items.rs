use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::rating::{Genre, ItemId, RatedItem, RatingValue};

const ITEM_COLUMNS: &str =
    "id, title, genre, average_rating, review_count, bayesian_rating, created_at";

pub fn insert_item(
    conn: &Connection,
    title: &str,
    genre: Genre,
    baseline: RatingValue,
    created_at: NaiveDateTime,
) -> Result<RatedItem> {
    let sql = format!(
        "INSERT INTO rpg_items (title, genre, average_rating, bayesian_rating, review_count, created_at) VALUES (?1, ?2, 0, ?3, 0, ?4) RETURNING {ITEM_COLUMNS}"
    );

    conn.query_row(
        &sql,
        params![title, genre.as_str(), baseline, created_at],
        parse_item_row,
    )
    .context("Failed to insert item")
}

fn parse_item_row(row: &rusqlite::Row) -> rusqlite::Result<RatedItem> {
    let genre: String = row.get(2)?;
    let genre = genre
        .parse::<Genre>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;
    let review_count: i64 = row.get(4)?;
    let review_count = u64::try_from(review_count)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Integer, Box::new(e)))?;

    Ok(RatedItem {
        id: row.get(0)?,
        title: row.get(1)?,
        genre,
        raw_average: row.get(3)?,
        review_count,
        smoothed_rating: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn find_by_id(conn: &Connection, id: ItemId) -> Result<Option<RatedItem>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM rpg_items WHERE id = ?1");

    conn.query_row(&sql, params![id], parse_item_row)
        .optional()
        .context("Failed to query item by id")
}

pub fn list_all_ids(conn: &Connection) -> Result<Vec<ItemId>> {
    let mut stmt = conn.prepare("SELECT id FROM rpg_items ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows)
}

/// Writes all three aggregate columns in one statement.
/// Returns false when no item has this id.
pub fn update_aggregate(
    conn: &Connection,
    id: ItemId,
    raw_average: RatingValue,
    review_count: u64,
    smoothed_rating: RatingValue,
) -> Result<bool> {
    let review_count = i64::try_from(review_count).context("Review count out of range")?;
    let sql = "UPDATE rpg_items SET average_rating = ?1, review_count = ?2, bayesian_rating = ?3 WHERE id = ?4";

    let changed = conn
        .execute(sql, params![raw_average, review_count, smoothed_rating, id])
        .context("Failed to update item aggregate")?;

    Ok(changed == 1)
}

pub fn list_top_rated(
    conn: &Connection,
    genre: Option<Genre>,
    limit: usize,
    offset: usize,
) -> Result<Vec<RatedItem>> {
    let sql = format!(
        "SELECT {ITEM_COLUMNS} FROM rpg_items WHERE (?1 IS NULL OR genre = ?1) ORDER BY bayesian_rating DESC, review_count DESC, id ASC LIMIT ?2 OFFSET ?3"
    );
    let limit = i64::try_from(limit).context("Limit out of range")?;
    let offset = i64::try_from(offset).context("Offset out of range")?;

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![genre.map(|g| g.as_str()), limit, offset],
            parse_item_row,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()
        .context("Failed to list top rated items")?;

    Ok(rows)
}

pub fn count(conn: &Connection, genre: Option<Genre>) -> Result<u64> {
    let sql = "SELECT COUNT(*) FROM rpg_items WHERE (?1 IS NULL OR genre = ?1)";

    let total: i64 = conn
        .query_row(sql, params![genre.map(|g| g.as_str())], |row| row.get(0))
        .context("Failed to count items")?;

    Ok(total.max(0) as u64)
}
