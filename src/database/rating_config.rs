use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use super::connection::DbConn;
use crate::rating::{RatingConfig, StoredConfig};

pub fn load(conn: &mut DbConn) -> Result<Option<StoredConfig>> {
    let sql = "SELECT global_average, minimum_ratings_threshold, computed_at FROM rating_config WHERE id = 1";

    let row = conn
        .query_row(sql, [], |row| {
            Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?, row.get(2)?))
        })
        .optional()
        .context("Failed to load rating config")?;

    let Some((global_average, threshold, computed_at)) = row else {
        return Ok(None);
    };

    let config = RatingConfig::new(global_average, threshold)
        .context("Stored rating config is invalid")?;

    Ok(Some(StoredConfig {
        config,
        computed_at,
    }))
}

pub fn save(conn: &mut DbConn, stored: &StoredConfig) -> Result<()> {
    let sql = "INSERT INTO rating_config (id, global_average, minimum_ratings_threshold, computed_at) VALUES (1, ?1, ?2, ?3) ON CONFLICT (id) DO UPDATE SET global_average = excluded.global_average, minimum_ratings_threshold = excluded.minimum_ratings_threshold, computed_at = excluded.computed_at";

    conn.execute(
        sql,
        params![
            stored.config.global_average(),
            stored.config.minimum_ratings_threshold(),
            stored.computed_at
        ],
    )
    .context("Failed to save rating config")
    .map(|_| ())
}
