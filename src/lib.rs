pub mod cli;
pub mod config;
pub mod database;
pub mod errors;
pub mod rating;
pub mod services;
pub mod store;

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use log::info;
use serde::Serialize;

use crate::cli::Command;
use crate::config::settings::AppConfig;
use crate::database::SqliteStore;
use crate::rating::Genre;
use crate::services::RatingEngine;

pub fn interpret() -> Command {
    let cli = Cli::parse();
    cli.command
}

pub fn handle_init() -> Result<()> {
    let config = AppConfig::from_env();
    SqliteStore::open(&config.database)?;
    info!("Schema ready at {}", config.database.path);
    Ok(())
}

pub fn handle_add_item(title: &str, genre: &str) -> Result<()> {
    let genre: Genre = genre.parse()?;
    with_engine(|engine| async move {
        let item = engine.add_item(title, genre).await?;
        print_json(&item)
    })
}

pub fn handle_review(item: i64, user: i64, rating: f64, text: Option<String>) -> Result<()> {
    with_engine(|engine| async move {
        let submitted = engine.submit_review(item, user, rating, text).await?;
        print_json(&submitted)
    })
}

pub fn handle_refresh(item: i64) -> Result<()> {
    with_engine(|engine| async move {
        let aggregate = engine.refresh_item_rating(item).await?;
        print_json(&aggregate)
    })
}

pub fn handle_recalculate() -> Result<()> {
    with_engine(|engine| async move {
        let report = engine.recalculate_all_ratings().await?;
        print_json(&report)?;
        report.into_result()?;
        Ok(())
    })
}

pub fn handle_top(genre: Option<&str>, limit: usize, offset: usize) -> Result<()> {
    let genre = match genre {
        Some(category) => Genre::from_category(category)?,
        None => None,
    };
    with_engine(|engine| async move {
        let page = engine.list_top_rated(genre, limit, offset).await?;
        print_json(&page)
    })
}

fn with_engine<'a, F, Fut>(action: F) -> Result<()>
where
    F: FnOnce(Arc<RatingEngine>) -> Fut + 'a,
    Fut: Future<Output = Result<()>> + 'a,
{
    let config = AppConfig::from_env();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let store = SqliteStore::open(&config.database)
            .with_context(|| format!("Failed to open database at {}", config.database.path))?;
        let engine = RatingEngine::bootstrap(Arc::new(store), config.rating.clone()).await?;
        action(Arc::new(engine)).await
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
