use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use serde::Serialize;

use super::progress::RecalculationProgress;
use super::updater::ItemRatingUpdater;
use crate::config::RatingSettings;
use crate::errors::{RatingError, RatingResult, StoreContext};
use crate::rating::global_average::estimate_from_stream;
use crate::rating::{ItemId, RatingConfigProvider, RatingValue, StoredConfig};
use crate::store::RatingStore;

/// Cooperative stop signal for a running recalculation.
///
/// Checked before each item is started; an item already being written
/// finishes normally.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculationReport {
    pub global_average: RatingValue,
    pub ratings_scanned: u64,
    pub updated: usize,
    pub failed: Vec<ItemId>,
    pub skipped: usize,
    pub cancelled: bool,
}

impl RecalculationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    /// Turns a report with failed items into `PartialBatchFailure`.
    pub fn into_result(self) -> RatingResult<Self> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(RatingError::PartialBatchFailure {
                failed: self.failed,
            })
        }
    }
}

enum ItemOutcome {
    Updated,
    Failed,
    Skipped,
}

/// Refreshes the global baseline, then every item against it.
pub struct RecalculationOrchestrator {
    store: Arc<dyn RatingStore>,
    provider: Arc<RatingConfigProvider>,
    updater: Arc<ItemRatingUpdater>,
    settings: RatingSettings,
}

impl RecalculationOrchestrator {
    pub fn new(
        store: Arc<dyn RatingStore>,
        provider: Arc<RatingConfigProvider>,
        updater: Arc<ItemRatingUpdater>,
        settings: RatingSettings,
    ) -> Self {
        Self {
            store,
            provider,
            updater,
            settings,
        }
    }

    /// Fails only if the new baseline cannot be computed or stored. Item
    /// failures are collected in the report and never stop the run.
    pub async fn run(&self, cancel: &CancelFlag) -> RatingResult<RecalculationReport> {
        info!("=== Starting Rating Recalculation ===");

        let (stored, ratings_scanned) = self.refresh_global_average().await?;
        info!(
            "  → Global average {} from {} ratings",
            stored.config.global_average(),
            ratings_scanned
        );

        let item_ids = self
            .store
            .list_all_item_ids()
            .await
            .store_context("list item ids")?;
        info!("  → Refreshing {} items", item_ids.len());

        let mut report = RecalculationReport {
            global_average: stored.config.global_average(),
            ratings_scanned,
            updated: 0,
            failed: Vec::new(),
            skipped: 0,
            cancelled: false,
        };
        self.refresh_items(item_ids, cancel, &mut report).await;
        report.cancelled = cancel.is_cancelled() && report.skipped > 0;

        if report.cancelled {
            warn!("Recalculation cancelled, {} items left stale", report.skipped);
        }
        if !report.failed.is_empty() {
            warn!("{} items failed to refresh: {:?}", report.failed.len(), report.failed);
        }
        info!("=== Recalculation Complete ({} updated) ===", report.updated);
        Ok(report)
    }

    async fn refresh_global_average(&self) -> RatingResult<(StoredConfig, u64)> {
        let estimator = estimate_from_stream(self.store.stream_all_ratings()).await?;
        let config = self
            .provider
            .current()
            .with_global_average(estimator.finish())?;
        let stored = StoredConfig {
            config,
            computed_at: Utc::now().naive_utc(),
        };

        self.store
            .save_config(stored)
            .await
            .store_context("save rating config")?;
        self.provider.publish(stored);

        Ok((stored, estimator.count()))
    }

    async fn refresh_items(
        &self,
        item_ids: Vec<ItemId>,
        cancel: &CancelFlag,
        report: &mut RecalculationReport,
    ) {
        let mut progress = RecalculationProgress::new(item_ids.len(), self.settings.progress_log_every);
        let updater = &self.updater;
        let workers = self.settings.max_concurrent_updates.max(1);

        let mut outcomes = stream::iter(item_ids)
            .map(move |item_id| async move {
                if cancel.is_cancelled() {
                    return (item_id, ItemOutcome::Skipped);
                }
                match updater.refresh(item_id).await {
                    Ok(_) => (item_id, ItemOutcome::Updated),
                    Err(e) => {
                        warn!("Failed to refresh item {}: {}", item_id, e);
                        (item_id, ItemOutcome::Failed)
                    }
                }
            })
            .buffer_unordered(workers);

        while let Some((item_id, outcome)) = outcomes.next().await {
            match outcome {
                ItemOutcome::Updated => {
                    report.updated += 1;
                    progress.increment_updated();
                }
                ItemOutcome::Failed => {
                    report.failed.push(item_id);
                    progress.increment_failed();
                }
                ItemOutcome::Skipped => report.skipped += 1,
            }
        }

        report.failed.sort_unstable();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::{Genre, ReviewRating};
    use crate::store::testing::FaultyStore;
    use crate::store::{ConfigStore, ItemStore, ReviewStore};

    struct Fixture {
        store: Arc<FaultyStore>,
        provider: Arc<RatingConfigProvider>,
        orchestrator: RecalculationOrchestrator,
        items: Vec<ItemId>,
    }

    /// Items with reviews `[10, 10]`, `[4, 6]` and none.
    async fn fixture(broken_items: &[usize], broken_scan: bool, workers: usize) -> Fixture {
        fixture_with(
            FaultyStore {
                broken_scan,
                ..FaultyStore::new()
            },
            broken_items,
            workers,
        )
        .await
    }

    async fn fixture_with(mut store: FaultyStore, broken_items: &[usize], workers: usize) -> Fixture {

        let mut items = Vec::new();
        for (title, ratings) in [
            ("Ironsworn", vec![10.0, 10.0]),
            ("FATAL", vec![4.0, 6.0]),
            ("Unreviewed", vec![]),
        ] {
            let item = store.insert_item(title.into(), Genre::Other, 7.0).await.unwrap();
            for (user, value) in ratings.into_iter().enumerate() {
                store
                    .insert_review(item.id, user as i64, ReviewRating::new(value).unwrap(), None)
                    .await
                    .unwrap();
            }
            items.push(item.id);
        }
        for &idx in broken_items {
            store.broken_items.insert(items[idx]);
        }

        let store = Arc::new(store);
        let provider = Arc::new(RatingConfigProvider::default());
        let updater = Arc::new(ItemRatingUpdater::new(store.clone(), provider.clone()));
        let settings = RatingSettings {
            max_concurrent_updates: workers,
            ..RatingSettings::default()
        };
        let orchestrator =
            RecalculationOrchestrator::new(store.clone(), provider.clone(), updater, settings);

        Fixture {
            store,
            provider,
            orchestrator,
            items,
        }
    }

    #[tokio::test]
    async fn test_recalculation_refreshes_baseline_and_items() {
        let f = fixture(&[], false, 4).await;

        let report = f.orchestrator.run(&CancelFlag::new()).await.unwrap();

        // (10 + 10 + 4 + 6) / 4
        assert_eq!(report.global_average, 7.5);
        assert_eq!(report.ratings_scanned, 4);
        assert_eq!(report.updated, 3);
        assert!(report.is_complete());
        assert_eq!(f.provider.current().global_average(), 7.5);
        assert_eq!(f.provider.current().minimum_ratings_threshold(), 10.0);

        let stored = f.store.load_config().await.unwrap().unwrap();
        assert_eq!(stored.config.global_average(), 7.5);

        let unreviewed = f.store.get_item(f.items[2]).await.unwrap().unwrap();
        assert_eq!(unreviewed.smoothed_rating, 7.5);

        // (2/12)*10 + (10/12)*7.5 = 7.9167
        let top = f.store.get_item(f.items[0]).await.unwrap().unwrap();
        assert_eq!(top.smoothed_rating, 7.92);
        // (2/12)*5 + (10/12)*7.5 = 7.0833
        let low = f.store.get_item(f.items[1]).await.unwrap().unwrap();
        assert_eq!(low.smoothed_rating, 7.08);
    }

    #[tokio::test]
    async fn test_item_failures_are_collected() {
        let f = fixture(&[0, 2], false, 2).await;

        let report = f.orchestrator.run(&CancelFlag::new()).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.failed, vec![f.items[0], f.items[2]]);
        assert!(!report.is_complete());

        let refreshed = f.store.get_item(f.items[1]).await.unwrap().unwrap();
        assert_eq!(refreshed.smoothed_rating, 7.08);

        match report.into_result() {
            Err(RatingError::PartialBatchFailure { failed }) => {
                assert_eq!(failed, vec![f.items[0], f.items[2]])
            }
            other => panic!("expected partial failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scan_failure_aborts_before_items() {
        let f = fixture(&[], true, 2).await;

        let result = f.orchestrator.run(&CancelFlag::new()).await;
        assert!(matches!(result, Err(RatingError::StoreUnavailable(_))));

        assert!(f.store.load_config().await.unwrap().is_none());
        assert!(f.provider.snapshot().computed_at.is_none());
        let untouched = f.store.get_item(f.items[0]).await.unwrap().unwrap();
        assert_eq!(untouched.review_count, 0);
    }

    #[tokio::test]
    async fn test_cancelled_run_skips_items() {
        let f = fixture(&[], false, 1).await;
        let cancel = CancelFlag::new();
        cancel.cancel();

        let report = f.orchestrator.run(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.updated, 0);
        assert_eq!(report.skipped, 3);
        assert!(report.failed.is_empty());
        // Baseline was still refreshed before the item pass.
        assert_eq!(f.provider.current().global_average(), 7.5);
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_cancel_during_item_pass() {
        let cancel = CancelFlag::new();
        let store = FaultyStore {
            cancel_after_refresh: Some(cancel.clone()),
            ..FaultyStore::new()
        };
        let f = fixture_with(store, &[], 1).await;

        let report = f.orchestrator.run(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert!(report.updated >= 1);
        assert!(report.skipped >= 1);
        assert_eq!(report.updated + report.skipped, f.items.len());
        assert!(report.failed.is_empty());

        // The first item was refreshed against the new baseline.
        let refreshed = f.store.get_item(f.items[0]).await.unwrap().unwrap();
        assert_eq!(refreshed.review_count, 2);
        assert_eq!(refreshed.smoothed_rating, 7.92);
    }

    #[test]
    fn test_complete_report_into_result() {
        let report = RecalculationReport {
            global_average: 7.0,
            ratings_scanned: 0,
            updated: 2,
            failed: Vec::new(),
            skipped: 0,
            cancelled: false,
        };
        assert_eq!(report.clone().into_result().unwrap(), report);
    }
}
