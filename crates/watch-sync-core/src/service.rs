//! Facade over the sync, progress, maintenance and rating components.
//!
//! Operations that rewrite the ledger in bulk (a reconcile pass, applied
//! duplicate cleanup, stale id repair) run under the scheduler's token so
//! they never interleave with a sync.

use std::path::PathBuf;
use std::sync::Arc;
use watch_sync_config::Config;
use watch_sync_models::{LibrarySnapshotRow, MediaKind, RatingBundle, ShowProgress, SyncStatusRecord};
use watch_sync_sources::{CatalogClient, ProviderSearchPage, RatingProvider};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::key_pool::ProviderStatus;
use crate::maintenance::{CleanupReport, LedgerMaintenance, ValidationReport};
use crate::progress::ProgressAggregator;
use crate::rating_cache::{RatingCacheManager, RatingRequest};
use crate::reconcile::ReconcileOutcome;
use crate::scheduler::{SyncHandle, SyncScheduler};
use crate::snapshot::LibrarySnapshotRefresher;
use crate::store::LedgerStore;

/// Everything a front end needs, wired over one store and one catalog
pub struct WatchLedger {
    store: Arc<dyn LedgerStore>,
    scheduler: SyncScheduler,
    snapshots: LibrarySnapshotRefresher,
    progress: ProgressAggregator,
    maintenance: LedgerMaintenance,
    ratings: RatingCacheManager,
}

impl WatchLedger {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        provider: Arc<dyn RatingProvider>,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
        rating_keys: Vec<String>,
    ) -> Self {
        Self {
            scheduler: SyncScheduler::new(catalog.clone(), store.clone(), clock.clone(), config.sync.clone()),
            snapshots: LibrarySnapshotRefresher::new(catalog.clone(), store.clone(), clock.clone()),
            progress: ProgressAggregator::new(catalog.clone(), store.clone()),
            maintenance: LedgerMaintenance::new(catalog, store.clone()),
            ratings: RatingCacheManager::new(provider, store.clone(), clock, rating_keys, &config.ratings),
            store,
        }
    }

    /// Excludes syncs running in other processes that use the same file
    pub fn with_run_lock(mut self, path: PathBuf) -> Self {
        self.scheduler = self.scheduler.with_lock_file(path);
        self
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub async fn reconcile_subject(&self, subject: &str) -> Result<ReconcileOutcome, SyncError> {
        self.scheduler.reconcile_exclusive(subject).await
    }

    pub async fn refresh_libraries(&self, subject: &str) -> Result<Vec<LibrarySnapshotRow>, SyncError> {
        self.snapshots.refresh(subject).await
    }

    pub async fn cached_libraries(&self, subject: &str) -> Result<Vec<LibrarySnapshotRow>, SyncError> {
        Ok(self.store.libraries(subject).await?)
    }

    pub async fn get_shows_progress(&self, subject: &str) -> Result<Vec<ShowProgress>, SyncError> {
        self.progress.shows_progress(subject).await
    }

    pub async fn cleanup_duplicates(&self, subject: &str, dry_run: bool) -> Result<CleanupReport, SyncError> {
        let _token = if dry_run { None } else { Some(self.scheduler.try_acquire()?) };
        self.maintenance.cleanup_duplicates(subject, dry_run).await
    }

    pub async fn validate_remote_ids(&self, subject: &str, fix_stale: bool) -> Result<ValidationReport, SyncError> {
        let _token = if fix_stale { Some(self.scheduler.try_acquire()?) } else { None };
        self.maintenance.validate_remote_ids(subject, fix_stale).await
    }

    /// Subjects never synced report as idle
    pub async fn get_sync_status(&self, subject: &str) -> Result<SyncStatusRecord, SyncError> {
        Ok(self
            .store
            .sync_status(subject)
            .await?
            .unwrap_or_else(|| SyncStatusRecord::idle(subject)))
    }

    pub fn trigger_sync(&self, subject: Option<String>) -> Result<SyncHandle, SyncError> {
        self.scheduler.trigger(subject)
    }

    pub async fn get_rating(&self, request: &RatingRequest) -> Result<RatingBundle, SyncError> {
        self.ratings.get(request).await
    }

    pub async fn search_ratings(&self, query: &str, kind: MediaKind, page: u32) -> Result<ProviderSearchPage, SyncError> {
        self.ratings.search(query, kind, page).await
    }

    pub fn get_provider_status(&self) -> ProviderStatus {
        self.ratings.status()
    }
}
