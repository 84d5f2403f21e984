//! TTL cache in front of the rating provider, spending the provider's keys
//! through a [`KeyPool`].

use chrono::Duration;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};
use watch_sync_config::RatingsConfig;
use watch_sync_models::{ExternalRatings, MediaKind, RatingBundle, RatingCacheRow, RatingOrigin};
use watch_sync_sources::{ProviderError, ProviderSearchPage, RatingProvider};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::key_pool::{KeyOutcome, KeyPool, ProviderStatus};
use crate::store::LedgerStore;

/// What to look up. At least one of `rating_id`, `secondary_id` or `title`
/// must be set.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRequest {
    pub rating_id: Option<String>,
    pub secondary_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub kind: MediaKind,
}

impl RatingRequest {
    pub fn by_id(rating_id: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            rating_id: Some(rating_id.into()),
            secondary_id: None,
            title: None,
            year: None,
            kind,
        }
    }

    pub fn by_title(title: impl Into<String>, year: Option<i32>, kind: MediaKind) -> Self {
        Self {
            rating_id: None,
            secondary_id: None,
            title: Some(title.into()),
            year,
            kind,
        }
    }

    pub fn with_secondary_id(mut self, secondary_id: impl Into<String>) -> Self {
        self.secondary_id = Some(secondary_id.into());
        self
    }
}

enum Lookup {
    ById(String),
    ByTitle(String),
}

pub struct RatingCacheManager {
    provider: Arc<dyn RatingProvider>,
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    // Never held across an await
    pool: Mutex<KeyPool>,
    ttl: Duration,
}

impl RatingCacheManager {
    pub fn new(
        provider: Arc<dyn RatingProvider>,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        keys: Vec<String>,
        config: &RatingsConfig,
    ) -> Self {
        let today = clock.now().date_naive();
        Self {
            pool: Mutex::new(KeyPool::new(keys, config.daily_limit, config.error_limit, today)),
            ttl: Duration::days(i64::from(config.ttl_days)),
            provider,
            store,
            clock,
        }
    }

    fn lock_pool(&self) -> MutexGuard<'_, KeyPool> {
        self.pool.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached ratings if fresh, otherwise fetched, cached and returned
    pub async fn get(&self, request: &RatingRequest) -> Result<RatingBundle, SyncError> {
        let cached = match (&request.rating_id, &request.secondary_id) {
            (Some(rating_id), _) => self.store.rating_row(rating_id).await?,
            (None, Some(secondary_id)) => self.store.rating_row_by_secondary(secondary_id).await?,
            (None, None) => None,
        };

        let now = self.clock.now();
        if let Some(row) = &cached {
            if row.is_fresh(now, self.ttl) {
                debug!(rating_id = %row.rating_id, "Rating cache hit");
                return Ok(RatingBundle {
                    secondary_id: request.secondary_id.clone().or_else(|| row.secondary_id.clone()),
                    ratings: row.ratings.clone(),
                    origin: RatingOrigin::Cache,
                });
            }
            debug!(rating_id = %row.rating_id, updated_at = %row.updated_at, "Cached rating is stale");
        }

        let lookup = match (&request.rating_id, &cached, &request.title) {
            (Some(rating_id), _, _) => Lookup::ById(rating_id.clone()),
            (None, Some(row), _) => Lookup::ById(row.rating_id.clone()),
            (None, None, Some(title)) => Lookup::ByTitle(title.clone()),
            (None, None, None) => {
                return Err(SyncError::InvalidRequest(
                    "a rating lookup needs an id, a cached secondary id or a title".to_string(),
                ))
            }
        };

        let ratings = match lookup {
            Lookup::ById(id) => {
                self.with_rotation(|key| {
                    let provider = self.provider.clone();
                    let id = id.clone();
                    async move { provider.lookup_by_id(&key, &id).await }
                })
                .await?
            }
            Lookup::ByTitle(title) => {
                let (year, kind) = (request.year, request.kind);
                self.with_rotation(|key| {
                    let provider = self.provider.clone();
                    let title = title.clone();
                    async move { provider.lookup_by_title(&key, &title, year, kind).await }
                })
                .await?
            }
        };

        let secondary_id = request
            .secondary_id
            .clone()
            .or_else(|| cached.and_then(|row| row.secondary_id));
        self.save(&ratings, secondary_id.clone()).await;

        Ok(RatingBundle {
            secondary_id,
            ratings,
            origin: RatingOrigin::Fetched,
        })
    }

    /// Rows are keyed by the provider's id; ratings without one are returned
    /// but not cached. A failed write only costs a refetch later.
    async fn save(&self, ratings: &ExternalRatings, secondary_id: Option<String>) {
        let Some(rating_id) = ratings.imdb_id.clone() else {
            return;
        };
        let row = RatingCacheRow {
            rating_id: rating_id.clone(),
            secondary_id,
            ratings: ratings.clone(),
            updated_at: self.clock.now(),
        };
        if let Err(e) = self.store.upsert_rating_row(row).await {
            warn!(rating_id = %rating_id, error = %e, "Failed to cache rating");
        }
    }

    pub async fn search(&self, query: &str, kind: MediaKind, page: u32) -> Result<ProviderSearchPage, SyncError> {
        self.with_rotation(|key| {
            let provider = self.provider.clone();
            let query = query.to_string();
            async move { provider.search(&key, &query, kind, page).await }
        })
        .await
    }

    pub fn status(&self) -> ProviderStatus {
        let today = self.clock.now().date_naive();
        self.lock_pool().status(today)
    }

    /// Runs `request` with the next eligible key. A quota answer exhausts the
    /// key and moves on to the next one; any other answer is final.
    async fn with_rotation<T, F, Fut>(&self, request: F) -> Result<T, SyncError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut quota_error: Option<String> = None;
        loop {
            let today = self.clock.now().date_naive();
            let selected = self.lock_pool().select(today);
            let Some((index, key)) = selected else {
                return Err(match quota_error {
                    Some(message) => SyncError::ProviderQuotaExceeded(message),
                    None => SyncError::NoCapacity,
                });
            };

            let result = request(key).await;
            let today = self.clock.now().date_naive();
            match result {
                Ok(value) => {
                    self.lock_pool().record(index, KeyOutcome::Success, today);
                    return Ok(value);
                }
                Err(ProviderError::QuotaExceeded(message)) => {
                    self.lock_pool().record(index, KeyOutcome::QuotaExceeded, today);
                    info!(key_index = index + 1, "Rating key exhausted, trying the next one");
                    quota_error = Some(message);
                }
                Err(ProviderError::NotFound(message)) => {
                    self.lock_pool().record(index, KeyOutcome::NoMatch, today);
                    return Err(SyncError::ProviderNotFound(message));
                }
                Err(ProviderError::Transient(message)) => {
                    self.lock_pool().record(index, KeyOutcome::Failure, today);
                    warn!(key_index = index + 1, error = %message, "Rating request failed");
                    return Err(SyncError::ProviderUnavailable(message));
                }
            }
        }
    }
}
