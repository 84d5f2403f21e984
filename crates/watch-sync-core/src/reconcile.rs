//! One reconciliation pass: pull a subject's playback state from the catalog
//! and fold it into the ledger as a single transaction.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use watch_sync_config::SyncConfig;
use watch_sync_models::{CatalogItem, ItemKind, MediaKind, Provenance, RecordId, WatchRecord};
use watch_sync_sources::{CatalogClient, CatalogError, ItemQuery};

use crate::clock::Clock;
use crate::error::SyncError;
use crate::merge::{merge_record, RemoteFacts};
use crate::store::{LedgerStore, LedgerTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub page_size: u32,
    pub max_pages: u32,
    pub resume_limit: u32,
}

impl From<&SyncConfig> for ReconcileOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            page_size: config.page_size,
            max_pages: config.max_pages,
            resume_limit: config.resume_limit,
        }
    }
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub added: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Items whose record belongs to the user (manual or imported)
    pub skipped: usize,
    /// Items stored without the enrichment that failed for them
    pub degraded: usize,
    /// Stale records picked up again under a new remote id
    pub reattached: usize,
}

/// Series details fetched during one pass, so each series is asked for once.
/// Failed lookups are remembered too and fail again without a request.
#[derive(Default)]
pub(crate) struct SeriesMemo {
    entries: HashMap<String, Result<CatalogItem, CatalogError>>,
}

impl SeriesMemo {
    async fn get(
        &mut self,
        catalog: &dyn CatalogClient,
        subject: &str,
        series_id: &str,
    ) -> Result<&CatalogItem, CatalogError> {
        if !self.entries.contains_key(series_id) {
            let fetched = catalog.get_item(subject, series_id).await;
            self.entries.insert(series_id.to_string(), fetched);
        }
        self.entries
            .get(series_id)
            .ok_or_else(|| CatalogError::NotFound(series_id.to_string()))?
            .as_ref()
            .map_err(Clone::clone)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Stale records (remote id cleared) that a new remote item may take over
struct StaleRecords {
    episodes: HashMap<(String, u32, u32), WatchRecord>,
    movies: HashMap<String, WatchRecord>,
}

impl StaleRecords {
    fn from_records(records: Vec<WatchRecord>) -> Self {
        let mut episodes = HashMap::new();
        let mut movies = HashMap::new();
        for record in records {
            if record.remote_id.is_some() || !record.provenance.is_reconciled() {
                continue;
            }
            match record.media_kind {
                MediaKind::Episode => {
                    if let (Some(name), Some(season), Some(episode)) =
                        (record.normalized_series_name(), record.season_number, record.episode_number)
                    {
                        episodes.entry((name, season, episode)).or_insert(record);
                    }
                }
                MediaKind::Movie => {
                    if let Some(rating_id) = record.rating_id.clone() {
                        movies.entry(rating_id).or_insert(record);
                    }
                }
            }
        }
        Self { episodes, movies }
    }

    fn take_for(&mut self, item: &CatalogItem, kind: MediaKind) -> Option<WatchRecord> {
        match kind {
            MediaKind::Episode => {
                let name = item.series_name.as_deref()?.trim().to_lowercase();
                self.episodes
                    .remove(&(name, item.season_number?, item.episode_number?))
            }
            MediaKind::Movie => self.movies.remove(item.imdb_id()?),
        }
    }
}

fn media_kind(kind: &ItemKind) -> Option<MediaKind> {
    match kind {
        ItemKind::Movie => Some(MediaKind::Movie),
        ItemKind::Episode => Some(MediaKind::Episode),
        _ => None,
    }
}

/// Percent watched: position over runtime when both are known, else 100 for
/// a played item, else 0
pub fn progress_percent(item: &CatalogItem) -> f64 {
    match (item.position_ticks, item.runtime_ticks) {
        (Some(position), Some(runtime)) if position > 0 && runtime > 0 => {
            (position as f64 / runtime as f64 * 100.0).min(100.0)
        }
        _ if item.played => 100.0,
        _ => 0.0,
    }
}

/// Parses the catalog's last-played timestamp. Fractional seconds may carry
/// seven digits and the offset may be missing.
pub fn parse_played_at(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Some(at.with_timezone(&Utc));
    }
    let trimmed = value.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn facts_from(item: &CatalogItem) -> RemoteFacts {
    RemoteFacts {
        progress_percent: progress_percent(item),
        watched: item.played,
        play_count: item.play_count,
        watched_at: item.last_played.as_deref().and_then(parse_played_at),
        last_played: item.last_played.clone(),
        runtime_minutes: item.runtime_minutes(),
        poster_tag: item.poster_tag.clone(),
        rating: item.rating,
        genres: item.genres.clone(),
        secondary_id: item.tmdb_id().map(str::to_string),
        rating_id: item.imdb_id().map(str::to_string),
    }
}

fn new_record(subject: &str, item: &CatalogItem, kind: MediaKind, facts: RemoteFacts, now: DateTime<Utc>) -> WatchRecord {
    WatchRecord {
        id: None,
        subject: subject.to_string(),
        remote_id: Some(item.id.clone()),
        rating_id: facts.rating_id,
        secondary_id: facts.secondary_id,
        media_kind: kind,
        title: item.name.clone(),
        year: item.year,
        series_id: item.series_id.clone(),
        series_name: item.series_name.clone(),
        season_number: item.season_number,
        episode_number: item.episode_number,
        runtime_minutes: facts.runtime_minutes,
        rating: facts.rating,
        genres: facts.genres,
        poster_tag: facts.poster_tag,
        watched: facts.watched,
        progress_percent: facts.progress_percent,
        play_count: facts.play_count.max(1),
        watched_at: facts.watched_at.unwrap_or(now),
        last_played: facts.last_played,
        provenance: Provenance::RemoteSync,
        updated_at: now,
    }
}

fn lacks_enrichment(genres: &[String], rating: Option<f64>) -> bool {
    genres.is_empty() || rating.is_none()
}

pub struct HistoryReconciler {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn LedgerStore>,
    clock: Arc<dyn Clock>,
    options: ReconcileOptions,
}

impl HistoryReconciler {
    pub fn new(
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
        options: ReconcileOptions,
    ) -> Self {
        Self {
            catalog,
            store,
            clock,
            options,
        }
    }

    /// Runs one pass for `subject`.
    ///
    /// All remote views are fetched before anything is written, and every
    /// write of the pass goes into one transaction. A failed page fetch or a
    /// failed commit leaves the ledger untouched.
    pub async fn reconcile(&self, subject: &str) -> Result<ReconcileOutcome, SyncError> {
        let start = std::time::Instant::now();
        info!(operation = "reconcile", subject = %subject, "Starting reconciliation pass");

        let items = self.fetch_merged(subject).await?;
        let merged_ids: HashSet<&str> = items.iter().map(|item| item.id.as_str()).collect();

        let mut memo = SeriesMemo::default();
        let mut stale: Option<StaleRecords> = None;
        let mut claimed: HashSet<RecordId> = HashSet::new();
        let mut transaction = LedgerTransaction::new();
        let mut outcome = ReconcileOutcome::default();
        let now = self.clock.now();

        for item in &items {
            let Some(kind) = media_kind(&item.kind) else {
                debug!(item_id = %item.id, kind = item.kind.as_catalog(), "Skipping non-video item");
                continue;
            };

            let mut existing = self.store.find_by_remote_id(subject, &item.id).await?;
            let mut reattached = false;

            if existing.is_none() {
                existing = self.rekeyed_record(subject, item, &merged_ids, &claimed).await?;
                if existing.is_none() {
                    if stale.is_none() {
                        stale = Some(StaleRecords::from_records(
                            self.store.records_for_subject(subject).await?,
                        ));
                    }
                    existing = stale.as_mut().and_then(|s| s.take_for(item, kind));
                }
                reattached = existing.is_some();
            }

            if let Some(record) = &existing {
                if !record.provenance.is_reconciled() {
                    debug!(
                        item_id = %item.id,
                        provenance = %record.provenance,
                        "Leaving user-owned record untouched"
                    );
                    outcome.skipped += 1;
                    continue;
                }
            }

            let mut enriched = item.clone();
            let needs_enrichment = lacks_enrichment(&item.genres, item.rating)
                && existing
                    .as_ref()
                    .map_or(true, |record| lacks_enrichment(&record.genres, record.rating));
            if needs_enrichment && !self.enrich(subject, &mut enriched, kind, &mut memo).await {
                outcome.degraded += 1;
            }
            let facts = facts_from(&enriched);

            match existing {
                Some(mut record) => {
                    if let Some(id) = record.id {
                        claimed.insert(id);
                    }
                    let changed = merge_record(&mut record, &facts);
                    if reattached {
                        debug!(
                            item_id = %item.id,
                            previous = record.remote_id.as_deref().unwrap_or("none"),
                            "Re-attaching record to new remote id"
                        );
                        record.remote_id = Some(item.id.clone());
                        record.series_id = item.series_id.clone();
                        outcome.reattached += 1;
                    }
                    if changed.is_empty() && !reattached {
                        outcome.unchanged += 1;
                    } else {
                        debug!(item_id = %item.id, fields = ?changed, "Updating record");
                        record.updated_at = now;
                        transaction.update(record);
                        outcome.updated += 1;
                    }
                }
                None => {
                    transaction.insert(new_record(subject, item, kind, facts, now));
                    outcome.added += 1;
                }
            }
        }

        let writes = transaction.len();
        self.store.commit(transaction).await?;

        info!(
            operation = "reconcile",
            subject = %subject,
            items = items.len(),
            added = outcome.added,
            updated = outcome.updated,
            unchanged = outcome.unchanged,
            skipped = outcome.skipped,
            degraded = outcome.degraded,
            reattached = outcome.reattached,
            series_lookups = memo.len(),
            writes,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Reconciliation pass committed"
        );
        Ok(outcome)
    }

    /// Completed movies, completed episodes, then in-progress items, merged by
    /// remote id. A later view replaces an earlier entry for the same id but
    /// keeps its position.
    async fn fetch_merged(&self, subject: &str) -> Result<Vec<CatalogItem>, SyncError> {
        let movies = self.fetch_view(subject, ItemKind::Movie).await?;
        let episodes = self.fetch_view(subject, ItemKind::Episode).await?;
        let resumable = self
            .catalog
            .list_resumable(subject, self.options.resume_limit)
            .await
            .map_err(SyncError::RemoteUnavailable)?;

        let mut merged: Vec<CatalogItem> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for item in movies.into_iter().chain(episodes).chain(resumable) {
            match positions.get(&item.id) {
                Some(&index) => merged[index] = item,
                None => {
                    positions.insert(item.id.clone(), merged.len());
                    merged.push(item);
                }
            }
        }

        debug!(subject = %subject, items = merged.len(), "Fetched remote history");
        Ok(merged)
    }

    /// Pages through one played view until a short page or the page cap
    async fn fetch_view(&self, subject: &str, kind: ItemKind) -> Result<Vec<CatalogItem>, SyncError> {
        let page_size = self.options.page_size.max(1);
        let mut items = Vec::new();

        for page in 0..self.options.max_pages {
            let query = ItemQuery::played(kind.clone()).page(page * page_size, page_size);
            let result = self
                .catalog
                .list_items(subject, &query)
                .await
                .map_err(SyncError::RemoteUnavailable)?;

            let received = result.items.len();
            items.extend(result.items);
            if received < page_size as usize {
                return Ok(items);
            }
        }

        warn!(
            subject = %subject,
            kind = kind.as_catalog(),
            max_pages = self.options.max_pages,
            fetched = items.len(),
            "Page cap reached, remaining history not fetched"
        );
        Ok(items)
    }

    /// A record for the same episode of the same series whose remote id the
    /// catalog no longer lists, e.g. after the file was replaced
    async fn rekeyed_record(
        &self,
        subject: &str,
        item: &CatalogItem,
        merged_ids: &HashSet<&str>,
        claimed: &HashSet<RecordId>,
    ) -> Result<Option<WatchRecord>, SyncError> {
        let (Some(series_id), Some(season), Some(episode)) =
            (item.series_id.as_deref(), item.season_number, item.episode_number)
        else {
            return Ok(None);
        };

        let candidates = self
            .store
            .find_by_episode_key(subject, series_id, season, episode)
            .await?;
        Ok(candidates.into_iter().find(|record| {
            record.provenance.is_reconciled()
                && record.id.map_or(false, |id| !claimed.contains(&id))
                && record
                    .remote_id
                    .as_deref()
                    .map_or(true, |remote| !merged_ids.contains(remote))
        }))
    }

    /// Fills missing genres and rating from the series (episodes) or the
    /// item's own detail record (movies). Returns false if the lookup failed.
    async fn enrich(&self, subject: &str, item: &mut CatalogItem, kind: MediaKind, memo: &mut SeriesMemo) -> bool {
        let source = match kind {
            MediaKind::Episode => {
                let Some(series_id) = item.series_id.clone() else {
                    return true;
                };
                match memo.get(self.catalog.as_ref(), subject, &series_id).await {
                    Ok(series) => Some(series.clone()),
                    Err(e) => {
                        let error = SyncError::RemoteItem { id: series_id, source: e };
                        warn!(item_id = %item.id, error = %error, "Series lookup failed, storing episode without it");
                        return false;
                    }
                }
            }
            MediaKind::Movie => match self.catalog.get_item(subject, &item.id).await {
                Ok(detail) => Some(detail),
                Err(e) => {
                    let error = SyncError::RemoteItem { id: item.id.clone(), source: e };
                    warn!(item_id = %item.id, error = %error, "Detail lookup failed, storing movie without it");
                    return false;
                }
            },
        };

        if let Some(source) = source {
            if item.genres.is_empty() {
                item.genres = source.genres.clone();
            }
            if item.rating.is_none() {
                item.rating = source.rating;
            }
            if kind == MediaKind::Movie {
                if item.poster_tag.is_none() {
                    item.poster_tag = source.poster_tag.clone();
                }
                for (provider, id) in &source.provider_ids {
                    item.provider_ids.entry(provider.clone()).or_insert_with(|| id.clone());
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests;
