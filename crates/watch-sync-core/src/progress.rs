//! Per-series completion computed from the ledger and the catalog's episode
//! lists.
//!
//! Records are grouped by normalized series name rather than by series id, so
//! a series the catalog re-created under a new id still counts as one show.
//! Two different series sharing a name are merged as well; see DESIGN.md.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use watch_sync_models::{
    percent, CatalogItem, MediaKind, NextEpisode, SeasonProgress, ShowProgress, WatchRecord,
};
use watch_sync_sources::{CatalogClient, CatalogError};

use crate::error::SyncError;
use crate::store::LedgerStore;

const SPECIALS_PREFIX: &str = "Specials";

/// Episode records of one normalized series name
#[derive(Debug, Clone)]
pub(crate) struct SeriesGroup {
    pub display_name: String,
    pub records: Vec<WatchRecord>,
}

impl SeriesGroup {
    /// Series ids in the group, most recently watched first
    pub fn series_ids(&self) -> Vec<String> {
        let mut latest: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for record in &self.records {
            if let Some(series_id) = &record.series_id {
                let entry = latest.entry(series_id.clone()).or_insert(record.watched_at);
                if record.watched_at > *entry {
                    *entry = record.watched_at;
                }
            }
        }
        let mut ids: Vec<(String, DateTime<Utc>)> = latest.into_iter().collect();
        ids.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ids.into_iter().map(|(id, _)| id).collect()
    }

    /// The id of the most recently watched record that still has one
    pub fn primary_series_id(&self) -> Option<String> {
        self.series_ids().into_iter().next()
    }

    /// Distinct (season, episode) pairs, whichever series id they were
    /// recorded under
    pub fn watched_episodes(&self) -> BTreeSet<(u32, u32)> {
        self.records
            .iter()
            .filter_map(|record| Some((record.season_number?, record.episode_number?)))
            .collect()
    }

    pub fn last_watched(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|record| record.watched_at).max()
    }
}

/// Groups a subject's episode records by normalized series name
pub(crate) fn group_by_series(records: Vec<WatchRecord>) -> BTreeMap<String, SeriesGroup> {
    let mut groups: BTreeMap<String, SeriesGroup> = BTreeMap::new();
    for record in records {
        if record.media_kind != MediaKind::Episode {
            continue;
        }
        let Some(key) = record.normalized_series_name() else {
            continue;
        };
        let display_name = record
            .series_name
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        groups
            .entry(key)
            .or_insert_with(|| SeriesGroup {
                display_name,
                records: Vec::new(),
            })
            .records
            .push(record);
    }
    groups
}

fn is_specials(season: &CatalogItem) -> bool {
    season.name.starts_with(SPECIALS_PREFIX)
}

/// A season with its episodes in airing order
struct SeasonListing {
    season: CatalogItem,
    number: u32,
    episodes: Vec<CatalogItem>,
}

impl SeasonListing {
    fn episode_key(&self, episode: &CatalogItem) -> (u32, u32) {
        (
            episode.season_number.unwrap_or(self.number),
            episode.episode_number.unwrap_or(0),
        )
    }

    /// Listed episodes found in `watched`. Specials and episodes the catalog
    /// no longer lists never count.
    fn watched_count(&self, watched: &BTreeSet<(u32, u32)>) -> u32 {
        let listed: BTreeSet<(u32, u32)> = self.episodes.iter().map(|e| self.episode_key(e)).collect();
        listed.intersection(watched).count() as u32
    }
}

pub struct ProgressAggregator {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn LedgerStore>,
}

impl ProgressAggregator {
    pub fn new(catalog: Arc<dyn CatalogClient>, store: Arc<dyn LedgerStore>) -> Self {
        Self { catalog, store }
    }

    /// Progress for every series the subject has watched, most recently
    /// watched first. Shows whose episode list cannot be loaded are left out.
    pub async fn shows_progress(&self, subject: &str) -> Result<Vec<ShowProgress>, SyncError> {
        let records = self.store.records_for_subject(subject).await?;
        let groups = group_by_series(records);

        let candidates: Vec<(SeriesGroup, String)> = groups
            .into_iter()
            .filter_map(|(key, group)| match group.primary_series_id() {
                Some(primary) => Some((group, primary)),
                None => {
                    debug!(series = %key, "No live series id left, skipping");
                    None
                }
            })
            .collect();

        let results = join_all(
            candidates
                .iter()
                .map(|(group, primary)| self.show_progress(subject, group, primary)),
        )
        .await;

        let mut shows = Vec::with_capacity(candidates.len());
        for ((group, primary), result) in candidates.iter().zip(results) {
            match result {
                Ok(show) => shows.push(show),
                Err(e) => warn!(
                    subject = %subject,
                    series = %group.display_name,
                    series_id = %primary,
                    error = %e,
                    "Could not load episode list, skipping show"
                ),
            }
        }

        shows.sort_by(|a, b| b.last_watched.cmp(&a.last_watched));
        info!(operation = "shows_progress", subject = %subject, shows = shows.len(), "Computed show progress");
        Ok(shows)
    }

    async fn seasons(&self, subject: &str, series_id: &str) -> Result<Vec<SeasonListing>, CatalogError> {
        let mut listings = Vec::new();
        for season in self.catalog.list_seasons(subject, series_id).await? {
            if is_specials(&season) {
                continue;
            }
            let mut episodes = self
                .catalog
                .list_episodes(subject, series_id, Some(&season.id))
                .await?;
            episodes.sort_by_key(|episode| episode.episode_number.unwrap_or(u32::MAX));
            listings.push(SeasonListing {
                number: season.season_number.unwrap_or(0),
                season,
                episodes,
            });
        }
        listings.sort_by_key(|listing| listing.number);
        Ok(listings)
    }

    async fn show_progress(
        &self,
        subject: &str,
        group: &SeriesGroup,
        primary: &str,
    ) -> Result<ShowProgress, CatalogError> {
        let listings = self.seasons(subject, primary).await?;
        let watched = group.watched_episodes();

        let mut seasons = Vec::with_capacity(listings.len());
        let mut total: u32 = 0;
        let mut watched_count: u32 = 0;
        let mut next_episode = None;

        for listing in &listings {
            let season_total = listing.episodes.len() as u32;
            let season_watched = listing.watched_count(&watched).min(season_total);
            total += season_total;
            watched_count += season_watched;

            seasons.push(SeasonProgress {
                season_id: listing.season.id.clone(),
                season_number: listing.number,
                name: listing.season.name.clone(),
                total_episodes: season_total,
                watched_episodes: season_watched,
                progress: percent(season_watched, season_total),
            });

            if next_episode.is_none() {
                next_episode = listing
                    .episodes
                    .iter()
                    .find(|episode| !watched.contains(&listing.episode_key(episode)))
                    .map(|episode| NextEpisode {
                        episode_id: episode.id.clone(),
                        season_number: episode.season_number.unwrap_or(listing.number),
                        episode_number: episode.episode_number.unwrap_or(0),
                        name: episode.name.clone(),
                        runtime_minutes: episode.runtime_minutes(),
                    });
            }
        }

        // Series details only add the secondary id; a failed lookup costs
        // nothing else
        let secondary_id = match self.catalog.get_item(subject, primary).await {
            Ok(series) => series.tmdb_id().map(str::to_string),
            Err(e) => {
                debug!(series_id = %primary, error = %e, "Series details unavailable");
                None
            }
        };

        Ok(ShowProgress {
            series_name: group.display_name.clone(),
            primary_series_id: primary.to_string(),
            series_ids: group.series_ids(),
            total_episodes: total,
            watched_episodes: watched_count,
            progress: percent(watched_count, total),
            last_watched: group.last_watched(),
            seasons,
            next_episode,
            secondary_id,
        })
    }
}
