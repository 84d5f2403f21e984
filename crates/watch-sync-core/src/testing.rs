//! In-memory collaborators and record builders shared by the unit tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use watch_sync_models::{
    CatalogItem, CatalogLibrary, CatalogUser, ExternalRatings, ItemKind, MediaKind, Provenance, WatchRecord,
};
use watch_sync_sources::{
    CatalogClient, CatalogError, ItemPage, ItemQuery, ProviderError, ProviderSearchPage, ProviderSearchResult,
    RatingProvider,
};

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 20, 0, 0).unwrap()
}

pub fn movie_record(subject: &str, remote_id: &str, title: &str) -> WatchRecord {
    WatchRecord {
        id: None,
        subject: subject.to_string(),
        remote_id: Some(remote_id.to_string()),
        rating_id: None,
        secondary_id: None,
        media_kind: MediaKind::Movie,
        title: title.to_string(),
        year: Some(1995),
        series_id: None,
        series_name: None,
        season_number: None,
        episode_number: None,
        runtime_minutes: 120,
        rating: None,
        genres: Vec::new(),
        poster_tag: None,
        watched: true,
        progress_percent: 100.0,
        play_count: 1,
        watched_at: fixed_time(),
        last_played: None,
        provenance: Provenance::RemoteSync,
        updated_at: fixed_time(),
    }
}

pub fn episode_record(
    subject: &str,
    remote_id: &str,
    series_name: &str,
    series_id: &str,
    season: u32,
    episode: u32,
) -> WatchRecord {
    WatchRecord {
        media_kind: MediaKind::Episode,
        title: format!("{} S{:02}E{:02}", series_name, season, episode),
        year: None,
        series_id: Some(series_id.to_string()),
        series_name: Some(series_name.to_string()),
        season_number: Some(season),
        episode_number: Some(episode),
        runtime_minutes: 45,
        ..movie_record(subject, remote_id, series_name)
    }
}

pub fn played_movie(id: &str, name: &str) -> CatalogItem {
    let mut item = CatalogItem::new(id, name, ItemKind::Movie);
    item.played = true;
    item.play_count = 1;
    item.runtime_ticks = Some(120 * watch_sync_models::TICKS_PER_MINUTE);
    item.last_played = Some("2024-04-01T20:00:00.0000000Z".to_string());
    item.genres = vec!["Drama".to_string()];
    item.rating = Some(7.5);
    item
}

pub fn played_episode(id: &str, series_id: &str, series_name: &str, season: u32, episode: u32) -> CatalogItem {
    let mut item = CatalogItem::new(id, format!("Episode {}", episode), ItemKind::Episode);
    item.played = true;
    item.play_count = 1;
    item.runtime_ticks = Some(45 * watch_sync_models::TICKS_PER_MINUTE);
    item.last_played = Some("2024-04-01T21:00:00.0000000Z".to_string());
    item.series_id = Some(series_id.to_string());
    item.series_name = Some(series_name.to_string());
    item.season_number = Some(season);
    item.episode_number = Some(episode);
    item
}

pub fn season(id: &str, number: u32, name: &str) -> CatalogItem {
    let mut item = CatalogItem::new(id, name, ItemKind::Season);
    item.season_number = Some(number);
    item
}

pub fn catalog_episode(id: &str, season: u32, episode: u32) -> CatalogItem {
    let mut item = CatalogItem::new(id, format!("Episode {}", episode), ItemKind::Episode);
    item.season_number = Some(season);
    item.episode_number = Some(episode);
    item.runtime_ticks = Some(50 * watch_sync_models::TICKS_PER_MINUTE);
    item
}

#[derive(Default)]
struct CatalogState {
    users: Vec<CatalogUser>,
    libraries: HashMap<String, Vec<CatalogLibrary>>,
    library_totals: HashMap<String, u64>,
    played: HashMap<String, Vec<CatalogItem>>,
    resumable: HashMap<String, Vec<CatalogItem>>,
    items: HashMap<String, CatalogItem>,
    seasons: HashMap<String, Vec<CatalogItem>>,
    episodes: HashMap<(String, String), Vec<CatalogItem>>,
    failing_listings: bool,
    failing_items: HashSet<String>,
    failing_subjects: HashSet<String>,
}

/// Scriptable catalog that counts every call it receives
#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<CatalogState>,
    calls: AtomicUsize,
    item_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap()
    }

    pub fn add_user(&self, id: &str, name: &str) {
        self.state().users.push(CatalogUser {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn add_library(&self, subject: &str, library: CatalogLibrary) {
        self.state()
            .libraries
            .entry(subject.to_string())
            .or_default()
            .push(library);
    }

    pub fn set_library_total(&self, library_id: &str, total: u64) {
        self.state().library_totals.insert(library_id.to_string(), total);
    }

    /// Adds or replaces a played item in the subject's history views
    pub fn add_played(&self, subject: &str, item: CatalogItem) {
        let mut state = self.state();
        let played = state.played.entry(subject.to_string()).or_default();
        played.retain(|existing| existing.id != item.id);
        played.push(item);
    }

    pub fn add_resumable(&self, subject: &str, item: CatalogItem) {
        let mut state = self.state();
        let resumable = state.resumable.entry(subject.to_string()).or_default();
        resumable.retain(|existing| existing.id != item.id);
        resumable.push(item);
    }

    /// Detail record returned by `get_item`
    pub fn add_item(&self, item: CatalogItem) {
        self.state().items.insert(item.id.clone(), item);
    }

    pub fn remove_item(&self, id: &str) {
        self.state().items.remove(id);
    }

    pub fn add_season(&self, series_id: &str, season: CatalogItem, episodes: Vec<CatalogItem>) {
        let mut state = self.state();
        state
            .episodes
            .insert((series_id.to_string(), season.id.clone()), episodes);
        state.seasons.entry(series_id.to_string()).or_default().push(season);
    }

    pub fn fail_listings(&self, failing: bool) {
        self.state().failing_listings = failing;
    }

    pub fn fail_item(&self, id: &str) {
        self.state().failing_items.insert(id.to_string());
    }

    pub fn fail_subject(&self, subject: &str) {
        self.state().failing_subjects.insert(subject.to_string());
    }

    /// Makes `list_subjects` wait until the returned handle is notified
    pub fn hold_subject_listing(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn item_call_count(&self) -> usize {
        self.item_calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_listing(&self, subject: &str) -> Result<(), CatalogError> {
        let state = self.state();
        if state.failing_listings || state.failing_subjects.contains(subject) {
            return Err(CatalogError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogClient for FakeCatalog {
    async fn list_subjects(&self) -> Result<Vec<CatalogUser>, CatalogError> {
        self.record_call();
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        Ok(self.state().users.clone())
    }

    async fn list_libraries(&self, subject: &str) -> Result<Vec<CatalogLibrary>, CatalogError> {
        self.record_call();
        self.check_listing(subject)?;
        Ok(self.state().libraries.get(subject).cloned().unwrap_or_default())
    }

    async fn list_items(&self, subject: &str, query: &ItemQuery) -> Result<ItemPage, CatalogError> {
        self.record_call();
        self.check_listing(subject)?;
        let state = self.state();

        if let Some(parent) = &query.parent_id {
            return Ok(ItemPage {
                items: Vec::new(),
                total: state.library_totals.get(parent).copied().unwrap_or(0),
            });
        }

        let matching: Vec<CatalogItem> = state
            .played
            .get(subject)
            .map(|items| {
                items
                    .iter()
                    .filter(|item| query.kinds.is_empty() || query.kinds.contains(&item.kind))
                    .filter(|item| query.is_played.map_or(true, |played| item.played == played))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.start_index as usize)
            .take(query.limit as usize)
            .collect();
        Ok(ItemPage { items, total })
    }

    async fn get_item(&self, _subject: &str, id: &str) -> Result<CatalogItem, CatalogError> {
        self.record_call();
        self.item_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state.failing_items.contains(id) {
            return Err(CatalogError::Http {
                status: 500,
                message: "internal error".to_string(),
            });
        }
        state
            .items
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }

    async fn list_seasons(&self, _subject: &str, series_id: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        self.record_call();
        let state = self.state();
        if state.failing_items.contains(series_id) {
            return Err(CatalogError::Unavailable("timeout".to_string()));
        }
        Ok(state.seasons.get(series_id).cloned().unwrap_or_default())
    }

    async fn list_episodes(
        &self,
        _subject: &str,
        series_id: &str,
        season_id: Option<&str>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        self.record_call();
        let state = self.state();
        let episodes = match season_id {
            Some(season) => state
                .episodes
                .get(&(series_id.to_string(), season.to_string()))
                .cloned()
                .unwrap_or_default(),
            None => state
                .episodes
                .iter()
                .filter(|((series, _), _)| series == series_id)
                .flat_map(|(_, episodes)| episodes.clone())
                .collect(),
        };
        Ok(episodes)
    }

    async fn list_resumable(&self, subject: &str, limit: u32) -> Result<Vec<CatalogItem>, CatalogError> {
        self.record_call();
        self.check_listing(subject)?;
        Ok(self
            .state()
            .resumable
            .get(subject)
            .map(|items| items.iter().take(limit as usize).cloned().collect())
            .unwrap_or_default())
    }
}

/// Rating provider answering from a fixed table.
///
/// Keys listed via `exhaust_key` answer every request with a quota error;
/// `queue_error` makes the next request fail regardless of key.
#[derive(Default)]
pub struct ScriptedProvider {
    by_id: Mutex<HashMap<String, ExternalRatings>>,
    by_title: Mutex<HashMap<String, ExternalRatings>>,
    exhausted_keys: Mutex<HashSet<String>>,
    queued_errors: Mutex<VecDeque<ProviderError>>,
    keys_used: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, ratings: ExternalRatings) {
        if let Some(title) = &ratings.title {
            self.by_title
                .lock()
                .unwrap()
                .insert(title.to_lowercase(), ratings.clone());
        }
        if let Some(id) = &ratings.imdb_id {
            self.by_id.lock().unwrap().insert(id.clone(), ratings);
        }
    }

    pub fn exhaust_key(&self, key: &str) {
        self.exhausted_keys.lock().unwrap().insert(key.to_string());
    }

    pub fn restore_key(&self, key: &str) {
        self.exhausted_keys.lock().unwrap().remove(key);
    }

    pub fn queue_error(&self, error: ProviderError) {
        self.queued_errors.lock().unwrap().push_back(error);
    }

    /// Keys in the order requests were made with them
    pub fn keys_used(&self) -> Vec<String> {
        self.keys_used.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.keys_used.lock().unwrap().len()
    }

    fn begin(&self, api_key: &str) -> Result<(), ProviderError> {
        self.keys_used.lock().unwrap().push(api_key.to_string());
        if let Some(error) = self.queued_errors.lock().unwrap().pop_front() {
            return Err(error);
        }
        if self.exhausted_keys.lock().unwrap().contains(api_key) {
            return Err(ProviderError::QuotaExceeded("Request limit reached!".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RatingProvider for ScriptedProvider {
    async fn lookup_by_id(&self, api_key: &str, id: &str) -> Result<ExternalRatings, ProviderError> {
        self.begin(api_key)?;
        self.by_id
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound("Incorrect IMDb ID.".to_string()))
    }

    async fn lookup_by_title(
        &self,
        api_key: &str,
        title: &str,
        _year: Option<i32>,
        _kind: MediaKind,
    ) -> Result<ExternalRatings, ProviderError> {
        self.begin(api_key)?;
        self.by_title
            .lock()
            .unwrap()
            .get(&title.to_lowercase())
            .cloned()
            .ok_or_else(|| ProviderError::NotFound("Movie not found!".to_string()))
    }

    async fn search(
        &self,
        api_key: &str,
        query: &str,
        _kind: MediaKind,
        _page: u32,
    ) -> Result<ProviderSearchPage, ProviderError> {
        self.begin(api_key)?;
        let query = query.to_lowercase();
        let results: Vec<ProviderSearchResult> = self
            .by_title
            .lock()
            .unwrap()
            .iter()
            .filter(|(title, _)| title.contains(&query))
            .map(|(title, ratings)| ProviderSearchResult {
                title: title.clone(),
                year: ratings.year.map(|y| y.to_string()),
                imdb_id: ratings.imdb_id.clone().unwrap_or_default(),
                kind: "movie".to_string(),
                poster: None,
            })
            .collect();
        Ok(ProviderSearchPage {
            total: results.len() as u64,
            results,
        })
    }
}
