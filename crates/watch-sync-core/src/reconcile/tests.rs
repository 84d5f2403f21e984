use super::*;
use crate::clock::ManualClock;
use crate::store::FileLedgerStore;
use crate::testing::{episode_record, movie_record, played_episode, played_movie, FakeCatalog};
use chrono::TimeZone;
use watch_sync_models::TICKS_PER_MINUTE;

struct Harness {
    catalog: Arc<FakeCatalog>,
    store: Arc<FileLedgerStore>,
    clock: Arc<ManualClock>,
    reconciler: HistoryReconciler,
}

fn harness_with(options: ReconcileOptions) -> Harness {
    let catalog = Arc::new(FakeCatalog::new());
    let store = Arc::new(FileLedgerStore::in_memory());
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()));
    let reconciler = HistoryReconciler::new(catalog.clone(), store.clone(), clock.clone(), options);
    Harness {
        catalog,
        store,
        clock,
        reconciler,
    }
}

fn harness() -> Harness {
    harness_with(ReconcileOptions::default())
}

fn series(id: &str, name: &str) -> CatalogItem {
    let mut series = CatalogItem::new(id, name, ItemKind::Series);
    series.genres = vec!["Drama".to_string(), "Crime".to_string()];
    series.rating = Some(9.5);
    series
}

fn in_progress_movie(id: &str, name: &str, percent: u64) -> CatalogItem {
    let mut item = played_movie(id, name);
    item.played = false;
    item.play_count = 0;
    item.position_ticks = Some(120 * TICKS_PER_MINUTE * percent / 100);
    item
}

#[tokio::test]
async fn test_first_pass_adds_everything() {
    let h = harness();
    h.catalog.add_item(series("bb", "Breaking Bad"));
    h.catalog.add_played("alice", played_movie("m1", "Heat"));
    h.catalog.add_played("alice", played_episode("e1", "bb", "Breaking Bad", 1, 1));
    h.catalog.add_played("alice", played_episode("e2", "bb", "Breaking Bad", 1, 2));

    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.added, 3);
    assert_eq!(outcome.updated, 0);

    let episode = h.store.find_by_remote_id("alice", "e1").await.unwrap().unwrap();
    assert_eq!(episode.media_kind, MediaKind::Episode);
    assert_eq!(episode.provenance, Provenance::RemoteSync);
    assert_eq!(episode.progress_percent, 100.0);
    assert_eq!(episode.runtime_minutes, 45);
    assert_eq!(episode.genres, vec!["Drama".to_string(), "Crime".to_string()]);
    assert_eq!(episode.rating, Some(9.5));
    assert_eq!(episode.watched_at, Utc.with_ymd_and_hms(2024, 4, 1, 21, 0, 0).unwrap());
}

#[tokio::test]
async fn test_second_pass_without_remote_change_is_a_no_op() {
    let h = harness();
    h.catalog.add_item(series("bb", "Breaking Bad"));
    h.catalog.add_played("alice", played_movie("m1", "Heat"));
    h.catalog.add_played("alice", played_episode("e1", "bb", "Breaking Bad", 1, 1));
    h.catalog.add_resumable("alice", in_progress_movie("m2", "Ronin", 30));

    let mut no_timestamp = played_movie("m3", "Collateral");
    no_timestamp.last_played = None;
    no_timestamp.play_count = 0;
    h.catalog.add_played("alice", no_timestamp);

    let first = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(first.added, 4);

    h.clock.advance(chrono::Duration::hours(6));
    let second = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(second.added, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.unchanged, 4);
}

#[tokio::test]
async fn test_missing_timestamp_falls_back_to_now() {
    let h = harness();
    let mut item = played_movie("m1", "Heat");
    item.last_played = Some("not a date".to_string());
    h.catalog.add_played("alice", item);

    h.reconciler.reconcile("alice").await.unwrap();
    let record = h.store.find_by_remote_id("alice", "m1").await.unwrap().unwrap();
    assert_eq!(record.watched_at, h.clock.now());
    assert_eq!(record.play_count, 1);
}

#[tokio::test]
async fn test_progress_update_keeps_remote_provenance() {
    let h = harness();
    h.catalog.add_resumable("alice", in_progress_movie("m1", "Heat", 40));
    h.reconciler.reconcile("alice").await.unwrap();

    let record = h.store.find_by_remote_id("alice", "m1").await.unwrap().unwrap();
    assert!((record.progress_percent - 40.0).abs() < 0.01);
    assert!(!record.watched);

    h.catalog.add_resumable("alice", in_progress_movie("m1", "Heat", 85));
    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.updated, 1);

    let record = h.store.find_by_remote_id("alice", "m1").await.unwrap().unwrap();
    assert!((record.progress_percent - 85.0).abs() < 0.01);
    assert_eq!(record.provenance, Provenance::RemoteSync);
    assert_eq!(record.updated_at, h.clock.now());
}

#[tokio::test]
async fn test_manual_record_is_never_touched() {
    let h = harness();
    let mut manual = movie_record("alice", "m1", "Heat (my notes)");
    manual.provenance = Provenance::Manual;
    manual.progress_percent = 10.0;
    manual.watched = false;
    let mut tx = LedgerTransaction::new();
    tx.insert(manual);
    h.store.commit(tx).await.unwrap();

    h.catalog.add_played("alice", played_movie("m1", "Heat"));
    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.updated, 0);

    let record = h.store.find_by_remote_id("alice", "m1").await.unwrap().unwrap();
    assert_eq!(record.title, "Heat (my notes)");
    assert_eq!(record.progress_percent, 10.0);
    assert!(!record.watched);
    assert_eq!(record.provenance, Provenance::Manual);
}

#[tokio::test]
async fn test_resume_view_overrides_completed_view() {
    let h = harness();
    h.catalog.add_played("alice", played_movie("m1", "Heat"));
    // Rewatch in progress: the resume view carries the fresher position
    let mut rewatch = played_movie("m1", "Heat");
    rewatch.position_ticks = Some(60 * TICKS_PER_MINUTE);
    h.catalog.add_resumable("alice", rewatch);

    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.added, 1);

    let record = h.store.find_by_remote_id("alice", "m1").await.unwrap().unwrap();
    assert!((record.progress_percent - 50.0).abs() < 0.01);
    assert!(record.watched);
}

#[tokio::test]
async fn test_pagination_follows_short_page_and_cap() {
    let h = harness_with(ReconcileOptions {
        page_size: 2,
        max_pages: 10,
        resume_limit: 10,
    });
    for i in 0..5 {
        h.catalog.add_played("alice", played_movie(&format!("m{}", i), &format!("Movie {}", i)));
    }
    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.added, 5);

    let capped = harness_with(ReconcileOptions {
        page_size: 2,
        max_pages: 2,
        resume_limit: 10,
    });
    for i in 0..5 {
        capped
            .catalog
            .add_played("alice", played_movie(&format!("m{}", i), &format!("Movie {}", i)));
    }
    let outcome = capped.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.added, 4);
}

#[tokio::test]
async fn test_page_failure_aborts_without_writing() {
    let h = harness();
    h.catalog.add_played("alice", played_movie("m1", "Heat"));
    h.reconciler.reconcile("alice").await.unwrap();

    h.catalog.add_played("alice", played_movie("m2", "Ronin"));
    h.catalog.fail_listings(true);
    let result = h.reconciler.reconcile("alice").await;
    assert!(matches!(result, Err(SyncError::RemoteUnavailable(_))));

    let records = h.store.records_for_subject("alice").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].remote_id.as_deref(), Some("m1"));
}

#[tokio::test]
async fn test_series_details_fetched_once_per_pass() {
    let h = harness();
    h.catalog.add_item(series("bb", "Breaking Bad"));
    for episode in 1..=3 {
        h.catalog
            .add_played("alice", played_episode(&format!("e{}", episode), "bb", "Breaking Bad", 1, episode));
    }

    h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(h.catalog.item_call_count(), 1);

    // A fresh pass has a fresh memo, but enriched records need no lookups
    h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(h.catalog.item_call_count(), 1);
}

#[tokio::test]
async fn test_enrichment_failure_degrades_but_keeps_record() {
    let h = harness();
    h.catalog.fail_item("bb");
    h.catalog.add_played("alice", played_episode("e1", "bb", "Breaking Bad", 1, 1));
    h.catalog.add_played("alice", played_episode("e2", "bb", "Breaking Bad", 1, 2));

    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.added, 2);
    assert_eq!(outcome.degraded, 2);
    // The failed lookup is remembered for the rest of the pass
    assert_eq!(h.catalog.item_call_count(), 1);

    let record = h.store.find_by_remote_id("alice", "e1").await.unwrap().unwrap();
    assert!(record.genres.is_empty());
    assert_eq!(record.rating, None);
}

#[tokio::test]
async fn test_movie_detail_fills_missing_fields() {
    let h = harness();
    let mut bare = played_movie("m1", "Heat");
    bare.genres.clear();
    bare.rating = None;
    h.catalog.add_played("alice", bare);

    let mut detail = played_movie("m1", "Heat");
    detail.genres = vec!["Crime".to_string()];
    detail.rating = Some(8.3);
    detail.poster_tag = Some("poster-1".to_string());
    detail
        .provider_ids
        .insert("Imdb".to_string(), "tt0113277".to_string());
    h.catalog.add_item(detail);

    h.reconciler.reconcile("alice").await.unwrap();
    let record = h.store.find_by_remote_id("alice", "m1").await.unwrap().unwrap();
    assert_eq!(record.genres, vec!["Crime".to_string()]);
    assert_eq!(record.rating, Some(8.3));
    assert_eq!(record.poster_tag.as_deref(), Some("poster-1"));
    assert_eq!(record.rating_id.as_deref(), Some("tt0113277"));
}

#[tokio::test]
async fn test_stale_record_is_reattached_instead_of_duplicated() {
    let h = harness();
    let mut stale = episode_record("alice", "old-e1", "Breaking Bad", "old-bb", 1, 1);
    stale.genres = vec!["Drama".to_string()];
    stale.rating = Some(9.5);
    stale.play_count = 3;
    let mut tx = LedgerTransaction::new();
    tx.insert(stale);
    h.store.commit(tx).await.unwrap();
    let id = h.store.find_by_remote_id("alice", "old-e1").await.unwrap().unwrap().id.unwrap();
    let mut tx = LedgerTransaction::new();
    tx.clear_remote_ids(id);
    h.store.commit(tx).await.unwrap();

    h.catalog.add_item(series("new-bb", "Breaking Bad"));
    h.catalog.add_played("alice", played_episode("new-e1", "new-bb", "breaking bad ", 1, 1));

    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.updated, 1);
    assert_eq!(outcome.reattached, 1);

    let records = h.store.records_for_subject("alice").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, Some(id));
    assert_eq!(records[0].remote_id.as_deref(), Some("new-e1"));
    assert_eq!(records[0].series_id.as_deref(), Some("new-bb"));
    assert_eq!(records[0].play_count, 3);

    let again = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(again.updated, 0);
    assert_eq!(again.reattached, 0);
}

#[tokio::test]
async fn test_rekeyed_episode_in_same_series_moves_record() {
    let h = harness();
    let mut tx = LedgerTransaction::new();
    let mut old = episode_record("alice", "e1", "Dark", "dark", 1, 1);
    old.genres = vec!["Mystery".to_string()];
    old.rating = Some(8.7);
    tx.insert(old);
    h.store.commit(tx).await.unwrap();

    // The catalog re-created the episode under a new item id
    h.catalog.add_played("alice", played_episode("e1-v2", "dark", "Dark", 1, 1));
    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome.added, 0);
    assert_eq!(outcome.reattached, 1);

    assert!(h.store.find_by_remote_id("alice", "e1").await.unwrap().is_none());
    assert!(h.store.find_by_remote_id("alice", "e1-v2").await.unwrap().is_some());
}

#[tokio::test]
async fn test_non_video_resume_items_are_ignored() {
    let h = harness();
    let mut track = CatalogItem::new("a1", "Song", ItemKind::Other("Audio".to_string()));
    track.position_ticks = Some(10);
    h.catalog.add_resumable("alice", track);

    let outcome = h.reconciler.reconcile("alice").await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::default());
    assert!(h.store.records_for_subject("alice").await.unwrap().is_empty());
}

#[test]
fn test_progress_percent_rules() {
    let mut item = played_movie("m1", "Heat");
    assert_eq!(progress_percent(&item), 100.0);

    item.position_ticks = Some(30 * TICKS_PER_MINUTE);
    assert!((progress_percent(&item) - 25.0).abs() < 1e-9);

    item.runtime_ticks = None;
    assert_eq!(progress_percent(&item), 100.0);

    item.played = false;
    assert_eq!(progress_percent(&item), 0.0);
}

#[test]
fn test_parse_played_at_formats() {
    let expected = Utc.with_ymd_and_hms(2024, 3, 1, 20, 15, 0).unwrap();
    assert_eq!(parse_played_at("2024-03-01T20:15:00.0000000Z"), Some(expected));
    assert_eq!(parse_played_at("2024-03-01T20:15:00Z"), Some(expected));
    assert_eq!(parse_played_at("2024-03-01T20:15:00"), Some(expected));
    assert_eq!(parse_played_at("yesterday"), None);
}
