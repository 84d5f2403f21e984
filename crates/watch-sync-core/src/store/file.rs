use async_trait::async_trait;
use bincode::{deserialize, serialize};
use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};
use watch_sync_models::{LibrarySnapshotRow, RatingCacheRow, SyncStatusRecord, WatchRecord};

use super::tables::LedgerTables;
use super::lock::FileLock;
use super::{LedgerOp, LedgerStore, LedgerTransaction, RecordFilter};
use crate::error::StoreError;

/// Identity of the snapshot file on disk, used to notice writes made by other
/// processes. Every save renames a fresh file into place, so the inode alone
/// changes on each write where the platform has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
    inode: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Result<Option<Self>, StoreError> {
        match std::fs::metadata(path) {
            Ok(meta) => Ok(Some(Self {
                modified: meta.modified()?,
                len: meta.len(),
                inode: inode(&meta),
            })),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn inode(meta: &std::fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &std::fs::Metadata) -> u64 {
    0
}

#[derive(Default)]
struct LedgerState {
    tables: LedgerTables,
    /// Stamp of the snapshot `tables` was loaded from or last written to
    stamp: Option<FileStamp>,
}

/// Ledger kept in memory and persisted as a gzip'd bincode snapshot after
/// every write.
///
/// Writes are staged on a copy of the tables; the copy only replaces the live
/// state once every op applied and the snapshot reached disk. A failed write
/// therefore leaves both memory and disk as they were.
///
/// Several processes may open the same snapshot. Every write holds an
/// exclusive lock on `<snapshot>.lock` and first reloads the snapshot if
/// another process replaced it; reads pick up such changes as well.
pub struct FileLedgerStore {
    path: Option<PathBuf>,
    state: RwLock<LedgerState>,
}

impl FileLedgerStore {
    /// Opens the snapshot at `path`, starting empty if there is none yet
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let stamp = FileStamp::of(path)?;
        let tables = Self::load(path)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            state: RwLock::new(LedgerState { tables, stamp }),
        })
    }

    /// A store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(LedgerState::default()),
        }
    }

    fn lock_path(path: &Path) -> PathBuf {
        path.with_extension("lock")
    }

    fn load(path: &Path) -> Result<LedgerTables, StoreError> {
        if !path.exists() {
            debug!(path = %path.display(), "Ledger file does not exist, starting empty");
            return Ok(LedgerTables::default());
        }

        let start = std::time::Instant::now();
        let data = std::fs::read(path)?;
        let mut decoder = GzDecoder::new(&data[..]);
        let mut decoded = Vec::new();
        decoder.read_to_end(&mut decoded)?;

        let mut tables: LedgerTables = match deserialize(&decoded) {
            Ok(tables) => tables,
            Err(e) => {
                // Incompatible snapshot: keep a copy and start over rather
                // than refusing to run
                let backup_path = path.with_extension("bin.bak");
                std::fs::copy(path, &backup_path)?;
                warn!(
                    error = %e,
                    backup = %backup_path.display(),
                    "Ledger snapshot format incompatible, starting empty"
                );
                return Ok(LedgerTables::default());
            }
        };
        tables.rebuild_indexes();

        info!(
            path = %path.display(),
            records = tables.record_count(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Loaded ledger"
        );
        Ok(tables)
    }

    /// Reloads `state` when the snapshot on disk is not the one it came from
    fn reload_if_replaced(path: &Path, state: &mut LedgerState) -> Result<(), StoreError> {
        let current = FileStamp::of(path)?;
        if current == state.stamp {
            return Ok(());
        }
        debug!(path = %path.display(), "Ledger snapshot changed on disk, reloading");
        state.tables = match current {
            Some(_) => Self::load(path)?,
            None => LedgerTables::default(),
        };
        state.stamp = current;
        Ok(())
    }

    fn persist(path: &Path, tables: &LedgerTables) -> Result<Option<FileStamp>, StoreError> {
        let serialized = serialize(tables)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serialized)?;
        let encoded = encoder.finish()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // Atomic write: write to temp file, then rename
        let temp_path = path.with_extension("tmp");
        std::fs::write(&temp_path, encoded)?;
        std::fs::rename(&temp_path, path)?;

        debug!(path = %path.display(), records = tables.record_count(), "Saved ledger");
        FileStamp::of(path)
    }

    /// Read access to tables that include every write persisted so far, by
    /// this or any other process
    async fn read(&self) -> Result<RwLockReadGuard<'_, LedgerState>, StoreError> {
        let Some(path) = &self.path else {
            return Ok(self.state.read().await);
        };
        {
            let state = self.state.read().await;
            if FileStamp::of(path)? == state.stamp {
                return Ok(state);
            }
        }
        let mut state = self.state.write().await;
        Self::reload_if_replaced(path, &mut state)?;
        Ok(state.downgrade())
    }

    /// Runs `change` against a staged copy and swaps it in once persisted.
    /// Nothing between taking the file lock and releasing it awaits.
    async fn write<T>(
        &self,
        change: impl FnOnce(&mut LedgerTables) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut live = self.state.write().await;
        let Some(path) = &self.path else {
            let mut staged = live.tables.clone();
            let result = change(&mut staged)?;
            live.tables = staged;
            return Ok(result);
        };

        let _lock = FileLock::acquire(&Self::lock_path(path))?;
        Self::reload_if_replaced(path, &mut live)?;
        let mut staged = live.tables.clone();
        let result = change(&mut staged)?;
        let stamp = Self::persist(path, &staged)?;
        live.tables = staged;
        live.stamp = stamp;
        Ok(result)
    }
}

#[async_trait]
impl LedgerStore for FileLedgerStore {
    async fn find_by_remote_id(&self, subject: &str, remote_id: &str) -> Result<Option<WatchRecord>, StoreError> {
        Ok(self.read().await?.tables.find_by_remote_id(subject, remote_id).cloned())
    }

    async fn find_by_episode_key(
        &self,
        subject: &str,
        series_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<Vec<WatchRecord>, StoreError> {
        Ok(self
            .read()
            .await?
            .tables
            .find_by_episode_key(subject, series_id, season, episode))
    }

    async fn records_for_subject(&self, subject: &str) -> Result<Vec<WatchRecord>, StoreError> {
        Ok(self.read().await?.tables.records_for_subject(subject).cloned().collect())
    }

    async fn commit(&self, transaction: LedgerTransaction) -> Result<(), StoreError> {
        if transaction.is_empty() {
            return Ok(());
        }
        let ops = transaction.into_ops();
        let count = ops.len();
        self.write(|tables| {
            for op in ops {
                tables.apply(op)?;
            }
            Ok(())
        })
        .await?;
        debug!(ops = count, "Committed ledger transaction");
        Ok(())
    }

    async fn delete_where(&self, subject: &str, predicate: RecordFilter<'_>) -> Result<usize, StoreError> {
        self.write(|tables| {
            let doomed: Vec<_> = tables
                .records_for_subject(subject)
                .filter(|record| predicate(record))
                .filter_map(|record| record.id)
                .collect();
            for id in &doomed {
                tables.apply(LedgerOp::Delete(*id))?;
            }
            Ok(doomed.len())
        })
        .await
    }

    async fn replace_libraries(&self, subject: &str, rows: Vec<LibrarySnapshotRow>) -> Result<(), StoreError> {
        self.write(|tables| {
            tables.replace_libraries(subject, rows);
            Ok(())
        })
        .await
    }

    async fn libraries(&self, subject: &str) -> Result<Vec<LibrarySnapshotRow>, StoreError> {
        Ok(self.read().await?.tables.libraries(subject))
    }

    async fn sync_status(&self, subject: &str) -> Result<Option<SyncStatusRecord>, StoreError> {
        Ok(self.read().await?.tables.sync_status(subject))
    }

    async fn put_sync_status(&self, status: SyncStatusRecord) -> Result<(), StoreError> {
        self.write(|tables| {
            tables.put_sync_status(status);
            Ok(())
        })
        .await
    }

    async fn rating_row(&self, rating_id: &str) -> Result<Option<RatingCacheRow>, StoreError> {
        Ok(self.read().await?.tables.rating_row(rating_id))
    }

    async fn rating_row_by_secondary(&self, secondary_id: &str) -> Result<Option<RatingCacheRow>, StoreError> {
        Ok(self.read().await?.tables.rating_row_by_secondary(secondary_id))
    }

    async fn upsert_rating_row(&self, row: RatingCacheRow) -> Result<(), StoreError> {
        self.write(|tables| {
            tables.upsert_rating_row(row);
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{episode_record, movie_record};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;
    use watch_sync_models::{ExternalRatings, SyncState};

    #[tokio::test]
    async fn test_commit_assigns_ids_and_indexes() {
        let store = FileLedgerStore::in_memory();
        let mut tx = LedgerTransaction::new();
        tx.insert(movie_record("alice", "m1", "Heat"));
        tx.insert(episode_record("alice", "e1", "Dark", "s1", 1, 1));
        store.commit(tx).await.unwrap();

        let movie = store.find_by_remote_id("alice", "m1").await.unwrap().unwrap();
        assert!(movie.id.is_some());
        assert!(store.find_by_remote_id("bob", "m1").await.unwrap().is_none());

        let episodes = store.find_by_episode_key("alice", "s1", 1, 1).await.unwrap();
        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].remote_id.as_deref(), Some("e1"));
    }

    #[tokio::test]
    async fn test_failed_commit_changes_nothing() {
        let store = FileLedgerStore::in_memory();
        let mut tx = LedgerTransaction::new();
        tx.insert(movie_record("alice", "m1", "Heat"));
        store.commit(tx).await.unwrap();

        // Second insert collides with the first; the new movie must not land either
        let mut tx = LedgerTransaction::new();
        tx.insert(movie_record("alice", "m2", "Ronin"));
        tx.insert(movie_record("alice", "m1", "Heat again"));
        let result = store.commit(tx).await;
        assert!(matches!(result, Err(StoreError::Constraint(_))));

        let records = store.records_for_subject("alice").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Heat");
    }

    #[tokio::test]
    async fn test_clear_remote_ids_keeps_record() {
        let store = FileLedgerStore::in_memory();
        let mut tx = LedgerTransaction::new();
        tx.insert(episode_record("alice", "e1", "Dark", "s1", 1, 1));
        store.commit(tx).await.unwrap();
        let id = store.find_by_remote_id("alice", "e1").await.unwrap().unwrap().id.unwrap();

        let mut tx = LedgerTransaction::new();
        tx.clear_remote_ids(id);
        store.commit(tx).await.unwrap();

        assert!(store.find_by_remote_id("alice", "e1").await.unwrap().is_none());
        assert!(store.find_by_episode_key("alice", "s1", 1, 1).await.unwrap().is_empty());
        let records = store.records_for_subject("alice").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].remote_id, None);
        assert_eq!(records[0].series_id, None);

        // The freed remote id can be recorded again
        let mut tx = LedgerTransaction::new();
        tx.insert(episode_record("alice", "e1", "Dark", "s1", 1, 1));
        store.commit(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_where_is_scoped_to_subject() {
        let store = FileLedgerStore::in_memory();
        let mut tx = LedgerTransaction::new();
        tx.insert(episode_record("alice", "e1", "Dark", "old", 1, 1));
        tx.insert(episode_record("alice", "e2", "Dark", "new", 1, 1));
        tx.insert(episode_record("bob", "e3", "Dark", "old", 1, 1));
        store.commit(tx).await.unwrap();

        let removed = store
            .delete_where("alice", &|r: &WatchRecord| r.series_id.as_deref() == Some("old"))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.records_for_subject("alice").await.unwrap().len(), 1);
        assert_eq!(store.records_for_subject("bob").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_record_is_rejected() {
        let store = FileLedgerStore::in_memory();
        let mut record = movie_record("alice", "m1", "Heat");
        record.id = Some(watch_sync_models::RecordId(42));
        let mut tx = LedgerTransaction::new();
        tx.update(record);
        assert!(matches!(store.commit(tx).await, Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_snapshot_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("ledger.bin");
        let updated_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        {
            let store = FileLedgerStore::open(&path).unwrap();
            let mut tx = LedgerTransaction::new();
            tx.insert(episode_record("alice", "e1", "Dark", "s1", 1, 1));
            store.commit(tx).await.unwrap();
            store
                .put_sync_status(SyncStatusRecord::idle("alice").succeed(updated_at))
                .await
                .unwrap();
            store
                .upsert_rating_row(RatingCacheRow {
                    rating_id: "tt5753856".to_string(),
                    secondary_id: Some("70523".to_string()),
                    ratings: ExternalRatings {
                        imdb_rating: Some(8.7),
                        ..ExternalRatings::default()
                    },
                    updated_at,
                })
                .await
                .unwrap();
        }

        let reopened = FileLedgerStore::open(&path).unwrap();
        assert!(reopened.find_by_remote_id("alice", "e1").await.unwrap().is_some());
        assert_eq!(reopened.find_by_episode_key("alice", "s1", 1, 1).await.unwrap().len(), 1);
        let status = reopened.sync_status("alice").await.unwrap().unwrap();
        assert_eq!(status.state, SyncState::Idle);
        assert_eq!(status.last_success_at, Some(updated_at));
        let row = reopened.rating_row_by_secondary("70523").await.unwrap().unwrap();
        assert_eq!(row.rating_id, "tt5753856");

        // Ids keep counting after a reopen
        let mut tx = LedgerTransaction::new();
        tx.insert(movie_record("alice", "m1", "Heat"));
        reopened.commit(tx).await.unwrap();
        let ids: Vec<_> = reopened
            .records_for_subject("alice")
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_two_stores_on_one_file_keep_each_others_writes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.bin");
        let daemon = FileLedgerStore::open(&path).unwrap();
        let cli = FileLedgerStore::open(&path).unwrap();

        let mut tx = LedgerTransaction::new();
        tx.insert(movie_record("alice", "m1", "Heat"));
        daemon.commit(tx).await.unwrap();

        // Opened before Heat was written; must not stage over it
        let mut tx = LedgerTransaction::new();
        tx.insert(movie_record("alice", "m2", "Ronin"));
        cli.commit(tx).await.unwrap();

        let mut titles: Vec<_> = daemon
            .records_for_subject("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        titles.sort();
        assert_eq!(titles, vec!["Heat", "Ronin"]);

        // Same remote id from the other side is still a constraint violation
        let mut tx = LedgerTransaction::new();
        tx.insert(movie_record("alice", "m2", "Ronin"));
        assert!(matches!(daemon.commit(tx).await, Err(StoreError::Constraint(_))));

        let reopened = FileLedgerStore::open(&path).unwrap();
        assert_eq!(reopened.records_for_subject("alice").await.unwrap().len(), 2);
        let ids: Vec<_> = reopened
            .records_for_subject("alice")
            .await
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_replace_libraries_drops_old_rows() {
        let store = FileLedgerStore::in_memory();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let row = |id: &str| LibrarySnapshotRow {
            subject: "alice".to_string(),
            library_id: id.to_string(),
            name: id.to_uppercase(),
            collection_type: Some("movies".to_string()),
            item_count: 3,
            snapshot_at: at,
        };

        store.replace_libraries("alice", vec![row("a"), row("b")]).await.unwrap();
        store.replace_libraries("alice", vec![row("c")]).await.unwrap();

        let rows = store.libraries("alice").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].library_id, "c");
    }

    #[tokio::test]
    async fn test_rating_secondary_index_follows_upsert() {
        let store = FileLedgerStore::in_memory();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let row = |secondary: &str| RatingCacheRow {
            rating_id: "tt0111161".to_string(),
            secondary_id: Some(secondary.to_string()),
            ratings: ExternalRatings::default(),
            updated_at: at,
        };

        store.upsert_rating_row(row("278")).await.unwrap();
        store.upsert_rating_row(row("999")).await.unwrap();

        assert!(store.rating_row_by_secondary("278").await.unwrap().is_none());
        assert!(store.rating_row_by_secondary("999").await.unwrap().is_some());
        assert!(store.rating_row("tt0111161").await.unwrap().is_some());
    }
}
