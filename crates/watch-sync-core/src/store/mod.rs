//! Durable storage for the ledger, library snapshots, sync status and the
//! rating cache.

mod file;
mod lock;
mod tables;

use async_trait::async_trait;
use watch_sync_models::{LibrarySnapshotRow, RatingCacheRow, RecordId, SyncStatusRecord, WatchRecord};

use crate::error::StoreError;

pub use file::FileLedgerStore;
pub use lock::FileLock;

/// One write inside a [`LedgerTransaction`]
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerOp {
    /// The store assigns the id; any id on the record is ignored
    Insert(WatchRecord),
    /// Replaces the stored record with the same id
    Update(WatchRecord),
    Delete(RecordId),
    /// Forget the record's remote id and series id but keep the record
    ClearRemoteIds(RecordId),
}

/// An ordered batch of ledger writes, applied all-or-nothing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerTransaction {
    ops: Vec<LedgerOp>,
}

impl LedgerTransaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: WatchRecord) {
        self.ops.push(LedgerOp::Insert(record));
    }

    pub fn update(&mut self, record: WatchRecord) {
        self.ops.push(LedgerOp::Update(record));
    }

    pub fn clear_remote_ids(&mut self, id: RecordId) {
        self.ops.push(LedgerOp::ClearRemoteIds(id));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub(crate) fn into_ops(self) -> Vec<LedgerOp> {
        self.ops
    }
}

/// Predicate used for bulk deletes
pub type RecordFilter<'a> = &'a (dyn Fn(&WatchRecord) -> bool + Send + Sync);

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_remote_id(&self, subject: &str, remote_id: &str) -> Result<Option<WatchRecord>, StoreError>;

    /// Records on the secondary key (subject, series id, season, episode)
    async fn find_by_episode_key(
        &self,
        subject: &str,
        series_id: &str,
        season: u32,
        episode: u32,
    ) -> Result<Vec<WatchRecord>, StoreError>;

    async fn records_for_subject(&self, subject: &str) -> Result<Vec<WatchRecord>, StoreError>;

    /// Applies every op or none. Uniqueness is checked against the state the
    /// transaction itself produces.
    async fn commit(&self, transaction: LedgerTransaction) -> Result<(), StoreError>;

    /// Deletes every record of `subject` matching `filter`; returns the count
    async fn delete_where(&self, subject: &str, filter: RecordFilter<'_>) -> Result<usize, StoreError>;

    /// Drops all snapshot rows of `subject` and stores `rows` in their place
    async fn replace_libraries(&self, subject: &str, rows: Vec<LibrarySnapshotRow>) -> Result<(), StoreError>;

    async fn libraries(&self, subject: &str) -> Result<Vec<LibrarySnapshotRow>, StoreError>;

    async fn sync_status(&self, subject: &str) -> Result<Option<SyncStatusRecord>, StoreError>;

    async fn put_sync_status(&self, status: SyncStatusRecord) -> Result<(), StoreError>;

    async fn rating_row(&self, rating_id: &str) -> Result<Option<RatingCacheRow>, StoreError>;

    async fn rating_row_by_secondary(&self, secondary_id: &str) -> Result<Option<RatingCacheRow>, StoreError>;

    async fn upsert_rating_row(&self, row: RatingCacheRow) -> Result<(), StoreError>;
}
