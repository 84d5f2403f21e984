use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use watch_sync_models::{LibrarySnapshotRow, RatingCacheRow, RecordId, SyncStatusRecord, WatchRecord};

use super::LedgerOp;
use crate::error::StoreError;

type RemoteKey = (String, String);
type EpisodeKey = (String, String, u32, u32);

/// The whole store state. Only the primary tables are persisted; indexes are
/// rebuilt after loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct LedgerTables {
    next_id: u64,
    records: BTreeMap<RecordId, WatchRecord>,
    libraries: BTreeMap<String, Vec<LibrarySnapshotRow>>,
    statuses: BTreeMap<String, SyncStatusRecord>,
    ratings: BTreeMap<String, RatingCacheRow>,

    #[serde(skip)]
    by_remote: HashMap<RemoteKey, RecordId>,
    #[serde(skip)]
    by_episode: HashMap<EpisodeKey, BTreeSet<RecordId>>,
    #[serde(skip)]
    by_secondary: HashMap<String, String>,
}

fn remote_key(record: &WatchRecord) -> Option<RemoteKey> {
    record
        .remote_id
        .as_ref()
        .map(|remote| (record.subject.clone(), remote.clone()))
}

fn episode_key(record: &WatchRecord) -> Option<EpisodeKey> {
    record
        .episode_key()
        .map(|(series, season, episode)| (record.subject.clone(), series, season, episode))
}

impl LedgerTables {
    pub fn rebuild_indexes(&mut self) {
        self.by_remote.clear();
        self.by_episode.clear();
        self.by_secondary.clear();

        let records: Vec<WatchRecord> = self.records.values().cloned().collect();
        for record in &records {
            if let Some(id) = record.id {
                self.index_record(id, record);
            }
        }
        for row in self.ratings.values() {
            if let Some(secondary) = &row.secondary_id {
                self.by_secondary.insert(secondary.clone(), row.rating_id.clone());
            }
        }
    }

    fn index_record(&mut self, id: RecordId, record: &WatchRecord) {
        if let Some(key) = remote_key(record) {
            self.by_remote.insert(key, id);
        }
        if let Some(key) = episode_key(record) {
            self.by_episode.entry(key).or_default().insert(id);
        }
    }

    fn unindex_record(&mut self, id: RecordId, record: &WatchRecord) {
        if let Some(key) = remote_key(record) {
            if self.by_remote.get(&key) == Some(&id) {
                self.by_remote.remove(&key);
            }
        }
        if let Some(key) = episode_key(record) {
            if let Some(ids) = self.by_episode.get_mut(&key) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.by_episode.remove(&key);
                }
            }
        }
    }

    fn check_remote_unique(&self, record: &WatchRecord, own_id: Option<RecordId>) -> Result<(), StoreError> {
        if let Some(key) = remote_key(record) {
            if let Some(existing) = self.by_remote.get(&key) {
                if Some(*existing) != own_id {
                    return Err(StoreError::Constraint(format!(
                        "remote id {} already recorded for subject {} (record {})",
                        key.1, key.0, existing
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn apply(&mut self, op: LedgerOp) -> Result<(), StoreError> {
        match op {
            LedgerOp::Insert(mut record) => {
                self.check_remote_unique(&record, None)?;
                self.next_id += 1;
                let id = RecordId(self.next_id);
                record.id = Some(id);
                self.index_record(id, &record);
                self.records.insert(id, record);
            }
            LedgerOp::Update(record) => {
                let id = record
                    .id
                    .ok_or_else(|| StoreError::Constraint("update without a record id".to_string()))?;
                let previous = self
                    .records
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::Constraint(format!("record {} does not exist", id)))?;
                self.check_remote_unique(&record, Some(id))?;
                self.unindex_record(id, &previous);
                self.index_record(id, &record);
                self.records.insert(id, record);
            }
            LedgerOp::Delete(id) => {
                let previous = self
                    .records
                    .remove(&id)
                    .ok_or_else(|| StoreError::Constraint(format!("record {} does not exist", id)))?;
                self.unindex_record(id, &previous);
            }
            LedgerOp::ClearRemoteIds(id) => {
                let previous = self
                    .records
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| StoreError::Constraint(format!("record {} does not exist", id)))?;
                self.unindex_record(id, &previous);
                let mut record = previous;
                record.remote_id = None;
                record.series_id = None;
                self.index_record(id, &record);
                self.records.insert(id, record);
            }
        }
        Ok(())
    }

    pub fn find_by_remote_id(&self, subject: &str, remote_id: &str) -> Option<&WatchRecord> {
        self.by_remote
            .get(&(subject.to_string(), remote_id.to_string()))
            .and_then(|id| self.records.get(id))
    }

    pub fn find_by_episode_key(&self, subject: &str, series_id: &str, season: u32, episode: u32) -> Vec<WatchRecord> {
        let key = (subject.to_string(), series_id.to_string(), season, episode);
        self.by_episode
            .get(&key)
            .map(|ids| ids.iter().filter_map(|id| self.records.get(id)).cloned().collect())
            .unwrap_or_default()
    }

    pub fn records_for_subject(&self, subject: &str) -> impl Iterator<Item = &WatchRecord> {
        let subject = subject.to_string();
        self.records.values().filter(move |r| r.subject == subject)
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn replace_libraries(&mut self, subject: &str, rows: Vec<LibrarySnapshotRow>) {
        if rows.is_empty() {
            self.libraries.remove(subject);
        } else {
            self.libraries.insert(subject.to_string(), rows);
        }
    }

    pub fn libraries(&self, subject: &str) -> Vec<LibrarySnapshotRow> {
        self.libraries.get(subject).cloned().unwrap_or_default()
    }

    pub fn sync_status(&self, subject: &str) -> Option<SyncStatusRecord> {
        self.statuses.get(subject).cloned()
    }

    pub fn put_sync_status(&mut self, status: SyncStatusRecord) {
        self.statuses.insert(status.subject.clone(), status);
    }

    pub fn rating_row(&self, rating_id: &str) -> Option<RatingCacheRow> {
        self.ratings.get(rating_id).cloned()
    }

    pub fn rating_row_by_secondary(&self, secondary_id: &str) -> Option<RatingCacheRow> {
        self.by_secondary
            .get(secondary_id)
            .and_then(|rating_id| self.ratings.get(rating_id))
            .cloned()
    }

    pub fn upsert_rating_row(&mut self, row: RatingCacheRow) {
        if let Some(previous) = self.ratings.get(&row.rating_id) {
            if let Some(old_secondary) = &previous.secondary_id {
                if self.by_secondary.get(old_secondary) == Some(&row.rating_id) {
                    self.by_secondary.remove(old_secondary);
                }
            }
        }
        if let Some(secondary) = &row.secondary_id {
            self.by_secondary.insert(secondary.clone(), row.rating_id.clone());
        }
        self.ratings.insert(row.rating_id.clone(), row);
    }
}
