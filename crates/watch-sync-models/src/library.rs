use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached library metadata for one (subject, library). Rows for a subject are
/// replaced wholesale on every refresh.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibrarySnapshotRow {
    pub subject: String,
    pub library_id: String,
    pub name: String,
    pub collection_type: Option<String>,
    pub item_count: u64,
    pub snapshot_at: DateTime<Utc>,
}
