use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use crate::media::{MediaKind, Provenance};

/// Store-assigned primary key of a watch record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One playback fact for a (subject, remote item) pair.
///
/// `remote_id` is unique per subject while it is set. It becomes `None` when
/// the catalog no longer resolves it (see remote id validation); the record
/// itself is kept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatchRecord {
    /// `None` until the store has inserted the record
    pub id: Option<RecordId>,
    pub subject: String,
    pub remote_id: Option<String>,
    /// External rating identifier (IMDb id)
    pub rating_id: Option<String>,
    /// Secondary catalog identifier (TMDB id)
    pub secondary_id: Option<String>,
    pub media_kind: MediaKind,
    pub title: String,
    pub year: Option<i32>,

    // Episode placement
    pub series_id: Option<String>,
    pub series_name: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,

    pub runtime_minutes: u32,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    pub poster_tag: Option<String>,

    pub watched: bool,
    /// Percent in [0, 100]
    pub progress_percent: f64,
    pub play_count: u32,
    pub watched_at: DateTime<Utc>,
    /// Raw last-played timestamp as reported by the catalog
    pub last_played: Option<String>,
    pub provenance: Provenance,
    pub updated_at: DateTime<Utc>,
}

impl WatchRecord {
    /// Case-folded, trimmed series name used for grouping across id churn
    pub fn normalized_series_name(&self) -> Option<String> {
        self.series_name
            .as_deref()
            .map(|name| name.trim().to_lowercase())
            .filter(|name| !name.is_empty())
    }

    /// Secondary dedup key (series id, season, episode), episodes only
    pub fn episode_key(&self) -> Option<(String, u32, u32)> {
        match (&self.series_id, self.season_number, self.episode_number) {
            (Some(series), Some(season), Some(episode)) if self.media_kind == MediaKind::Episode => {
                Some((series.clone(), season, episode))
            }
            _ => None,
        }
    }
}
