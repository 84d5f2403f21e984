//! Field-by-field merge of remote playback facts into an existing record.
//!
//! Every field reconciliation may touch is listed in [`MERGE_TABLE`] with its
//! policy. Fields not in the table (title, placement, provenance) are never
//! changed by a merge.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use watch_sync_models::WatchRecord;

/// Progress moves smaller than this (percentage points) are noise
pub const PROGRESS_TOLERANCE: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MergePolicy {
    /// Take the remote value whenever it differs
    AlwaysOverwrite,
    /// Take the remote value only if it is greater
    Monotonic,
    /// Take the remote value only if the local one is empty
    FillIfEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Field {
    Progress,
    Watched,
    PlayCount,
    /// `watched_at` together with the raw `last_played` text
    WatchedAt,
    Runtime,
    Poster,
    Rating,
    Genres,
    SecondaryId,
    RatingId,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::Progress => "progress",
            Field::Watched => "watched",
            Field::PlayCount => "play_count",
            Field::WatchedAt => "watched_at",
            Field::Runtime => "runtime",
            Field::Poster => "poster",
            Field::Rating => "rating",
            Field::Genres => "genres",
            Field::SecondaryId => "secondary_id",
            Field::RatingId => "rating_id",
        };
        write!(f, "{}", name)
    }
}

pub const MERGE_TABLE: &[(Field, MergePolicy)] = &[
    (Field::Progress, MergePolicy::AlwaysOverwrite),
    (Field::Watched, MergePolicy::AlwaysOverwrite),
    (Field::PlayCount, MergePolicy::Monotonic),
    (Field::WatchedAt, MergePolicy::Monotonic),
    (Field::Runtime, MergePolicy::FillIfEmpty),
    (Field::Poster, MergePolicy::FillIfEmpty),
    (Field::Rating, MergePolicy::FillIfEmpty),
    (Field::Genres, MergePolicy::FillIfEmpty),
    (Field::SecondaryId, MergePolicy::FillIfEmpty),
    (Field::RatingId, MergePolicy::FillIfEmpty),
];

/// What the catalog currently says about one item
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFacts {
    pub progress_percent: f64,
    pub watched: bool,
    pub play_count: u32,
    /// `None` when the catalog gave no usable timestamp; such a pass never
    /// moves `watched_at`
    pub watched_at: Option<DateTime<Utc>>,
    pub last_played: Option<String>,
    pub runtime_minutes: u32,
    pub poster_tag: Option<String>,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    pub secondary_id: Option<String>,
    pub rating_id: Option<String>,
}

trait Slot: PartialEq + PartialOrd + Clone {
    fn is_empty(&self) -> bool;
}

impl<T: PartialOrd + Clone> Slot for Option<T> {
    fn is_empty(&self) -> bool {
        self.is_none()
    }
}

impl Slot for Vec<String> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

impl Slot for u32 {
    fn is_empty(&self) -> bool {
        *self == 0
    }
}

impl Slot for bool {
    fn is_empty(&self) -> bool {
        !*self
    }
}

impl Slot for f64 {
    fn is_empty(&self) -> bool {
        *self == 0.0
    }
}

impl Slot for DateTime<Utc> {
    fn is_empty(&self) -> bool {
        false
    }
}

fn merge_slot<T: Slot>(policy: MergePolicy, slot: &mut T, incoming: &T) -> bool {
    let take = match policy {
        MergePolicy::AlwaysOverwrite => slot != incoming,
        MergePolicy::Monotonic => incoming > slot,
        MergePolicy::FillIfEmpty => slot.is_empty() && !incoming.is_empty(),
    };
    if take {
        *slot = incoming.clone();
    }
    take
}

fn apply(field: Field, policy: MergePolicy, record: &mut WatchRecord, facts: &RemoteFacts) -> bool {
    match field {
        Field::Progress => {
            (facts.progress_percent - record.progress_percent).abs() > PROGRESS_TOLERANCE
                && merge_slot(policy, &mut record.progress_percent, &facts.progress_percent)
        }
        Field::Watched => merge_slot(policy, &mut record.watched, &facts.watched),
        Field::PlayCount => merge_slot(policy, &mut record.play_count, &facts.play_count),
        Field::WatchedAt => match &facts.watched_at {
            Some(at) if merge_slot(policy, &mut record.watched_at, at) => {
                record.last_played = facts.last_played.clone();
                true
            }
            _ => false,
        },
        Field::Runtime => merge_slot(policy, &mut record.runtime_minutes, &facts.runtime_minutes),
        Field::Poster => merge_slot(policy, &mut record.poster_tag, &facts.poster_tag),
        Field::Rating => merge_slot(policy, &mut record.rating, &facts.rating),
        Field::Genres => merge_slot(policy, &mut record.genres, &facts.genres),
        Field::SecondaryId => merge_slot(policy, &mut record.secondary_id, &facts.secondary_id),
        Field::RatingId => merge_slot(policy, &mut record.rating_id, &facts.rating_id),
    }
}

/// Merges `facts` into `record` and returns the fields that changed
pub fn merge_record(record: &mut WatchRecord, facts: &RemoteFacts) -> Vec<Field> {
    MERGE_TABLE
        .iter()
        .filter(|(field, policy)| apply(*field, *policy, record, facts))
        .map(|(field, _)| *field)
        .collect()
}
