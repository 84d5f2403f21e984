use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::media::MediaKind;

/// Ratings parsed from the provider, normalized across its formats
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ExternalRatings {
    pub imdb_id: Option<String>,
    pub title: Option<String>,
    pub year: Option<i32>,
    pub media_kind: Option<MediaKind>,
    pub imdb_rating: Option<f64>,
    pub imdb_votes: Option<u64>,
    /// Rotten Tomatoes, percent scale
    pub rotten_tomatoes: Option<u8>,
    /// Metacritic, 0-100
    pub metacritic: Option<u8>,
    /// Certification, e.g. "PG-13"
    pub rated: Option<String>,
    pub awards: Option<String>,
    pub box_office: Option<String>,
}

/// One cached provider response, keyed by `rating_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingCacheRow {
    pub rating_id: String,
    pub secondary_id: Option<String>,
    pub ratings: ExternalRatings,
    pub updated_at: DateTime<Utc>,
}

impl RatingCacheRow {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.updated_at < ttl
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RatingOrigin {
    Cache,
    Fetched,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RatingBundle {
    pub secondary_id: Option<String>,
    pub ratings: ExternalRatings,
    pub origin: RatingOrigin,
}

impl RatingBundle {
    pub fn is_cached(&self) -> bool {
        self.origin == RatingOrigin::Cache
    }
}
