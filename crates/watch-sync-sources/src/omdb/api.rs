use serde::Deserialize;
use watch_sync_models::{ExternalRatings, MediaKind};

use crate::error::ProviderError;
use crate::traits::{ProviderSearchPage, ProviderSearchResult};

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Deserialize)]
pub(crate) struct RatingSource {
    #[serde(rename = "Source", default)]
    pub source: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SearchEntry {
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Year")]
    pub year: Option<String>,
    #[serde(rename = "imdbID", default)]
    pub imdb_id: String,
    #[serde(rename = "Type", default)]
    pub type_: String,
    #[serde(rename = "Poster")]
    pub poster: Option<String>,
}

/// One response body. Title lookups and searches share the envelope; the
/// fields that don't apply are simply absent.
#[derive(Debug, Deserialize)]
pub(crate) struct OmdbResponse {
    #[serde(rename = "Response", default)]
    pub response: String,
    #[serde(rename = "Error")]
    pub error: Option<String>,
    #[serde(rename = "imdbID")]
    pub imdb_id: Option<String>,
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Year")]
    pub year: Option<String>,
    #[serde(rename = "Type")]
    pub type_: Option<String>,
    #[serde(rename = "imdbRating")]
    pub imdb_rating: Option<String>,
    #[serde(rename = "imdbVotes")]
    pub imdb_votes: Option<String>,
    #[serde(rename = "Ratings", default)]
    pub ratings: Vec<RatingSource>,
    #[serde(rename = "Rated")]
    pub rated: Option<String>,
    #[serde(rename = "Awards")]
    pub awards: Option<String>,
    #[serde(rename = "BoxOffice")]
    pub box_office: Option<String>,
    #[serde(rename = "Search", default)]
    pub search: Vec<SearchEntry>,
    #[serde(rename = "totalResults")]
    pub total_results: Option<String>,
}

impl OmdbResponse {
    /// Turns a `Response: "False"` body into the matching error
    pub fn into_result(self) -> Result<Self, ProviderError> {
        if self.response.eq_ignore_ascii_case("true") {
            Ok(self)
        } else {
            Err(classify_error(
                self.error.as_deref().unwrap_or("Unknown error"),
            ))
        }
    }

    pub fn into_ratings(self) -> ExternalRatings {
        let mut ratings = ExternalRatings {
            imdb_id: present(self.imdb_id),
            title: present(self.title),
            year: self.year.as_deref().and_then(parse_year),
            media_kind: Some(match self.type_.as_deref() {
                Some("movie") => MediaKind::Movie,
                _ => MediaKind::Episode,
            }),
            imdb_rating: present(self.imdb_rating).and_then(|r| r.parse().ok()),
            imdb_votes: present(self.imdb_votes).and_then(|v| v.replace(',', "").parse().ok()),
            rotten_tomatoes: None,
            metacritic: None,
            rated: present(self.rated),
            awards: present(self.awards),
            box_office: present(self.box_office),
        };

        for source in &self.ratings {
            if source.source.contains("Rotten Tomatoes") {
                ratings.rotten_tomatoes = source.value.trim_end_matches('%').trim().parse().ok();
            } else if source.source.contains("Metacritic") {
                ratings.metacritic = source
                    .value
                    .split('/')
                    .next()
                    .and_then(|score| score.trim().parse().ok());
            }
        }

        ratings
    }

    pub fn into_search_page(self) -> ProviderSearchPage {
        let total = self
            .total_results
            .as_deref()
            .and_then(|t| t.parse().ok())
            .unwrap_or(self.search.len() as u64);

        ProviderSearchPage {
            total,
            results: self
                .search
                .into_iter()
                .map(|entry| ProviderSearchResult {
                    title: entry.title,
                    year: present(entry.year),
                    imdb_id: entry.imdb_id,
                    kind: entry.type_,
                    poster: present(entry.poster),
                })
                .collect(),
        }
    }
}

pub(crate) fn classify_error(message: &str) -> ProviderError {
    let lowered = message.to_lowercase();
    if lowered.contains("limit") || lowered.contains("exceeded") {
        ProviderError::QuotaExceeded(message.to_string())
    } else if lowered.contains("not found") || lowered.contains("incorrect imdb id") {
        ProviderError::NotFound(message.to_string())
    } else {
        ProviderError::Transient(message.to_string())
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty() && v != NOT_AVAILABLE)
}

/// Leading year of values like "2008", "2008–2013" or "2019-"
fn parse_year(value: &str) -> Option<i32> {
    value
        .split(|c| c == '–' || c == '-')
        .next()
        .and_then(|year| year.trim().parse().ok())
}
