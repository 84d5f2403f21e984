use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Catalog runtimes and positions are expressed in 100ns ticks
pub const TICKS_PER_MINUTE: u64 = 600_000_000;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Movie,
    Episode,
    Series,
    Season,
    Other(String),
}

impl ItemKind {
    pub fn from_catalog(type_: &str) -> Self {
        match type_ {
            "Movie" => ItemKind::Movie,
            "Episode" => ItemKind::Episode,
            "Series" => ItemKind::Series,
            "Season" => ItemKind::Season,
            other => ItemKind::Other(other.to_string()),
        }
    }

    pub fn as_catalog(&self) -> &str {
        match self {
            ItemKind::Movie => "Movie",
            ItemKind::Episode => "Episode",
            ItemKind::Series => "Series",
            ItemKind::Season => "Season",
            ItemKind::Other(other) => other.as_str(),
        }
    }
}

/// An item from the remote catalog, normalized from the server's wire format
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub year: Option<i32>,
    pub runtime_ticks: Option<u64>,
    pub rating: Option<f64>,
    pub genres: Vec<String>,
    /// Provider name -> id, e.g. "Imdb" -> "tt0111161"
    pub provider_ids: HashMap<String, String>,
    pub poster_tag: Option<String>,

    // User data
    pub played: bool,
    pub play_count: u32,
    pub position_ticks: Option<u64>,
    pub last_played: Option<String>,

    // Episode placement
    pub series_id: Option<String>,
    pub series_name: Option<String>,
    pub season_number: Option<u32>,
    pub episode_number: Option<u32>,
}

impl CatalogItem {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: ItemKind) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind,
            year: None,
            runtime_ticks: None,
            rating: None,
            genres: Vec::new(),
            provider_ids: HashMap::new(),
            poster_tag: None,
            played: false,
            play_count: 0,
            position_ticks: None,
            last_played: None,
            series_id: None,
            series_name: None,
            season_number: None,
            episode_number: None,
        }
    }

    pub fn imdb_id(&self) -> Option<&str> {
        self.provider_id("Imdb")
    }

    pub fn tmdb_id(&self) -> Option<&str> {
        self.provider_id("Tmdb")
    }

    /// Provider ids are matched case-insensitively; servers disagree on casing
    fn provider_id(&self, provider: &str) -> Option<&str> {
        self.provider_ids
            .iter()
            .find(|(name, value)| name.eq_ignore_ascii_case(provider) && !value.is_empty())
            .map(|(_, value)| value.as_str())
    }

    pub fn runtime_minutes(&self) -> u32 {
        self.runtime_ticks
            .map(|ticks| (ticks / TICKS_PER_MINUTE) as u32)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogLibrary {
    pub id: String,
    pub name: String,
    pub collection_type: Option<String>,
    pub child_count: u64,
}

/// A catalog account; one subject of the ledger
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogUser {
    pub id: String,
    pub name: String,
}
