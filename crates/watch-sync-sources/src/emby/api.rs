use serde::Deserialize;
use std::collections::HashMap;
use watch_sync_models::{CatalogItem, CatalogLibrary, CatalogUser, ItemKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ItemsResponse {
    #[serde(default)]
    pub items: Vec<WireItem>,
    #[serde(default)]
    pub total_record_count: u64,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireUserData {
    #[serde(default)]
    pub played: bool,
    #[serde(default)]
    pub play_count: u32,
    pub playback_position_ticks: Option<u64>,
    pub last_played_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireItem {
    pub id: String,
    pub name: Option<String>,
    #[serde(rename = "Type")]
    pub type_: Option<String>,
    pub production_year: Option<i32>,
    pub run_time_ticks: Option<u64>,
    pub community_rating: Option<f64>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub provider_ids: HashMap<String, String>,
    #[serde(default)]
    pub image_tags: HashMap<String, String>,
    pub user_data: Option<WireUserData>,
    pub series_id: Option<String>,
    pub series_name: Option<String>,
    pub parent_index_number: Option<u32>,
    pub index_number: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireLibrary {
    pub id: String,
    pub name: Option<String>,
    pub collection_type: Option<String>,
    #[serde(default)]
    pub child_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct LibrariesResponse {
    #[serde(default)]
    pub items: Vec<WireLibrary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireUser {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<WireItem> for CatalogItem {
    fn from(wire: WireItem) -> Self {
        let kind = ItemKind::from_catalog(wire.type_.as_deref().unwrap_or_default());
        let user_data = wire.user_data.unwrap_or_default();

        // A season's own index is its season number; an episode carries its
        // season in the parent index.
        let (season_number, episode_number) = match kind {
            ItemKind::Season => (wire.index_number, None),
            _ => (wire.parent_index_number, wire.index_number),
        };

        CatalogItem {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
            kind,
            year: wire.production_year,
            runtime_ticks: wire.run_time_ticks.filter(|ticks| *ticks > 0),
            rating: wire.community_rating,
            genres: wire.genres,
            provider_ids: wire.provider_ids,
            poster_tag: wire.image_tags.get("Primary").cloned(),
            played: user_data.played,
            play_count: user_data.play_count,
            position_ticks: user_data.playback_position_ticks.filter(|ticks| *ticks > 0),
            last_played: user_data.last_played_date,
            series_id: wire.series_id,
            series_name: wire.series_name,
            season_number,
            episode_number,
        }
    }
}

impl From<WireLibrary> for CatalogLibrary {
    fn from(wire: WireLibrary) -> Self {
        CatalogLibrary {
            id: wire.id,
            name: wire.name.unwrap_or_default(),
            collection_type: wire.collection_type,
            child_count: wire.child_count,
        }
    }
}

impl From<WireUser> for CatalogUser {
    fn from(wire: WireUser) -> Self {
        CatalogUser {
            id: wire.id,
            name: wire.name,
        }
    }
}
