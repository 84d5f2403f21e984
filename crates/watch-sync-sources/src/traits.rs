use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use watch_sync_models::{CatalogItem, CatalogLibrary, CatalogUser, ExternalRatings, ItemKind, MediaKind};
use crate::error::{CatalogError, ProviderError};

/// Filters and paging for an item listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemQuery {
    pub kinds: Vec<ItemKind>,
    pub is_played: Option<bool>,
    pub parent_id: Option<String>,
    pub sort_by: Option<String>,
    pub descending: bool,
    pub start_index: u32,
    pub limit: u32,
}

impl ItemQuery {
    /// Played items of one kind, most recently played first
    pub fn played(kind: ItemKind) -> Self {
        Self {
            kinds: vec![kind],
            is_played: Some(true),
            sort_by: Some("DatePlayed".to_string()),
            descending: true,
            ..Self::default()
        }
    }

    pub fn page(mut self, start_index: u32, limit: u32) -> Self {
        self.start_index = start_index;
        self.limit = limit;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPage {
    pub items: Vec<CatalogItem>,
    /// Total matching records on the server, independent of paging
    pub total: u64,
}

/// The remote media catalog, browsed on behalf of one subject at a time
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// All accounts known to the catalog
    async fn list_subjects(&self) -> Result<Vec<CatalogUser>, CatalogError>;

    async fn list_libraries(&self, subject: &str) -> Result<Vec<CatalogLibrary>, CatalogError>;

    async fn list_items(&self, subject: &str, query: &ItemQuery) -> Result<ItemPage, CatalogError>;

    async fn get_item(&self, subject: &str, id: &str) -> Result<CatalogItem, CatalogError>;

    async fn list_seasons(&self, subject: &str, series_id: &str) -> Result<Vec<CatalogItem>, CatalogError>;

    async fn list_episodes(
        &self,
        subject: &str,
        series_id: &str,
        season_id: Option<&str>,
    ) -> Result<Vec<CatalogItem>, CatalogError>;

    /// Partially played items ("continue watching")
    async fn list_resumable(&self, subject: &str, limit: u32) -> Result<Vec<CatalogItem>, CatalogError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderSearchResult {
    pub title: String,
    pub year: Option<String>,
    pub imdb_id: String,
    pub kind: String,
    pub poster: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProviderSearchPage {
    pub results: Vec<ProviderSearchResult>,
    pub total: u64,
}

/// External rating lookups. Every call is made with an explicit API key;
/// choosing the key is the caller's business.
#[async_trait]
pub trait RatingProvider: Send + Sync {
    async fn lookup_by_id(&self, api_key: &str, id: &str) -> Result<ExternalRatings, ProviderError>;

    async fn lookup_by_title(
        &self,
        api_key: &str,
        title: &str,
        year: Option<i32>,
        kind: MediaKind,
    ) -> Result<ExternalRatings, ProviderError>;

    async fn search(
        &self,
        api_key: &str,
        query: &str,
        kind: MediaKind,
        page: u32,
    ) -> Result<ProviderSearchPage, ProviderError>;
}
