use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use watch_sync_models::{CatalogItem, CatalogLibrary, CatalogUser};

use super::api::{ItemsResponse, LibrariesResponse, WireItem, WireUser};
use crate::error::CatalogError;
use crate::traits::{CatalogClient, ItemPage, ItemQuery};

const ITEM_FIELDS: &str = "Genres,ProviderIds,UserData,CommunityRating,ProductionYear,DatePlayed";

/// HTTP client for an Emby-compatible media server
pub struct EmbyClient {
    client: Client,
    base_url: String,
}

impl EmbyClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            HeaderName::from_static("x-emby-token"),
            HeaderValue::from_str(api_key)
                .map_err(|e| CatalogError::Unavailable(format!("invalid api key format: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CatalogError::Unavailable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, CatalogError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, params = params.len(), "Catalog request");

        let response = self.client.get(&url).query(params).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(path.to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(CatalogError::Http {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CatalogError::Decode(e.to_string()))
    }
}

fn query_params(query: &ItemQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("Recursive", "true".to_string()),
        ("Fields", ITEM_FIELDS.to_string()),
        ("StartIndex", query.start_index.to_string()),
        ("Limit", query.limit.to_string()),
        (
            "SortOrder",
            if query.descending { "Descending" } else { "Ascending" }.to_string(),
        ),
    ];

    if !query.kinds.is_empty() {
        let kinds: Vec<&str> = query.kinds.iter().map(|k| k.as_catalog()).collect();
        params.push(("IncludeItemTypes", kinds.join(",")));
    }
    if let Some(played) = query.is_played {
        params.push(("IsPlayed", played.to_string()));
    }
    if let Some(parent) = &query.parent_id {
        params.push(("ParentId", parent.clone()));
    }
    params.push((
        "SortBy",
        query.sort_by.clone().unwrap_or_else(|| "SortName".to_string()),
    ));

    params
}

#[async_trait]
impl CatalogClient for EmbyClient {
    async fn list_subjects(&self) -> Result<Vec<CatalogUser>, CatalogError> {
        let users: Vec<WireUser> = self.get_json("/Users", &[]).await?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    async fn list_libraries(&self, subject: &str) -> Result<Vec<CatalogLibrary>, CatalogError> {
        let path = format!("/Users/{}/Views", urlencoding::encode(subject));
        let response: LibrariesResponse = self.get_json(&path, &[]).await?;
        Ok(response.items.into_iter().map(Into::into).collect())
    }

    async fn list_items(&self, subject: &str, query: &ItemQuery) -> Result<ItemPage, CatalogError> {
        let path = format!("/Users/{}/Items", urlencoding::encode(subject));
        let response: ItemsResponse = self.get_json(&path, &query_params(query)).await?;
        Ok(ItemPage {
            total: response.total_record_count,
            items: response.items.into_iter().map(Into::into).collect(),
        })
    }

    async fn get_item(&self, subject: &str, id: &str) -> Result<CatalogItem, CatalogError> {
        let path = format!(
            "/Users/{}/Items/{}",
            urlencoding::encode(subject),
            urlencoding::encode(id)
        );
        let item: WireItem = self
            .get_json(&path, &[("Fields", ITEM_FIELDS.to_string())])
            .await?;
        Ok(item.into())
    }

    async fn list_seasons(&self, subject: &str, series_id: &str) -> Result<Vec<CatalogItem>, CatalogError> {
        let path = format!("/Shows/{}/Seasons", urlencoding::encode(series_id));
        let response: ItemsResponse = self
            .get_json(&path, &[("UserId", subject.to_string()), ("Fields", "UserData".to_string())])
            .await?;
        Ok(response.items.into_iter().map(Into::into).collect())
    }

    async fn list_episodes(
        &self,
        subject: &str,
        series_id: &str,
        season_id: Option<&str>,
    ) -> Result<Vec<CatalogItem>, CatalogError> {
        let path = format!("/Shows/{}/Episodes", urlencoding::encode(series_id));
        let mut params = vec![
            ("UserId", subject.to_string()),
            ("Fields", "ProviderIds,UserData".to_string()),
        ];
        if let Some(season) = season_id {
            params.push(("SeasonId", season.to_string()));
        }
        let response: ItemsResponse = self.get_json(&path, &params).await?;
        Ok(response.items.into_iter().map(Into::into).collect())
    }

    async fn list_resumable(&self, subject: &str, limit: u32) -> Result<Vec<CatalogItem>, CatalogError> {
        let path = format!("/Users/{}/Items/Resume", urlencoding::encode(subject));
        let response: ItemsResponse = self
            .get_json(
                &path,
                &[
                    ("Limit", limit.to_string()),
                    ("Fields", ITEM_FIELDS.to_string()),
                    ("MediaTypes", "Video".to_string()),
                ],
            )
            .await?;
        Ok(response.items.into_iter().map(Into::into).collect())
    }
}
