use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use watch_sync_models::{ExternalRatings, MediaKind};

use super::api::{classify_error, OmdbResponse};
use crate::error::ProviderError;
use crate::traits::{ProviderSearchPage, RatingProvider};

const OMDB_BASE_URL: &str = "https://www.omdbapi.com/";

/// Client for the OMDb rating API. Holds no key; every call is made with the
/// key handed in by the caller's rotation.
pub struct OmdbClient {
    client: Client,
    base_url: String,
}

impl OmdbClient {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(OMDB_BASE_URL, timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transient(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
        })
    }

    async fn request(&self, api_key: &str, params: &[(&str, String)]) -> Result<OmdbResponse, ProviderError> {
        debug!(params = ?params, "Rating provider request");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("apikey", api_key)])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        // The provider reports quota problems as 401 with a JSON body, so the
        // body is classified before the status.
        match serde_json::from_str::<OmdbResponse>(&body) {
            Ok(parsed) => parsed.into_result(),
            Err(_) if !status.is_success() => {
                warn!(status = status.as_u16(), "Rating provider returned an error status");
                let message = format!("HTTP {}: {}", status.as_u16(), body);
                match classify_error(&message) {
                    quota @ ProviderError::QuotaExceeded(_) => Err(quota),
                    _ => Err(ProviderError::Transient(message)),
                }
            }
            Err(e) => Err(ProviderError::Transient(format!("unexpected response body: {}", e))),
        }
    }
}

#[async_trait]
impl RatingProvider for OmdbClient {
    async fn lookup_by_id(&self, api_key: &str, id: &str) -> Result<ExternalRatings, ProviderError> {
        if !id.starts_with("tt") {
            return Err(ProviderError::NotFound(format!("not an IMDb id: {}", id)));
        }
        let response = self.request(api_key, &[("i", id.to_string())]).await?;
        Ok(response.into_ratings())
    }

    async fn lookup_by_title(
        &self,
        api_key: &str,
        title: &str,
        year: Option<i32>,
        kind: MediaKind,
    ) -> Result<ExternalRatings, ProviderError> {
        let mut params = vec![
            ("t", title.to_string()),
            ("type", kind.provider_type().to_string()),
        ];
        if let Some(year) = year {
            params.push(("y", year.to_string()));
        }
        let response = self.request(api_key, &params).await?;
        Ok(response.into_ratings())
    }

    async fn search(
        &self,
        api_key: &str,
        query: &str,
        kind: MediaKind,
        page: u32,
    ) -> Result<ProviderSearchPage, ProviderError> {
        let params = [
            ("s", query.to_string()),
            ("type", kind.provider_type().to_string()),
            ("page", page.max(1).to_string()),
        ];
        let response = self.request(api_key, &params).await?;
        Ok(response.into_search_page())
    }
}
