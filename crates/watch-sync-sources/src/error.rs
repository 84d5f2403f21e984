use thiserror::Error;

/// Failures talking to the remote media catalog
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    /// Network failure or timeout; the catalog could not be reached
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    /// The requested id does not resolve (anymore)
    #[error("catalog item not found: {0}")]
    NotFound(String),
    #[error("catalog returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("failed to decode catalog response: {0}")]
    Decode(String),
}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            CatalogError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            CatalogError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            CatalogError::Unavailable(e.to_string())
        }
    }
}

/// Failures from the external rating provider
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    /// The key used for the request has hit its daily limit
    #[error("rating provider quota exceeded: {0}")]
    QuotaExceeded(String),
    #[error("rating provider has no match: {0}")]
    NotFound(String),
    /// Anything else: network errors, timeouts, unexpected bodies
    #[error("rating provider request failed: {0}")]
    Transient(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        ProviderError::Transient(e.to_string())
    }
}
