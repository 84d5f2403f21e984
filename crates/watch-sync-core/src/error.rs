use thiserror::Error;
use watch_sync_sources::CatalogError;

/// Failures of the ledger store. A failed commit leaves the store unchanged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ledger I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode ledger snapshot: {0}")]
    Encode(String),
    #[error("ledger constraint violated: {0}")]
    Constraint(String),
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        StoreError::Encode(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// A bulk fetch failed; the pass was abandoned without writing anything
    #[error("catalog unavailable: {0}")]
    RemoteUnavailable(#[source] CatalogError),
    #[error("catalog lookup for {id} failed: {source}")]
    RemoteItem {
        id: String,
        #[source]
        source: CatalogError,
    },
    #[error("catalog no longer resolves {0}")]
    RemoteNotFound(String),
    /// Every key that was tried during this lookup hit its quota
    #[error("rating provider quota exceeded: {0}")]
    ProviderQuotaExceeded(String),
    /// No key was eligible; no request was made
    #[error("no rating provider key has capacity left today")]
    NoCapacity,
    #[error("no rating found: {0}")]
    ProviderNotFound(String),
    #[error("rating provider request failed: {0}")]
    ProviderUnavailable(String),
    #[error("a sync is already running")]
    AlreadyRunning,
    #[error("sync task ended abnormally: {0}")]
    TaskAborted(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl SyncError {
    pub fn is_already_running(&self) -> bool {
        matches!(self, SyncError::AlreadyRunning)
    }
}
