pub mod clear;
pub mod config;
pub mod daemon;
pub mod ledger;
pub mod ratings;
pub mod sync;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;
use watch_sync_config::{Config, CredentialStore, PathManager};
use watch_sync_core::{FileLedgerStore, SystemClock, WatchLedger};
use watch_sync_sources::{EmbyClient, OmdbClient};

/// Configuration, credentials and clients loaded for one command
pub struct AppContext {
    pub config: Config,
    pub ledger: WatchLedger,
}

impl AppContext {
    pub fn load() -> Result<Self> {
        let paths = PathManager::default();
        paths
            .ensure_directories()
            .map_err(|e| eyre!("Failed to create data directories: {}", e))?;
        let config = load_config(&paths)?;

        let credentials_file = paths.credentials_file();
        let mut credentials = CredentialStore::new(credentials_file.clone());
        credentials
            .load()
            .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;

        let api_key = credentials.get_catalog_api_key().ok_or_else(|| {
            eyre!("No media server API key configured. Run `playledger config set-keys --catalog-key <key>` or set PLAYLEDGER_CATALOG_API_KEY")
        })?;
        let rating_keys = credentials.get_rating_api_keys();
        if rating_keys.is_empty() {
            tracing::warn!("No rating provider keys configured; rating lookups will fail");
        }

        let catalog = EmbyClient::new(
            &config.catalog_base_url(),
            &api_key,
            Duration::from_secs(config.catalog.timeout_secs),
        )
        .wrap_err("Failed to create media server client")?;
        let provider = OmdbClient::new(Duration::from_secs(config.ratings.timeout_secs))
            .wrap_err("Failed to create rating provider client")?;
        let ledger_file = paths.ledger_file();
        let store = FileLedgerStore::open(&ledger_file)
            .wrap_err_with(|| format!("Failed to open ledger at {}", ledger_file.display()))?;

        let ledger = WatchLedger::new(
            Arc::new(catalog),
            Arc::new(provider),
            Arc::new(store),
            Arc::new(SystemClock),
            &config,
            rating_keys,
        )
        .with_run_lock(paths.sync_lock_file());
        Ok(Self { config, ledger })
    }
}

pub fn load_config(paths: &PathManager) -> Result<Config> {
    let config_file = paths.config_file();
    if !config_file.exists() {
        return Err(eyre!(
            "Configuration file not found at {}. Run `playledger config init --server-url <url>` first",
            config_file.display()
        ));
    }
    let config = Config::load_from_file(&config_file)
        .map_err(|e| eyre!("Failed to load config from {}: {}", config_file.display(), e))?;
    config
        .validate()
        .map_err(|e| eyre!("Configuration validation failed: {}", e))?;
    Ok(config)
}
