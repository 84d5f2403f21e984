use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub ratings: RatingsConfig,
    #[serde(default = "default_sync_config")]
    pub sync: SyncConfig,
}

/// Remote media server connection
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CatalogConfig {
    pub server_url: String,
    #[serde(default = "default_catalog_timeout_secs")]
    pub timeout_secs: u64,
}

/// External rating cache and provider quota settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RatingsConfig {
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u32,
    /// Requests per key per UTC day
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,
    /// Errors per key per UTC day before the key is skipped
    #[serde(default = "default_error_limit")]
    pub error_limit: u32,
    #[serde(default = "default_rating_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SyncConfig {
    /// Minutes between scheduled batches; 0 disables the timer
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,
    #[serde(default = "default_true")]
    pub sync_on_startup: bool,
    /// Subject ids or names to sync; empty means everyone
    #[serde(default)]
    pub allowed_subjects: Vec<String>,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_resume_limit")]
    pub resume_limit: u32,
}

fn default_true() -> bool {
    true
}

fn default_catalog_timeout_secs() -> u64 {
    30
}

fn default_rating_timeout_secs() -> u64 {
    10
}

fn default_ttl_days() -> u32 {
    7
}

fn default_daily_limit() -> u32 {
    1000
}

fn default_error_limit() -> u32 {
    10
}

fn default_interval_minutes() -> u64 {
    30
}

fn default_page_size() -> u32 {
    500
}

fn default_max_pages() -> u32 {
    40
}

fn default_resume_limit() -> u32 {
    100
}

impl Default for RatingsConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_ttl_days(),
            daily_limit: default_daily_limit(),
            error_limit: default_error_limit(),
            timeout_secs: default_rating_timeout_secs(),
        }
    }
}

pub fn default_sync_config() -> SyncConfig {
    SyncConfig {
        interval_minutes: default_interval_minutes(),
        sync_on_startup: default_true(),
        allowed_subjects: Vec::new(),
        page_size: default_page_size(),
        max_pages: default_max_pages(),
        resume_limit: default_resume_limit(),
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        default_sync_config()
    }
}

impl SyncConfig {
    /// Whether a subject passes the allow-list (matched by id or display name)
    pub fn is_subject_allowed(&self, id: &str, name: &str) -> bool {
        self.allowed_subjects.is_empty()
            || self
                .allowed_subjects
                .iter()
                .any(|allowed| allowed == id || allowed == name)
    }
}

impl Config {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            catalog: CatalogConfig {
                server_url: server_url.into(),
                timeout_secs: default_catalog_timeout_secs(),
            },
            ratings: RatingsConfig::default(),
            sync: default_sync_config(),
        }
    }

    pub fn load_from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &PathBuf) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.catalog.server_url.trim().is_empty() {
            return Err(anyhow::anyhow!("catalog.server_url is required and cannot be empty"));
        }
        if !self.catalog.server_url.starts_with("http://") && !self.catalog.server_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "catalog.server_url must start with http:// or https://: {}",
                self.catalog.server_url
            ));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(anyhow::anyhow!("catalog.timeout_secs must be positive"));
        }
        if self.ratings.ttl_days == 0 {
            return Err(anyhow::anyhow!("ratings.ttl_days must be positive"));
        }
        if self.ratings.daily_limit == 0 {
            return Err(anyhow::anyhow!("ratings.daily_limit must be positive"));
        }
        if self.sync.page_size == 0 {
            return Err(anyhow::anyhow!("sync.page_size must be positive"));
        }
        if self.sync.max_pages == 0 {
            return Err(anyhow::anyhow!("sync.max_pages must be positive"));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn catalog_base_url(&self) -> String {
        self.catalog.server_url.trim_end_matches('/').to_string()
    }
}
