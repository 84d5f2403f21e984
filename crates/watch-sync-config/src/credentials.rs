use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

const CATALOG_API_KEY: &str = "catalog_api_key";
const RATING_API_KEYS: &str = "rating_api_keys";
const RATING_KEYS_UPDATED: &str = "rating_api_keys_updated";

/// Environment overrides, checked before the credentials file
const CATALOG_API_KEY_ENV: &str = "PLAYLEDGER_CATALOG_API_KEY";
const RATING_API_KEYS_ENV: &str = "PLAYLEDGER_RATING_API_KEYS";

#[derive(Debug, Serialize, Deserialize, Default)]
struct CredentialsData {
    #[serde(flatten)]
    data: HashMap<String, String>,
}

pub struct CredentialStore {
    path: PathBuf,
    credentials: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            credentials: HashMap::new(),
        }
    }

    pub fn load(&mut self) -> Result<()> {
        if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)?;
            let creds_data: CredentialsData = toml::from_str(&content)?;
            self.credentials = creds_data.data;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let creds_data = CredentialsData {
            data: self.credentials.clone(),
        };
        let content = toml::to_string_pretty(&creds_data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&String> {
        self.credentials.get(key)
    }

    pub fn set(&mut self, key: String, value: String) {
        self.credentials.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) {
        self.credentials.remove(key);
    }

    pub fn get_catalog_api_key(&self) -> Option<String> {
        std::env::var(CATALOG_API_KEY_ENV)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.get(CATALOG_API_KEY).cloned())
    }

    pub fn set_catalog_api_key(&mut self, key: String) {
        self.set(CATALOG_API_KEY.to_string(), key);
    }

    /// Rating provider keys in rotation order. Blank entries are dropped.
    pub fn get_rating_api_keys(&self) -> Vec<String> {
        let raw = std::env::var(RATING_API_KEYS_ENV)
            .ok()
            .filter(|keys| !keys.trim().is_empty())
            .or_else(|| self.get(RATING_API_KEYS).cloned())
            .unwrap_or_default();
        split_keys(&raw)
    }

    pub fn set_rating_api_keys(&mut self, keys: &[String]) {
        self.set(RATING_API_KEYS.to_string(), keys.join(","));
        self.set(RATING_KEYS_UPDATED.to_string(), Utc::now().to_rfc3339());
    }

    pub fn get_rating_keys_updated(&self) -> Option<DateTime<Utc>> {
        self.get(RATING_KEYS_UPDATED)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    // Helper method to get all keys (for clearing)
    pub fn get_all_keys(&self) -> Vec<String> {
        self.credentials.keys().cloned().collect()
    }
}

fn split_keys(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|key| key.trim())
        .filter(|key| !key.is_empty())
        .map(|key| key.to_string())
        .collect()
}
