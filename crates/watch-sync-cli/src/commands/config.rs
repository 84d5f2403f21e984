use crate::output::Output;
use crate::ConfigCommands;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde_json::json;
use watch_sync_config::{Config, CredentialStore, PathManager};

pub fn run_config(cmd: ConfigCommands, output: &Output) -> Result<()> {
    let paths = PathManager::default();
    match cmd {
        ConfigCommands::Show { full } => show(&paths, full, output),
        ConfigCommands::Init { server_url, force } => init(&paths, server_url, force, output),
        ConfigCommands::SetKeys {
            catalog_key,
            rating_keys,
        } => set_keys(&paths, catalog_key, rating_keys, output),
    }
}

fn mask(secret: &str, full: bool) -> String {
    if full {
        return secret.to_string();
    }
    let visible: String = secret.chars().take(4).collect();
    format!("{}****", visible)
}

fn load_credentials(paths: &PathManager) -> Result<CredentialStore> {
    let credentials_file = paths.credentials_file();
    let mut credentials = CredentialStore::new(credentials_file.clone());
    credentials
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    Ok(credentials)
}

fn show(paths: &PathManager, full: bool, output: &Output) -> Result<()> {
    let config = super::load_config(paths)?;
    let credentials = load_credentials(paths)?;
    let catalog_key = credentials.get_catalog_api_key().map(|k| mask(&k, full));
    let rating_keys: Vec<String> = credentials
        .get_rating_api_keys()
        .iter()
        .map(|k| mask(k, full))
        .collect();

    output.data(&json!({
        "config_file": paths.config_file(),
        "ledger_file": paths.ledger_file(),
        "config": config,
        "catalog_api_key": catalog_key,
        "rating_api_keys": rating_keys,
    }));

    let allowed = if config.sync.allowed_subjects.is_empty() {
        "all".to_string()
    } else {
        config.sync.allowed_subjects.join(", ")
    };
    output.table(
        &["Setting", "Value"],
        vec![
            vec!["Config file".to_string(), paths.config_file().display().to_string()],
            vec!["Ledger file".to_string(), paths.ledger_file().display().to_string()],
            vec!["Server URL".to_string(), config.catalog_base_url()],
            vec!["Server API key".to_string(), catalog_key.unwrap_or_else(|| "not set".to_string())],
            vec!["Rating keys".to_string(), format!("{} configured", rating_keys.len())],
            vec![
                "Rating keys updated".to_string(),
                credentials
                    .get_rating_keys_updated()
                    .map_or("never".to_string(), |t| t.to_rfc3339()),
            ],
            vec!["Rating cache TTL".to_string(), format!("{} days", config.ratings.ttl_days)],
            vec!["Daily limit per key".to_string(), config.ratings.daily_limit.to_string()],
            vec!["Sync interval".to_string(), format!("{} minutes", config.sync.interval_minutes)],
            vec!["Sync on startup".to_string(), config.sync.sync_on_startup.to_string()],
            vec!["Allowed subjects".to_string(), allowed],
        ],
    );
    Ok(())
}

fn init(paths: &PathManager, server_url: String, force: bool, output: &Output) -> Result<()> {
    let config_file = paths.config_file();
    if config_file.exists() && !force {
        return Err(eyre!(
            "Configuration already exists at {}. Use --force to overwrite",
            config_file.display()
        ));
    }
    let config = Config::new(server_url);
    config
        .validate()
        .map_err(|e| eyre!("Configuration validation failed: {}", e))?;
    config
        .save_to_file(&config_file)
        .map_err(|e| eyre!("Failed to write config to {}: {}", config_file.display(), e))?;
    output.success(format!("Configuration written to {}", config_file.display()));
    Ok(())
}

fn set_keys(
    paths: &PathManager,
    catalog_key: Option<String>,
    rating_keys: Option<Vec<String>>,
    output: &Output,
) -> Result<()> {
    if catalog_key.is_none() && rating_keys.is_none() {
        output.warn("Nothing to set. Use --catalog-key and/or --rating-keys");
        return Ok(());
    }
    let mut credentials = load_credentials(paths)?;
    if let Some(key) = catalog_key {
        credentials.set_catalog_api_key(key.trim().to_string());
    }
    if let Some(keys) = rating_keys {
        let keys: Vec<String> = keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        credentials.set_rating_api_keys(&keys);
        output.info(format!("{} rating keys stored", keys.len()));
    }
    credentials
        .save()
        .map_err(|e| eyre!("Failed to save credentials: {}", e))?;
    output.success(format!("Credentials saved to {}", paths.credentials_file().display()));
    Ok(())
}
