use crate::output::Output;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use std::fs;
use std::path::Path;
use watch_sync_config::{CredentialStore, PathManager};

pub fn run_clear(all: bool, ledger: bool, credentials: bool, output: &Output) -> Result<()> {
    let paths = PathManager::default();

    if !(all || ledger || credentials) {
        output.warn("No clear option specified. Use --ledger, --credentials, or --all");
        output.println("\nExample: playledger clear --ledger");
        return Ok(());
    }

    if all || ledger {
        remove_file(&paths.ledger_file(), "ledger", output)?;
    }
    if all || credentials {
        clear_credentials(&paths, output)?;
    }
    Ok(())
}

fn remove_file(path: &Path, what: &str, output: &Output) -> Result<()> {
    if !path.exists() {
        output.info(format!("No {} found at {}", what, path.display()));
        return Ok(());
    }
    fs::remove_file(path).map_err(|e| eyre!("Failed to remove {} at {}: {}", what, path.display(), e))?;
    output.success(format!("Removed {}: {}", what, path.display()));
    Ok(())
}

fn clear_credentials(paths: &PathManager, output: &Output) -> Result<()> {
    let credentials_file = paths.credentials_file();
    let mut store = CredentialStore::new(credentials_file.clone());
    store
        .load()
        .map_err(|e| eyre!("Failed to load credentials from {}: {}", credentials_file.display(), e))?;
    let keys = store.get_all_keys();
    if keys.is_empty() {
        output.info("No stored credentials to clear");
        return Ok(());
    }
    for key in &keys {
        store.remove(key);
    }
    store
        .save()
        .map_err(|e| eyre!("Failed to save credentials: {}", e))?;
    output.success(format!("Cleared {} stored credentials", keys.len()));
    Ok(())
}
