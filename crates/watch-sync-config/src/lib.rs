pub mod config;
pub mod credentials;
pub mod paths;

pub use config::{CatalogConfig, Config, RatingsConfig, SyncConfig, default_sync_config};
pub use credentials::CredentialStore;
pub use paths::{PathManager, container_base_path};
