//! Infrastructure layer - configuration, logging, storage and outside services

pub mod account_repository;
pub mod config;
pub mod database_connection;
pub mod logging;
pub mod notifiers;
pub mod outcome_repository;
pub mod secret_vault;
pub mod site_driver_client;

pub use account_repository::SqliteAccountRepository;
pub use config::{AppConfig, ConfigError, ConfigManager, NotificationChannel};
pub use database_connection::DatabaseConnection;
pub use logging::{init_logging_with_config, log_system_info};
pub use notifiers::{LogNotifier, WebhookNotifier};
pub use outcome_repository::SqliteOutcomeRepository;
pub use secret_vault::{ChaChaSecretVault, VaultError};
pub use site_driver_client::HttpSiteDriver;
