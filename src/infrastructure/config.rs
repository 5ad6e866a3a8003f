//! Configuration management
//!
//! Values are layered with the `config` crate:
//! 1. built-in defaults (`AppConfig::default()`)
//! 2. an optional file (format picked from the extension)
//! 3. `PROFILE_MAINTAINER__SECTION__KEY` environment variables

use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::application::{MaintenanceSettings, RetryPolicy, WeeklySchedule};

pub const APP_DIR_NAME: &str = "profile-maintainer";
pub const ENV_PREFIX: &str = "PROFILE_MAINTAINER";

/// Default configuration values
pub mod defaults {
    pub const BIND_ADDRESS: &str = "127.0.0.1:8080";
    pub const DATABASE_FILE: &str = "maintenance.db";
    pub const MAX_DB_CONNECTIONS: u32 = 5;

    pub const WEEKDAY: &str = "monday";
    pub const TIME_OF_DAY: &str = "03:30";
    pub const UTC_OFFSET_HOURS: i32 = 0;
    pub const MAX_ATTEMPTS: u32 = crate::application::retry::defaults::MAX_ATTEMPTS;
    pub const SHORT_BACKOFF_SECS: u64 = crate::application::retry::defaults::SHORT_BACKOFF_SECS;
    pub const LONG_BACKOFF_SECS: u64 = crate::application::retry::defaults::LONG_BACKOFF_SECS;
    pub const INTER_ACCOUNT_DELAY_SECS: u64 =
        crate::application::settings::defaults::INTER_ACCOUNT_DELAY_SECS;
    pub const RESCHEDULE_AFTER_DAYS: i64 =
        crate::application::settings::defaults::RESCHEDULE_AFTER_DAYS;

    pub const SENDER_NAME: &str = "Profile Automation System";
    pub const NOTIFICATION_TIMEOUT_SECS: u64 = 30;

    pub const SITE_DRIVER_ENDPOINT: &str = "http://127.0.0.1:8700";
    /// One profile refresh drives a real browser through several pages.
    pub const SITE_DRIVER_TIMEOUT_SECS: u64 = 900;

    pub const LOG_LEVEL: &str = "info";
    pub const MAX_LOG_FILES: usize = 10;
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub maintenance: MaintenanceConfig,
    pub notifications: NotificationConfig,
    pub site_driver: SiteDriverConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Bearer token required on every control endpoint.
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: defaults::BIND_ADDRESS.to_string(),
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        let path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("data"))
            .join(APP_DIR_NAME)
            .join(defaults::DATABASE_FILE);
        Self {
            url: format!("sqlite://{}", path.display()),
            max_connections: defaults::MAX_DB_CONNECTIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Day of the weekly run, e.g. "monday" or "Mon"
    pub weekday: String,
    /// Local time of the weekly run as "HH:MM"
    pub time_of_day: String,
    pub utc_offset_hours: i32,
    pub max_attempts: u32,
    pub short_backoff_secs: u64,
    pub long_backoff_secs: u64,
    pub inter_account_delay_secs: u64,
    pub reschedule_after_days: i64,
    /// Arm the weekly trigger when the server starts
    pub autostart: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            weekday: defaults::WEEKDAY.to_string(),
            time_of_day: defaults::TIME_OF_DAY.to_string(),
            utc_offset_hours: defaults::UTC_OFFSET_HOURS,
            max_attempts: defaults::MAX_ATTEMPTS,
            short_backoff_secs: defaults::SHORT_BACKOFF_SECS,
            long_backoff_secs: defaults::LONG_BACKOFF_SECS,
            inter_account_delay_secs: defaults::INTER_ACCOUNT_DELAY_SECS,
            reschedule_after_days: defaults::RESCHEDULE_AFTER_DAYS,
            autostart: false,
        }
    }
}

impl MaintenanceConfig {
    pub fn schedule(&self) -> Result<WeeklySchedule, ConfigError> {
        let weekday: Weekday = self
            .weekday
            .parse()
            .map_err(|_| ConfigError::invalid(format!("unknown weekday '{}'", self.weekday)))?;
        let time = NaiveTime::parse_from_str(&self.time_of_day, "%H:%M").map_err(|e| {
            ConfigError::invalid(format!("time_of_day '{}': {e}", self.time_of_day))
        })?;
        let offset = FixedOffset::east_opt(self.utc_offset_hours * 3600).ok_or_else(|| {
            ConfigError::invalid(format!(
                "utc_offset_hours {} is out of range",
                self.utc_offset_hours
            ))
        })?;
        Ok(WeeklySchedule::new(weekday, time, offset))
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            short_backoff: Duration::from_secs(self.short_backoff_secs),
            long_backoff: Duration::from_secs(self.long_backoff_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    /// Write notifications to the log only
    #[default]
    Log,
    /// POST notifications to a mail relay
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub operator_email: Option<String>,
    pub sender_name: String,
    pub channel: NotificationChannel,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            operator_email: None,
            sender_name: defaults::SENDER_NAME.to_string(),
            channel: NotificationChannel::Log,
            webhook_url: None,
            timeout_secs: defaults::NOTIFICATION_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteDriverConfig {
    pub endpoint: String,
    pub request_timeout_secs: u64,
}

impl Default for SiteDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::SITE_DRIVER_ENDPOINT.to_string(),
            request_timeout_secs: defaults::SITE_DRIVER_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Base64-encoded 32-byte key for sealing account secrets
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; defaults to `logs/` next to the executable
    pub directory: Option<PathBuf>,

    /// Number of log files to keep (older files are deleted on startup)
    pub max_files: usize,

    /// Hours east of UTC used for log timestamps
    pub utc_offset_hours: i32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            directory: None,
            max_files: defaults::MAX_LOG_FILES,
            utc_offset_hours: defaults::UTC_OFFSET_HOURS,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.maintenance.max_attempts == 0 {
            return Err(ConfigError::invalid("maintenance.max_attempts must be at least 1"));
        }
        if self.maintenance.reschedule_after_days <= 0 {
            return Err(ConfigError::invalid(
                "maintenance.reschedule_after_days must be positive",
            ));
        }
        if !(-14..=14).contains(&self.maintenance.utc_offset_hours) {
            return Err(ConfigError::invalid(
                "maintenance.utc_offset_hours must be within -14..=14",
            ));
        }
        self.maintenance.schedule()?;

        if self.notifications.channel == NotificationChannel::Webhook
            && self
                .notifications
                .webhook_url
                .as_deref()
                .is_none_or(str::is_empty)
        {
            return Err(ConfigError::invalid(
                "notifications.webhook_url is required for the webhook channel",
            ));
        }

        if let Some(key) = self.security.secret_key.as_deref() {
            let decoded = STANDARD
                .decode(key.trim())
                .map_err(|e| ConfigError::invalid(format!("security.secret_key: {e}")))?;
            if decoded.len() != 32 {
                return Err(ConfigError::invalid(format!(
                    "security.secret_key must decode to 32 bytes, got {}",
                    decoded.len()
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid("database.max_connections must be at least 1"));
        }
        Ok(())
    }

    /// Settings handed to the maintenance controller.
    pub fn maintenance_settings(&self) -> Result<MaintenanceSettings, ConfigError> {
        Ok(MaintenanceSettings {
            schedule: self.maintenance.schedule()?,
            retry: self.maintenance.retry_policy(),
            inter_account_delay: Duration::from_secs(self.maintenance.inter_account_delay_secs),
            reschedule_after: chrono::Duration::days(self.maintenance.reschedule_after_days),
            operator_email: self
                .notifications
                .operator_email
                .clone()
                .filter(|address| !address.trim().is_empty()),
        })
    }
}

/// Loads and persists `AppConfig`.
pub struct ConfigManager {
    path: Option<PathBuf>,
}

impl ConfigManager {
    /// `None` uses the default location when a file exists there.
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join("config.json"))
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.path.clone().or_else(Self::default_config_path)
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?);

        if let Some(path) = self.config_path() {
            // An explicitly given file must exist; the default one is optional.
            let required = self.path.is_some();
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path).required(required));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the default configuration as pretty JSON unless a file exists.
    pub fn write_default(path: &Path) -> anyhow::Result<bool> {
        if path.exists() {
            return Ok(false);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&AppConfig::default())?;
        std::fs::write(path, json)?;
        info!("Wrote default configuration to {}", path.display());
        Ok(true)
    }
}
