//! Service settings
//!
//! Loaded once at start-up from built-in defaults, an optional `grid-sync.{toml,yaml,json}`
//! file, then environment variables (a `.env` file is read first). Later sources win.

use std::time::Duration;

use bybit_client::BybitClientConfig;
use config::{builder::DefaultState, Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Staging,
    Production,
}

#[derive(Clone, Deserialize, Validate)]
pub struct Settings {
    #[validate(length(min = 1))]
    pub app_name: String,
    pub environment: AppEnvironment,
    pub log_level: String,
    #[validate(range(min = 1))]
    pub port: u16,

    #[validate(length(min = 1))]
    pub database_url: String,
    #[validate(range(min = 1, max = 100))]
    pub database_max_connections: u32,
    #[validate(range(min = 1))]
    pub database_acquire_timeout_secs: u64,

    #[validate(length(min = 1))]
    pub bybit_secure_token: String,
    #[validate(length(min = 1))]
    pub bybit_device_id: String,
    #[validate(url)]
    pub bybit_base_url: String,
    #[validate(range(min = 1, max = 300))]
    pub bybit_timeout_secs: u64,
}

impl Settings {
    /// Read `.env`, the optional settings file and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        // Absent .env is normal outside local development
        let _ = dotenvy::dotenv();

        let config = Self::defaults()?
            .add_source(File::with_name("grid-sync").required(false))
            .add_source(Environment::default().try_parsing(true))
            .build()?;

        Self::from_config(config)
    }

    /// Deserialize and validate an already-assembled configuration
    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings
            .validate()
            .map_err(|errors| ConfigError::Message(format!("invalid settings: {errors}")))?;
        Ok(settings)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        Config::builder()
            .set_default("app_name", "Trading Bot Manager")?
            .set_default("environment", "development")?
            .set_default("log_level", "info")?
            .set_default("port", 8000)?
            .set_default("database_max_connections", 5)?
            .set_default("database_acquire_timeout_secs", 30)?
            .set_default("bybit_base_url", "https://api2.bybit.com")?
            .set_default("bybit_timeout_secs", 30)
    }

    pub fn bybit_client_config(&self) -> BybitClientConfig {
        BybitClientConfig::new(&self.bybit_secure_token, &self.bybit_device_id)
            .with_base_url(&self.bybit_base_url)
            .with_timeout(Duration::from_secs(self.bybit_timeout_secs))
    }

    pub fn is_production(&self) -> bool {
        self.environment == AppEnvironment::Production
    }
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("app_name", &self.app_name)
            .field("environment", &self.environment)
            .field("log_level", &self.log_level)
            .field("port", &self.port)
            .field("database_url", &"<redacted>")
            .field("database_max_connections", &self.database_max_connections)
            .field("database_acquire_timeout_secs", &self.database_acquire_timeout_secs)
            .field("bybit_secure_token", &"<redacted>")
            .field("bybit_device_id", &"<redacted>")
            .field("bybit_base_url", &self.bybit_base_url)
            .field("bybit_timeout_secs", &self.bybit_timeout_secs)
            .finish()
    }
}
