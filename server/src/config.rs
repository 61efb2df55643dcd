//! Process configuration.
//!
//! Built-in defaults, overridden by `WHITEBOARD_*` environment variables
//! (a `.env` file is loaded into the environment by the binary first).

use config::{Config, ConfigError, Environment, Source};
use serde::Deserialize;
use std::time::Duration;
use whiteboard_system::RegistryConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Number of independent session loops.
    pub shards: usize,
    pub session_capacity: usize,
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:5000".into(),
            shards: 4,
            session_capacity: whiteboard_system::DEFAULT_CAPACITY,
            retention_secs: whiteboard_system::DEFAULT_RETENTION.as_secs(),
            sweep_interval_secs: 60 * 60,
            heartbeat_interval_secs: 5,
            client_timeout_secs: 15,
            allowed_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(
            Environment::with_prefix("WHITEBOARD")
                .prefix_separator("_")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("allowed_origins"),
        )
    }

    fn from_source<S>(source: S) -> Result<Self, ConfigError>
    where
        S: Source + Send + Sync + 'static,
    {
        let defaults = Self::default();
        let config: Self = Config::builder()
            .set_default("bind_addr", defaults.bind_addr)?
            .set_default("shards", defaults.shards as u64)?
            .set_default("session_capacity", defaults.session_capacity as u64)?
            .set_default("retention_secs", defaults.retention_secs)?
            .set_default("sweep_interval_secs", defaults.sweep_interval_secs)?
            .set_default("heartbeat_interval_secs", defaults.heartbeat_interval_secs)?
            .set_default("client_timeout_secs", defaults.client_timeout_secs)?
            .set_default("allowed_origins", defaults.allowed_origins)?
            .add_source(source)
            .build()?
            .try_deserialize()?;

        if config.shards == 0 {
            return Err(ConfigError::Message("shards must be at least 1".into()));
        }
        if config.session_capacity == 0 {
            return Err(ConfigError::Message(
                "session_capacity must be at least 1".into(),
            ));
        }
        Ok(config)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig {
            capacity: self.session_capacity,
            retention: Duration::from_secs(self.retention_secs),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}
