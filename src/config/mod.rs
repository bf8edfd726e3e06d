//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `TOOL_RELAY` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use tool_relay::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Barrier deadline: {:?}", config.coordinator.execution_timeout());
//! ```

mod coordinator;
mod error;
mod redis;
mod store;
mod telemetry;

pub use coordinator::CoordinatorConfig;
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use store::{StoreBackend, StoreConfig};
pub use telemetry::TelemetryConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Every section has defaults, so an empty environment yields a runnable
/// single-node configuration with the in-memory store.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Deadlines, retention, allocation and concurrency
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Execution store backend
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `TOOL_RELAY` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `TOOL_RELAY__COORDINATOR__EXECUTION_TIMEOUT_SECS=60` -> `coordinator.execution_timeout_secs = 60`
    /// - `TOOL_RELAY__STORE__BACKEND=redis` -> `store.backend = redis`
    /// - `TOOL_RELAY__STORE__REDIS__URL=...` -> `store.redis.url = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("TOOL_RELAY")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.coordinator.validate()?;
        self.store.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}
