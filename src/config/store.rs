//! Execution store backend selection

use serde::Deserialize;

use super::error::ValidationError;
use super::redis::RedisConfig;

/// Which ExecutionStateStore adapter to build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store; single-node deployments and tests
    #[default]
    Memory,
    /// Shared Redis store; required when several processes coordinate
    Redis,
}

/// Store configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default)]
    pub redis: RedisConfig,
}

impl StoreConfig {
    /// Validate store configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self.backend {
            StoreBackend::Memory => Ok(()),
            StoreBackend::Redis => self.redis.validate(),
        }
    }
}
