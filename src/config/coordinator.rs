//! Coordinator configuration (deadlines, retention, allocation, concurrency)

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Timing and sizing knobs for the tool-call coordinator
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Barrier deadline after an execution begins
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_secs: u64,

    /// Lifetime of every key while an execution is live
    #[serde(default = "default_execution_ttl")]
    pub execution_ttl_secs: u64,

    /// Lifetime of an execution's keys after it finishes
    #[serde(default = "default_completed_retention")]
    pub completed_retention_secs: u64,

    /// Interval of the completion sweep over active executions
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Attempts at the index counter before falling back
    #[serde(default = "default_allocation_retries")]
    pub allocation_retries: u32,

    /// Fixed delay between counter attempts
    #[serde(default = "default_allocation_retry_delay")]
    pub allocation_retry_delay_ms: u64,

    /// Slots probed forward from a taken candidate
    #[serde(default = "default_probe_limit")]
    pub probe_limit: u32,

    /// Tool calls executing at once across all executions
    #[serde(default = "default_max_concurrent_tools")]
    pub max_concurrent_tools: usize,
}

impl CoordinatorConfig {
    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }

    pub fn execution_ttl(&self) -> Duration {
        Duration::from_secs(self.execution_ttl_secs)
    }

    pub fn completed_retention(&self) -> Duration {
        Duration::from_secs(self.completed_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn allocation_retry_delay(&self) -> Duration {
        Duration::from_millis(self.allocation_retry_delay_ms)
    }

    /// Validate coordinator configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.execution_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive("execution_timeout_secs"));
        }
        if self.execution_ttl_secs <= self.execution_timeout_secs {
            return Err(ValidationError::TtlShorterThanTimeout);
        }
        if self.completed_retention_secs == 0 {
            return Err(ValidationError::MustBePositive("completed_retention_secs"));
        }
        if self.sweep_interval_ms == 0 {
            return Err(ValidationError::MustBePositive("sweep_interval_ms"));
        }
        if self.allocation_retries == 0 {
            return Err(ValidationError::MustBePositive("allocation_retries"));
        }
        if self.max_concurrent_tools == 0 {
            return Err(ValidationError::MustBePositive("max_concurrent_tools"));
        }
        Ok(())
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            execution_timeout_secs: default_execution_timeout(),
            execution_ttl_secs: default_execution_ttl(),
            completed_retention_secs: default_completed_retention(),
            sweep_interval_ms: default_sweep_interval(),
            allocation_retries: default_allocation_retries(),
            allocation_retry_delay_ms: default_allocation_retry_delay(),
            probe_limit: default_probe_limit(),
            max_concurrent_tools: default_max_concurrent_tools(),
        }
    }
}

fn default_execution_timeout() -> u64 {
    120
}

fn default_execution_ttl() -> u64 {
    3600
}

fn default_completed_retention() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    1000
}

fn default_allocation_retries() -> u32 {
    3
}

fn default_allocation_retry_delay() -> u64 {
    25
}

fn default_probe_limit() -> u32 {
    50
}

fn default_max_concurrent_tools() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinator_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.execution_timeout(), Duration::from_secs(120));
        assert_eq!(config.execution_ttl(), Duration::from_secs(3600));
        assert_eq!(config.completed_retention(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_millis(1000));
        assert_eq!(config.allocation_retries, 3);
        assert_eq!(config.allocation_retry_delay(), Duration::from_millis(25));
        assert_eq!(config.probe_limit, 50);
        assert_eq!(config.max_concurrent_tools, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ttl_must_outlive_timeout() {
        let config = CoordinatorConfig {
            execution_timeout_secs: 600,
            execution_ttl_secs: 600,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::TtlShorterThanTimeout));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = CoordinatorConfig {
            execution_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::MustBePositive("execution_timeout_secs"))
        );
    }

    #[test]
    fn test_zero_probe_limit_is_allowed() {
        let config = CoordinatorConfig {
            probe_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"execution_timeout_secs": 30}"#).unwrap();
        assert_eq!(config.execution_timeout_secs, 30);
        assert_eq!(config.probe_limit, 50);
    }
}
