//! Materialization worker configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerConfig {
    /// Deliveries processed concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Age after which a `processing` job is considered abandoned
    #[serde(default = "default_stale_job_timeout")]
    pub stale_job_timeout_secs: u64,

    /// Interval between stale job sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl WorkerConfig {
    pub fn stale_job_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_job_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::MustBePositive("worker.concurrency"));
        }
        if self.stale_job_timeout_secs == 0 {
            return Err(ValidationError::MustBePositive("worker.stale_job_timeout_secs"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ValidationError::MustBePositive("worker.sweep_interval_secs"));
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            stale_job_timeout_secs: default_stale_job_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

fn default_stale_job_timeout() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.stale_job_timeout(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let config = WorkerConfig {
            concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = WorkerConfig {
            sweep_interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
