//! Engine configuration
//!
//! Defines the tunable parameters of the engine: how many jobs may solve
//! concurrently and how the solver paces its progress reports.

use std::time::Duration;

/// Engine configuration
///
/// Intervals and bounds are configurable to allow tuning for different
/// workloads (many small jobs vs few long-running searches).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Max jobs solving in parallel; further submissions queue
    pub max_parallel_jobs: usize,

    /// Minimum pause between progress emissions for one job.
    /// Zero means every improvement is reported.
    pub progress_interval: Duration,
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - PLATENEST_MAX_PARALLEL_JOBS (optional, default: 2)
    /// - PLATENEST_PROGRESS_INTERVAL_MS (optional, default: 0)
    pub fn from_env() -> Self {
        let max_parallel_jobs = std::env::var("PLATENEST_MAX_PARALLEL_JOBS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(2);

        let progress_interval = std::env::var("PLATENEST_PROGRESS_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);

        Self {
            max_parallel_jobs,
            progress_interval,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_parallel_jobs == 0 {
            return Err("max_parallel_jobs must be at least 1".to_string());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel_jobs: 2,
            progress_interval: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = EngineConfig {
            max_parallel_jobs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
