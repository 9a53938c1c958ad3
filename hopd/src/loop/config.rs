//! Task loop configuration

use std::time::Duration;

use crate::config::Config;

/// Bounds and retry settings for one task loop
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// Maximum Decide/Act/Observe cycles
    pub step_budget: u32,

    /// Consecutive failed decisions tolerated before the task fails
    pub oracle_retries: u32,

    /// Pause between failed decisions when the server gives no hint
    pub retry_delay: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            step_budget: 50,
            oracle_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for LoopConfig {
    fn from(config: &Config) -> Self {
        Self {
            step_budget: config.task.step_budget,
            oracle_retries: config.oracle.retries,
            retry_delay: Duration::from_millis(config.oracle.retry_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        let mut config = Config::default();
        config.task.step_budget = 9;
        config.oracle.retries = 2;
        config.oracle.retry_delay_ms = 250;

        let loop_config = LoopConfig::from(&config);
        assert_eq!(loop_config.step_budget, 9);
        assert_eq!(loop_config.oracle_retries, 2);
        assert_eq!(loop_config.retry_delay, Duration::from_millis(250));
    }
}
