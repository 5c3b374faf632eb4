//! Execution status polling.
//!
//! [`ExecutionPoller`] drives one background task per tracked execution:
//!
//! ```text
//! Idle --start--> Polling --terminal status--> Success
//!                    |
//!                    +--retries exhausted--> Error
//! ```
//!
//! Each tick asks for the lightweight status. Non-terminal statuses schedule
//! the next tick after the configured interval; a terminal status triggers a
//! single fetch of the full record. Failed ticks back off exponentially until
//! `max_retries` consecutive failures, which ends polling in [`PollState::Error`].
//!
//! State is published through a `watch` channel ([`ExecutionPoller::subscribe`])
//! and transitions through a `broadcast` channel ([`ExecutionPoller::events`]).

mod poller;
mod state;

pub use poller::ExecutionPoller;
pub use state::{PollEvent, PollSnapshot, PollState};

use std::time::Duration;

use async_trait::async_trait;

use crate::client::Client;
use crate::config::PollingConfig;
use crate::error::Result;
use crate::flows::{Execution, ExecutionStatusResponse};

/// Backend queried by a poller.
#[async_trait]
pub trait ExecutionSource: Send + Sync {
    async fn execution_status(&self, execution_id: &str) -> Result<ExecutionStatusResponse>;

    async fn execution(&self, execution_id: &str) -> Result<Execution>;
}

#[async_trait]
impl ExecutionSource for Client {
    async fn execution_status(&self, execution_id: &str) -> Result<ExecutionStatusResponse> {
        self.executions().status(execution_id).await
    }

    async fn execution(&self, execution_id: &str) -> Result<Execution> {
        self.executions().get(execution_id).await
    }
}

/// Timing of a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between ticks that saw a non-terminal status.
    pub interval: Duration,
    /// Consecutive failures after which polling gives up.
    pub max_retries: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_retries: 3,
        }
    }
}

impl From<&PollingConfig> for PollerConfig {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            max_retries: config.max_retries,
        }
    }
}

impl PollerConfig {
    /// Delay before retrying after the `failures`-th consecutive failure:
    /// `interval * 2^(failures - 1)`.
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 1u32
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.interval.saturating_mul(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_failure() {
        let config = PollerConfig::default();
        assert_eq!(config.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(config.backoff_delay(3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_saturates() {
        let config = PollerConfig {
            interval: Duration::from_secs(1),
            max_retries: 100,
        };
        assert_eq!(config.backoff_delay(40), Duration::from_secs(u64::from(u32::MAX)));
    }
}
