use serde::Serialize;

use crate::flows::{Execution, ExecutionStatus};

/// Lifecycle of a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    #[default]
    Idle,
    Polling,
    /// A terminal status was observed and the full record fetched.
    Success,
    /// Retries ran out.
    Error,
}

impl PollState {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// What a poller currently knows about its execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PollSnapshot {
    pub state: PollState,
    pub execution_id: Option<String>,
    pub current_status: Option<ExecutionStatus>,
    /// Full record, set once a terminal status is seen.
    pub execution: Option<Execution>,
    pub error: Option<String>,
    /// Consecutive failed attempts in the current streak.
    pub retry_count: u32,
}

impl PollSnapshot {
    pub fn is_polling(&self) -> bool {
        self.state == PollState::Polling
    }
}

/// Discrete notifications, one per transition.
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    /// Sent when a tick observes a status different from the previous tick.
    /// Repeated identical statuses are not re-announced.
    StatusChanged(ExecutionStatus),
    Completed(Box<Execution>),
    Failed(String),
}
