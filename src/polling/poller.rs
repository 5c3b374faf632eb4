use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use super::{ExecutionSource, PollEvent, PollSnapshot, PollState, PollerConfig};
use crate::error::Error;
use crate::flows::Execution;

const EVENT_BUFFER: usize = 32;

/// Tracks one execution until it reaches a terminal status.
///
/// Setting a target while enabled starts polling; changing the target or
/// disabling stops it. Dropping the poller cancels its task.
///
/// # Example
///
/// ```rust,no_run
/// use agentflow::Client;
/// use agentflow::polling::{ExecutionPoller, PollerConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = Client::new("http://localhost:2024")?;
/// let mut poller = ExecutionPoller::new(client, PollerConfig::default());
/// poller.set_target(Some("exec-123".to_string()));
///
/// let done = poller.wait().await;
/// println!("{:?}: {:?}", done.state, done.current_status);
/// # Ok(())
/// # }
/// ```
pub struct ExecutionPoller<S> {
    source: Arc<S>,
    config: PollerConfig,
    target: Option<String>,
    enabled: bool,
    snapshot: Arc<watch::Sender<PollSnapshot>>,
    events: broadcast::Sender<PollEvent>,
    task: Option<DropGuard>,
}

impl<S> fmt::Debug for ExecutionPoller<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionPoller")
            .field("config", &self.config)
            .field("target", &self.target)
            .field("enabled", &self.enabled)
            .field("state", &self.snapshot.borrow().state)
            .finish_non_exhaustive()
    }
}

impl<S: ExecutionSource + 'static> ExecutionPoller<S> {
    pub fn new(source: S, config: PollerConfig) -> Self {
        Self::from_shared(Arc::new(source), config)
    }

    /// Poll through a source shared with other owners.
    pub fn from_shared(source: Arc<S>, config: PollerConfig) -> Self {
        let (snapshot, _) = watch::channel(PollSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            source,
            config,
            target: None,
            enabled: true,
            snapshot: Arc::new(snapshot),
            events,
            task: None,
        }
    }

    pub fn config(&self) -> PollerConfig {
        self.config
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start polling the current target from a clean slate.
    ///
    /// Returns `false` when disabled or without a target. Must be called
    /// inside a tokio runtime.
    pub fn start(&mut self) -> bool {
        let Some(execution_id) = self.target.clone().filter(|_| self.enabled) else {
            return false;
        };
        self.cancel_task();

        self.snapshot.send_replace(PollSnapshot {
            state: PollState::Polling,
            execution_id: Some(execution_id.clone()),
            ..PollSnapshot::default()
        });

        let cancel = CancellationToken::new();
        tokio::spawn(poll_loop(
            Arc::clone(&self.source),
            execution_id,
            self.config,
            cancel.clone(),
            Arc::clone(&self.snapshot),
            self.events.clone(),
        ));
        self.task = Some(cancel.drop_guard());
        true
    }

    /// Stop polling. A finished state stays visible until the next start.
    pub fn stop(&mut self) {
        self.cancel_task();
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.state == PollState::Polling {
                snapshot.state = PollState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Track another execution. Stops the current one; starts the new one if enabled.
    pub fn set_target(&mut self, execution_id: Option<String>) {
        if self.target == execution_id {
            return;
        }
        self.stop();
        self.target = execution_id;
        if self.target.is_some() {
            self.start();
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled == enabled {
            return;
        }
        self.enabled = enabled;
        if enabled {
            self.start();
        } else {
            self.stop();
        }
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<PollEvent> {
        self.events.subscribe()
    }

    /// Wait until the poller leaves [`PollState::Polling`].
    pub async fn wait(&self) -> PollSnapshot {
        let mut rx = self.snapshot.subscribe();
        match rx.wait_for(|snapshot| !snapshot.is_polling()).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Dropping the guard cancels the task before any later publish.
    fn cancel_task(&mut self) {
        self.task = None;
    }
}

/// Apply `update` unless the task was cancelled. Returns whether it applied.
fn publish(
    snapshot: &watch::Sender<PollSnapshot>,
    cancel: &CancellationToken,
    update: impl FnOnce(&mut PollSnapshot) -> bool,
) -> bool {
    let mut applied = false;
    snapshot.send_if_modified(|current| {
        if cancel.is_cancelled() {
            return false;
        }
        applied = true;
        update(current)
    });
    applied
}

async fn poll_loop<S: ExecutionSource>(
    source: Arc<S>,
    execution_id: String,
    config: PollerConfig,
    cancel: CancellationToken,
    snapshot: Arc<watch::Sender<PollSnapshot>>,
    events: broadcast::Sender<PollEvent>,
) {
    let mut failures: u32 = 0;

    loop {
        let tick = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            tick = poll_once(source.as_ref(), &execution_id, &cancel, &snapshot, &events) => tick,
        };

        let delay = match tick {
            Ok(None) => {
                if failures > 0 {
                    failures = 0;
                    publish(&snapshot, &cancel, |s| {
                        s.retry_count = 0;
                        true
                    });
                }
                config.interval
            }
            Ok(Some(execution)) => {
                let status = execution.status;
                let applied = publish(&snapshot, &cancel, |s| {
                    s.state = PollState::Success;
                    s.execution = Some(execution.clone());
                    s.error = None;
                    s.retry_count = 0;
                    true
                });
                if applied {
                    info!(
                        name: "poll.completed",
                        execution_id = %execution_id,
                        status = %status,
                        "Execution finished"
                    );
                    let _ = events.send(PollEvent::Completed(Box::new(execution)));
                }
                return;
            }
            Err(err) => {
                failures += 1;
                if failures >= config.max_retries {
                    let exhausted = Error::RetriesExhausted {
                        attempts: failures,
                        message: err.to_string(),
                    };
                    let message = exhausted.to_string();
                    let applied = publish(&snapshot, &cancel, |s| {
                        s.state = PollState::Error;
                        s.error = Some(message.clone());
                        s.retry_count = failures;
                        true
                    });
                    if applied {
                        warn!(
                            name: "poll.exhausted",
                            execution_id = %execution_id,
                            attempts = failures,
                            error = %err,
                            "Polling gave up"
                        );
                        let _ = events.send(PollEvent::Failed(message));
                    }
                    return;
                }
                let delay = config.backoff_delay(failures);
                warn!(
                    name: "poll.retry",
                    execution_id = %execution_id,
                    attempt = failures,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Polling attempt failed, retrying"
                );
                publish(&snapshot, &cancel, |s| {
                    s.retry_count = failures;
                    true
                });
                delay
            }
        };

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
    }
}

/// One tick. `Ok(Some)` carries the full record of a finished execution.
async fn poll_once<S: ExecutionSource + ?Sized>(
    source: &S,
    execution_id: &str,
    cancel: &CancellationToken,
    snapshot: &watch::Sender<PollSnapshot>,
    events: &broadcast::Sender<PollEvent>,
) -> crate::error::Result<Option<Execution>> {
    let status = source.execution_status(execution_id).await?.status;

    let mut changed = false;
    publish(snapshot, cancel, |s| {
        changed = s.current_status != Some(status);
        s.current_status = Some(status);
        changed
    });
    if changed {
        debug!(execution_id, status = %status, "Execution status changed");
        let _ = events.send(PollEvent::StatusChanged(status));
    }

    if !status.is_terminal() {
        return Ok(None);
    }
    source.execution(execution_id).await.map(Some)
}
