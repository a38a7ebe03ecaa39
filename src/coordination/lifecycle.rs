//! The transfer-run lifecycle coordinator.
//!
//! One coordinator is created per run descriptor. It owns the heartbeat and
//! timeout timers, the run's message buffer, and the reporting sequence to
//! the tracking service. The run body executes inside the scope and is
//! abandoned if the scope's cancellation token fires.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::timer::{FaultSlot, Timer, TimerTask};
use crate::config::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_RUN_TIMEOUT};
use crate::error::ConnectorError;
use crate::logging::{MessageBuffer, RunLogger};
use crate::model::{RunDescriptor, RunState};
use crate::tracking::TrackingClient;

/// Timer settings for one run scope.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleOptions {
    pub heartbeat_interval: Duration,
    pub run_timeout: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
        }
    }
}

/// Result of running one coordinator scope.
///
/// `error` carries only the escaping error: a suppressed validation failure
/// leaves it `None` even though `final_state` is `Failed`.
#[derive(Debug)]
pub struct LifecycleOutcome {
    pub final_state: RunState,
    pub error: Option<ConnectorError>,
}

/// Handle given to the run body executing inside a scope.
#[derive(Clone)]
pub struct RunContext {
    pub descriptor: Arc<RunDescriptor>,
    pub logger: RunLogger,
    /// Fires when the scope is being cancelled (timeout or timer fault).
    /// Long-running body work should poll or select on this.
    pub cancel: CancellationToken,
}

/// Heartbeat tick: drain buffered messages and push them to the tracking
/// service, padding with a synthetic entry when the body has been silent so
/// the server-side update deadline keeps getting reset.
struct HeartbeatTask {
    run_name: String,
    interval: Duration,
    buffer: Arc<MessageBuffer>,
    logger: RunLogger,
    tracking: Option<Arc<dyn TrackingClient>>,
}

#[async_trait]
impl TimerTask for HeartbeatTask {
    async fn tick(&self) -> Result<(), ConnectorError> {
        if self.buffer.is_empty() {
            self.logger.info(format!(
                "processing... next update within {} second(s)",
                self.interval.as_secs()
            ));
        }

        let entries = self.buffer.drain();
        if let Some(tracking) = &self.tracking
            && !entries.is_empty()
        {
            tracking.submit_log_batch(&self.run_name, &entries).await?;
        }
        Ok(())
    }
}

/// Timeout tick: logs the overrun and aborts the scope through the timer's
/// fault path. Fires at most once; the timer halts after the error.
struct TimeoutTask {
    logger: RunLogger,
    timeout: Duration,
}

#[async_trait]
impl TimerTask for TimeoutTask {
    async fn tick(&self) -> Result<(), ConnectorError> {
        self.logger.error(format!(
            "transfer run timed out after {} second(s)",
            self.timeout.as_secs()
        ));
        Err(ConnectorError::DeadlineExceeded {
            timeout: self.timeout,
        })
    }
}

/// Scoped execution context for one transfer run.
pub struct LifecycleCoordinator {
    descriptor: Arc<RunDescriptor>,
    tracking: Option<Arc<dyn TrackingClient>>,
    logger: RunLogger,
    heartbeat: Timer,
    timeout: Timer,
    cancel: CancellationToken,
    fault: Arc<FaultSlot>,
    run_timeout: Duration,
}

impl LifecycleCoordinator {
    pub fn new(
        descriptor: RunDescriptor,
        tracking: Option<Arc<dyn TrackingClient>>,
        options: LifecycleOptions,
    ) -> Self {
        let descriptor = Arc::new(descriptor);
        let buffer = Arc::new(MessageBuffer::new());
        let logger = RunLogger::new(&descriptor.name, Arc::clone(&buffer));
        let cancel = CancellationToken::new();
        let fault = Arc::new(FaultSlot::new());

        let heartbeat_task = Arc::new(HeartbeatTask {
            run_name: descriptor.name.clone(),
            interval: options.heartbeat_interval,
            buffer,
            logger: logger.clone(),
            tracking: tracking.clone(),
        });
        let timeout_task = Arc::new(TimeoutTask {
            logger: logger.clone(),
            timeout: options.run_timeout,
        });

        let heartbeat = Timer::new(
            options.heartbeat_interval,
            heartbeat_task,
            cancel.clone(),
            Arc::clone(&fault),
        );
        let timeout = Timer::new(
            options.run_timeout,
            timeout_task,
            cancel.clone(),
            Arc::clone(&fault),
        );

        Self {
            descriptor,
            tracking,
            logger,
            heartbeat,
            timeout,
            cancel,
            fault,
            run_timeout: options.run_timeout,
        }
    }

    /// Run `body` inside the scope and return the outcome.
    ///
    /// Entry starts both timers and reports RUNNING; exit stops the timers,
    /// reports the terminal state exactly once, and decides suppression. The
    /// body future is dropped mid-flight if the scope is cancelled.
    pub async fn run<F, Fut>(self, body: F) -> LifecycleOutcome
    where
        F: FnOnce(RunContext) -> Fut,
        Fut: Future<Output = Result<(), ConnectorError>>,
    {
        let name = self.descriptor.name.clone();
        info!("[{}] [STARTING]", name);

        // Step 1 - start the heartbeat and run-timeout timers
        self.heartbeat.start();
        self.timeout.start();

        // Step 2 - explicitly notify the tracking service that the run is
        // starting; a failure here is the scope-triggering error and control
        // jumps straight to exit (timers still get cleaned up)
        if let Some(tracking) = &self.tracking {
            info!("[{}] tracking service; starting run", name);
            if let Err(err) = tracking.patch_state(&name, RunState::Running).await {
                return self.exit(Some(err)).await;
            }
        }

        // Step 3 - run the body, raced against scope cancellation
        let ctx = RunContext {
            descriptor: Arc::clone(&self.descriptor),
            logger: self.logger.clone(),
            cancel: self.cancel.clone(),
        };
        let cancelled = self.cancel.clone();
        let result = tokio::select! {
            // biased: when cancellation and completion race, the scope abort
            // wins, so the fault slot's error is the one reported
            biased;
            _ = cancelled.cancelled() => Err(self.fault.take().unwrap_or(
                ConnectorError::DeadlineExceeded { timeout: self.run_timeout },
            )),
            res = body(ctx) => res,
        };

        self.exit(result.err()).await
    }

    async fn exit(self, error: Option<ConnectorError>) -> LifecycleOutcome {
        let name = &self.descriptor.name;

        // Step 1 - stop timers; timeout first, so no new cancellation request
        // can arrive mid-exit, then heartbeat, so no tick interleaves with
        // the final flush below
        self.timeout.stop().await;
        self.heartbeat.stop().await;

        // Step 2 - short-circuit on an unrecoverable tracking-service error:
        // no point making further calls against the API that just rejected us
        if error.as_ref().is_some_and(ConnectorError::is_unrecoverable_api) {
            return LifecycleOutcome {
                final_state: RunState::Failed,
                error,
            };
        }

        // Step 3 - log the failure into the buffer so it reaches the
        // tracking service with the final flush
        if let Some(err) = &error {
            self.logger.error(format!("transfer run failed: {err:#}"));
        }

        // Step 4 - final flush, terminal state, run closure
        let final_state = if error.is_some() {
            RunState::Failed
        } else {
            RunState::Succeeded
        };
        if let Some(tracking) = &self.tracking {
            let closed: Result<(), ConnectorError> = async {
                self.heartbeat.run_now().await?;
                tracking.patch_state(name, final_state).await?;
                info!("[{}] tracking service; finishing run - {}", name, final_state);
                tracking.finish_run(name).await
            }
            .await;

            // an exit-path tracking failure becomes the escaping error
            if let Err(err) = closed {
                return LifecycleOutcome {
                    final_state: RunState::Failed,
                    error: Some(err),
                };
            }
        }

        info!("[{}] [FINISHED]", name);

        // Step 5 - suppress validation failures; everything else escapes
        let escaping = match error {
            Some(ConnectorError::Validation(msg)) => {
                info!("[{}] validation failure suppressed: {}", name, msg);
                None
            }
            other => other,
        };
        LifecycleOutcome {
            final_state,
            error: escaping,
        }
    }
}
