//! High-level runtime API for the transfer connector.
//!
//! This module provides the trigger loop: it turns inbound trigger messages
//! into transfer-run scopes, runs the staging/load body inside each scope,
//! and settles queue messages according to the outcome. Collaborators (the
//! connector, the uploader, the tracking client, the queue) are injected
//! already constructed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::config::{DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_MESSAGES, DEFAULT_RUN_TIMEOUT};
use crate::coordination::{LifecycleCoordinator, LifecycleOptions, LifecycleOutcome, RunContext};
use crate::error::ConnectorError;
use crate::model::RunDescriptor;
use crate::queue::{QueueMessage, QueueSubscriber};
use crate::staging::{Connector, TableArtifact, Uploader, stage_for_run};
use crate::tracking::TrackingClient;

/// Tunables for the connector runtime.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub heartbeat_interval: Duration,
    pub run_timeout: Duration,
    /// Queue messages processed concurrently.
    pub max_messages: usize,
    /// Root for local staging files.
    pub local_tmpdir: PathBuf,
    /// Prefix for uploaded staging files.
    pub remote_tmpdir: String,
    /// Trigger loads directly against the destination dataset instead of
    /// through the run's tracked load endpoint.
    pub direct_load: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            run_timeout: DEFAULT_RUN_TIMEOUT,
            max_messages: DEFAULT_MAX_MESSAGES,
            local_tmpdir: std::env::temp_dir(),
            remote_tmpdir: String::new(),
            direct_load: false,
        }
    }
}

/// Runs transfer runs on behalf of a [`Connector`] implementation.
#[derive(Clone)]
pub struct ConnectorRuntime {
    connector: Arc<dyn Connector>,
    uploader: Arc<dyn Uploader>,
    tracking: Option<Arc<dyn TrackingClient>>,
    options: RuntimeOptions,
}

impl ConnectorRuntime {
    pub fn new(
        connector: Arc<dyn Connector>,
        uploader: Arc<dyn Uploader>,
        tracking: Option<Arc<dyn TrackingClient>>,
        options: RuntimeOptions,
    ) -> Self {
        Self {
            connector,
            uploader,
            tracking,
            options,
        }
    }

    /// Run a single transfer run read from a YAML file.
    ///
    /// Single-shot: there is no retry machinery, any escaping error
    /// propagates to the caller.
    pub async fn run_from_file(&self, run_file: &Path) -> Result<()> {
        info!("triggering via file - {}", run_file.display());

        let text = tokio::fs::read_to_string(run_file)
            .await
            .with_context(|| format!("failed to read run file {}", run_file.display()))?;
        let descriptor = RunDescriptor::from_yaml(&text)?;

        let outcome = self.execute_run(descriptor).await;
        match outcome.error {
            None => Ok(()),
            Some(err) => Err(anyhow!(err)),
        }
    }

    /// Consume trigger messages from a queue subscription until it closes.
    ///
    /// Each message runs in its own task inside its own coordinator scope;
    /// at most `max_messages` run concurrently. The outcome decides the
    /// message's fate (ack, nack, or lease expiry); a failed message never
    /// stops the loop.
    pub async fn run_from_queue(&self, queue: Arc<dyn QueueSubscriber>) -> Result<()> {
        info!(
            "triggering via queue subscription (max {} concurrent message(s))",
            self.options.max_messages
        );

        let flow_control = Arc::new(Semaphore::new(self.options.max_messages));
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();

        loop {
            let permit = Arc::clone(&flow_control)
                .acquire_owned()
                .await
                .expect("flow-control semaphore closed");

            let Some(message) = queue.receive().await? else {
                break;
            };

            let runtime = self.clone();
            tasks.spawn(async move {
                let result = runtime.process_message(message).await;
                drop(permit);
                result
            });

            while let Some(finished) = tasks.try_join_next() {
                log_settled(finished);
            }
        }

        while let Some(finished) = tasks.join_next().await {
            log_settled(finished);
        }
        Ok(())
    }

    /// Decode, run, and settle one queue message.
    async fn process_message(&self, message: QueueMessage) -> Result<()> {
        // Decode before any scope exists. A payload we cannot decode has no
        // run name to report against: leave the message un-settled so the
        // queue redelivers it on lease expiry.
        let descriptor = match RunDescriptor::from_json_bytes(message.payload()) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                drop(message);
                return Err(err);
            }
        };

        let run_name = descriptor.name.clone();
        let outcome = self.execute_run(descriptor).await;
        self.settle_message(&run_name, outcome, message)
    }

    /// Apply the ack/retry policy to a finished scope.
    fn settle_message(
        &self,
        run_name: &str,
        outcome: LifecycleOutcome,
        message: QueueMessage,
    ) -> Result<()> {
        match outcome.error {
            // clean completion, including a suppressed validation failure
            None => {
                message.ack();
                Ok(())
            }
            // a permanently-rejecting API would reject every redelivery too
            Some(err) if err.is_unrecoverable_api() => {
                error!("[{run_name}] unrecoverable tracking service error - {err:#}");
                message.ack();
                Ok(())
            }
            Some(err) if err.is_recoverable_api() => {
                warn!("[{run_name}] returning message for redelivery - {err:#}");
                message.nack();
                Ok(())
            }
            // neither ack nor nack: processing of this message fails outright
            // and the queue's lease expiry redelivers it
            Some(err) => {
                drop(message);
                Err(anyhow!(err).context(format!("processing failed for {run_name}")))
            }
        }
    }

    /// Run one descriptor through a coordinator scope.
    async fn execute_run(&self, mut descriptor: RunDescriptor) -> LifecycleOutcome {
        // Coerce declared integer params up front (the descriptor is frozen
        // once the scope owns it); the result surfaces inside the scope so a
        // coercion failure is reported FAILED and suppressed as validation.
        let normalized = descriptor.normalize_integer_params(self.connector.integer_params());

        let coordinator = LifecycleCoordinator::new(
            descriptor,
            self.tracking.clone(),
            LifecycleOptions {
                heartbeat_interval: self.options.heartbeat_interval,
                run_timeout: self.options.run_timeout,
            },
        );

        coordinator
            .run(|ctx| async move {
                normalized?;
                self.process_transfer_run(ctx).await
            })
            .await
    }

    /// The run body: validate, stage, upload, trigger the load.
    async fn process_transfer_run(&self, ctx: RunContext) -> Result<(), ConnectorError> {
        // Step 1 - params specific to this connector
        ctx.descriptor
            .check_required_params(self.connector.required_params())?;

        // Step 2 - stage data locally and upload it
        ctx.logger.info("[STAGING]");
        let artifacts = stage_for_run(
            self.connector.as_ref(),
            self.uploader.as_ref(),
            &ctx,
            &self.options.local_tmpdir,
            &self.options.remote_tmpdir,
        )
        .await?;

        // Step 3 - trigger destination load jobs
        let loadable: Vec<TableArtifact> = artifacts
            .into_iter()
            .filter(|artifact| {
                if artifact.source_locations.is_empty() {
                    ctx.logger.warning(format!(
                        "skipping {} - no source files staged",
                        artifact.destination_name
                    ));
                    false
                } else {
                    true
                }
            })
            .collect();

        if loadable.is_empty() {
            ctx.logger.info("[LOADING] nothing to load");
            return Ok(());
        }

        let Some(tracking) = &self.tracking else {
            ctx.logger
                .info("[LOADING] no tracking client configured; skipping load trigger");
            return Ok(());
        };

        ctx.logger.info("[LOADING]");
        for artifact in &loadable {
            ctx.logger
                .info(format!("loading table => {}", artifact.destination_name));
        }

        if self.options.direct_load {
            let dataset_id = ctx.descriptor.destination_dataset_id.as_deref().ok_or_else(|| {
                ConnectorError::Validation(
                    "direct load requires destination_dataset_id on the run".to_string(),
                )
            })?;
            tracking.start_load_direct(dataset_id, &loadable).await?;
        } else {
            tracking.start_load(&ctx.descriptor.name, &loadable).await?;
        }

        Ok(())
    }
}

fn log_settled(finished: Result<Result<()>, tokio::task::JoinError>) {
    match finished {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!("message processing failed: {err:#}"),
        Err(err) => warn!("message task panicked: {err:#}"),
    }
}
