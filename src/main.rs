use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use clap::Parser;

use transfer_connector::config::{self, TableConfigMap};
use transfer_connector::staging::FsUploader;
use transfer_connector::tracking::{HttpTrackingClient, TrackingClient};
use transfer_connector::{
    Connector, ConnectorError, ConnectorRuntime, RunContext, RuntimeOptions, TableArtifact,
    TableStager,
};

#[derive(Parser)]
#[command(about = "Run file-triggered transfer runs with the built-in pass-through connector")]
struct Args {
    /// Path to the table-config YAML describing destination tables
    table_config: PathBuf,

    /// Path to a transfer-run YAML to execute (single-shot)
    #[arg(long)]
    run_file: PathBuf,

    /// Directory holding pre-staged files, one subdirectory per table-config key
    #[arg(long)]
    source_dir: PathBuf,

    /// Local staging path
    #[arg(long)]
    local_tmpdir: Option<PathBuf>,

    /// Remote staging prefix, e.g. a mounted bucket path
    #[arg(long)]
    remote_tmpdir: String,

    /// Overwrite existing remote objects if present
    #[arg(long)]
    overwrite: bool,

    /// Seconds a transfer run can stay alive before it is timed out
    #[arg(long, default_value_t = config::DEFAULT_RUN_TIMEOUT.as_secs())]
    run_timeout: u64,

    /// Seconds between heartbeat updates sent to the tracking service.
    /// Should be <= the tracking service's update deadline
    #[arg(long, default_value_t = config::DEFAULT_HEARTBEAT_INTERVAL.as_secs())]
    heartbeat_interval: u64,

    /// Base URL of the tracking service; omit to run untracked
    #[arg(long)]
    tracking_endpoint: Option<String>,

    /// Trigger loads directly against the destination dataset instead of
    /// through the run's tracked load endpoint
    #[arg(long)]
    direct_load: bool,

    /// Quiet mode - warnings and errors only
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if args.quiet {
        EnvFilter::new("transfer_connector=warn")
    } else {
        EnvFilter::new("transfer_connector=info")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    if args.heartbeat_interval > args.run_timeout {
        bail!(
            "heartbeat interval ({}s) must not exceed the run timeout ({}s)",
            args.heartbeat_interval,
            args.run_timeout
        );
    }
    if args.direct_load && args.tracking_endpoint.is_none() {
        bail!("--direct-load requires --tracking-endpoint");
    }

    let table_config = Arc::new(config::load_table_config(&args.table_config)?);

    let connector = Arc::new(PassthroughConnector {
        table_config: Arc::clone(&table_config),
        source_dir: args.source_dir.clone(),
    });
    let uploader = Arc::new(FsUploader::new(args.overwrite));
    let tracking: Option<Arc<dyn TrackingClient>> = args
        .tracking_endpoint
        .as_deref()
        .map(|endpoint| Arc::new(HttpTrackingClient::new(endpoint)) as Arc<dyn TrackingClient>);

    let runtime = ConnectorRuntime::new(
        connector,
        uploader,
        tracking,
        RuntimeOptions {
            heartbeat_interval: Duration::from_secs(args.heartbeat_interval),
            run_timeout: Duration::from_secs(args.run_timeout),
            local_tmpdir: args.local_tmpdir.unwrap_or_else(std::env::temp_dir),
            remote_tmpdir: args.remote_tmpdir,
            direct_load: args.direct_load,
            ..RuntimeOptions::default()
        },
    );

    runtime.run_from_file(&args.run_file).await
}

/// Stages files that already exist on disk.
///
/// For every key in the table config, files under `source_dir/{key}/` are
/// copied into the run's local staging prefix and offered for load under the
/// key's templated destination name. Keys without a source directory are
/// skipped.
struct PassthroughConnector {
    table_config: Arc<TableConfigMap>,
    source_dir: PathBuf,
}

#[async_trait]
impl Connector for PassthroughConnector {
    async fn stage_tables_locally(
        &self,
        ctx: &RunContext,
        local_prefix: &Path,
    ) -> Result<Vec<TableArtifact>, ConnectorError> {
        let mut artifacts = Vec::new();

        for key in self.table_config.keys() {
            let table_dir = self.source_dir.join(key);
            if !table_dir.is_dir() {
                continue;
            }

            let stager = TableStager::from_config(&self.table_config, key)?;
            let staged_dir = local_prefix.join(key);
            let artifact = stager
                .stage(ctx, || async {
                    copy_table_files(&table_dir, &staged_dir)
                        .await
                        .map_err(ConnectorError::from)
                })
                .await?;

            if !artifact.source_locations.is_empty() {
                artifacts.push(artifact);
            }
        }

        Ok(artifacts)
    }
}

/// Copy every regular file in `table_dir` into `staged_dir`, returning the
/// staged paths in name order.
async fn copy_table_files(table_dir: &Path, staged_dir: &Path) -> Result<Vec<String>> {
    tokio::fs::create_dir_all(staged_dir)
        .await
        .with_context(|| format!("failed to create {}", staged_dir.display()))?;

    let mut locations = Vec::new();
    let mut entries = tokio::fs::read_dir(table_dir)
        .await
        .with_context(|| format!("failed to read {}", table_dir.display()))?;

    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let staged = staged_dir.join(entry.file_name());
        tokio::fs::copy(entry.path(), &staged)
            .await
            .with_context(|| format!("failed to stage {}", entry.path().display()))?;
        locations.push(staged.to_string_lossy().into_owned());
    }

    locations.sort();
    Ok(locations)
}
