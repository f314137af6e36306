//! git-metadata-collector: mirrors git repositories and records their
//! metadata, pulling work from a ranked task source.
//!
//! # Usage
//!
//! ```bash
//! # In-memory store seeded from a file, 8 workers
//! git-metadata-collector --store memory --seed-file links.txt -j 8
//!
//! # PostgreSQL store (PG_URL or PG_HOST/PG_USERNAME/... from env or .env)
//! GIT_STORAGE_PATH=/srv/git git-metadata-collector --store postgres
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use harvest_core::{config, Config, OutcomeStore, TaskSource};
use harvest_git::{GitCommandCollector, GitLogParser};
use harvest_rpc::{ControlServer, SchedulerControl, DEFAULT_PORT};
use harvest_scheduler::{
    CollectionExecutor, ExecutorConfig, PacingConfig, RunningTasks, Scheduler, SchedulerConfig,
    WorkerPool,
};
use harvest_storage::{MemoryStore, PgStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    Memory,
    Postgres,
}

/// Mirror git repositories and collect contributor and activity metadata.
#[derive(Parser, Debug)]
#[command(name = "git-metadata-collector", version, about)]
struct Cli {
    /// Number of worker threads.
    #[arg(short = 'j', long, env = "COLLECTOR_JOBS", default_value_t = 256)]
    jobs: usize,

    /// Control-plane port.
    #[arg(short = 'p', long, env = "COLLECTOR_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Control-plane bind address.
    #[arg(long, env = "COLLECTOR_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Only clone/update repositories; skip metadata parsing.
    #[arg(long, env = "COLLECTOR_NO_COLLECT")]
    no_collect: bool,

    /// Links requested per replenishment (default: jobs × 10).
    #[arg(long, env = "COLLECTOR_FETCH_SIZE")]
    fetch_size: Option<usize>,

    /// Replenish below this many pending links (default: jobs × 2).
    #[arg(long, env = "COLLECTOR_FETCH_THRESHOLD")]
    fetch_threshold: Option<usize>,

    /// Abort a single clone + parse after this many seconds.
    #[arg(long, env = "COLLECTOR_TASK_TIMEOUT_SECS")]
    task_timeout_secs: Option<u64>,

    /// Where candidate links and outcomes live.
    #[arg(long, env = "COLLECTOR_STORE", value_enum, default_value_t = StoreKind::Postgres)]
    store: StoreKind,

    /// File with one link per line to register before starting.
    #[arg(long, env = "COLLECTOR_SEED_FILE")]
    seed_file: Option<PathBuf>,

    /// Mirror root; overrides GIT_STORAGE_PATH.
    #[arg(long)]
    storage: Option<PathBuf>,
}

impl Cli {
    fn scheduler_config(&self) -> SchedulerConfig {
        let mut cfg = SchedulerConfig::for_workers(self.jobs);
        if let Some(size) = self.fetch_size {
            cfg.fetch_size = size;
        }
        if let Some(threshold) = self.fetch_threshold {
            cfg.fetch_threshold = threshold;
        }
        cfg
    }
}

type Stores = (Arc<dyn TaskSource>, Arc<dyn OutcomeStore>);

async fn open_stores(cli: &Cli, config: &Config) -> Result<Stores> {
    match cli.store {
        StoreKind::Memory => {
            let store = Arc::new(MemoryStore::new());
            if let Some(path) = &cli.seed_file {
                let added = store
                    .load_seed_file(path)
                    .with_context(|| format!("failed to read seed file {}", path.display()))?;
                info!(added, "seed links loaded");
            }
            Ok((store.clone(), store))
        }
        StoreKind::Postgres => {
            if !config.postgres.is_configured() {
                bail!("--store postgres requires PG_URL or PG_USERNAME");
            }
            let store = Arc::new(
                PgStore::connect(&config.postgres)
                    .await
                    .context("failed to connect to PostgreSQL")?,
            );
            store.migrate().await.context("failed to apply migrations")?;
            if let Some(path) = &cli.seed_file {
                let links = read_links(path)?;
                let added = store.add_links(&links).await?;
                info!(added, "seed links registered");
            }
            Ok((store.clone(), store))
        }
    }
}

fn read_links(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    config::load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    config.log_summary();
    tracing::debug!(config = %config.redacted_summary(), "effective configuration");
    info!(?cli, "starting git-metadata-collector");

    let storage_root = cli
        .storage
        .clone()
        .unwrap_or_else(|| config.storage.git_storage_path.clone());
    std::fs::create_dir_all(&storage_root)
        .with_context(|| format!("failed to create storage root {}", storage_root.display()))?;

    let (source, store) = open_stores(&cli, &config).await?;

    let scheduler = Scheduler::new(cli.scheduler_config(), source);
    let running = RunningTasks::new();
    let executor = Arc::new(CollectionExecutor::new(
        ExecutorConfig {
            storage_root: storage_root.clone(),
            skip_parse: cli.no_collect,
            task_timeout: cli.task_timeout_secs.map(Duration::from_secs),
        },
        store,
        Arc::new(GitCommandCollector::new(&storage_root)),
        Arc::new(GitLogParser::new()),
        running.clone(),
    ));
    let pool = WorkerPool::spawn(cli.jobs, PacingConfig::default(), scheduler.clone(), executor)
        .context("failed to spawn worker threads")?;

    let service = Arc::new(SchedulerControl::new(scheduler.clone(), running));
    let server = ControlServer::bind((cli.host.as_str(), cli.port), service)
        .await
        .context("failed to bind control plane")?;
    let shutdown = CancellationToken::new();
    let server_task = tokio::spawn(server.serve(shutdown.clone()));

    shutdown_signal().await;
    info!("shutdown signal received, draining workers");
    shutdown.cancel();
    scheduler.shutdown();
    tokio::task::spawn_blocking(move || pool.join())
        .await
        .context("worker pool join task failed")?;
    server_task.await.context("control plane task failed")??;

    info!("git-metadata-collector exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_worker_count() {
        let cli = Cli::try_parse_from(["git-metadata-collector"]).unwrap();
        assert_eq!(cli.jobs, 256);
        assert_eq!(cli.port, 20324);
        assert_eq!(cli.store, StoreKind::Postgres);
        assert!(cli.storage.is_none());
        let cfg = cli.scheduler_config();
        assert_eq!(cfg.fetch_size, 2560);
        assert_eq!(cfg.fetch_threshold, 512);
    }

    #[test]
    fn explicit_fetch_settings_override_derived_ones() {
        let cli = Cli::try_parse_from([
            "git-metadata-collector",
            "-j",
            "4",
            "--fetch-size",
            "200",
            "--fetch-threshold",
            "30",
            "--store",
            "memory",
            "--no-collect",
        ])
        .unwrap();
        let cfg = cli.scheduler_config();
        assert_eq!(cfg.fetch_size, 200);
        assert_eq!(cfg.fetch_threshold, 30);
        assert!(cli.no_collect);
        assert_eq!(cli.store, StoreKind::Memory);
    }
}
