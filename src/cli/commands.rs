//! CLI command definitions for stats-cache.
//!
//! `serve` runs the webhook listener, the admin routes, the dispatcher and
//! the periodic triggers. `admin` performs one administrative operation
//! against the configured registry and queue. `migrate` prepares the
//! database.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use crate::admin::{AdminResponse, AdminService};
use crate::alert::{Alerter, LogAlerter, SlackAlerter};
use crate::compute::HttpComputeClient;
use crate::metrics::init_metrics;
use crate::pipeline::{CacheConfig, CachePipeline};
use crate::registry::{CacheRegistry, MemoryRegistry};
use crate::scheduler::{
    enqueue_stage, Dispatcher, DispatcherConfig, MemoryQueue, PeriodicScheduler, RedisQueue,
    StageExecutor, StageJob, StageQueue,
};
use crate::server::{self, ServerState};
use crate::storage::{Database, MemoryStatisticsStore, StatisticsStore};

/// Statistics cache reconciliation service.
#[derive(Parser)]
#[command(name = "stats-cache")]
#[command(about = "Reconcile and compute the repertoire statistics cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the webhook listener, dispatcher and periodic triggers.
    Serve(ServeArgs),

    /// Perform one administrative operation.
    Admin(AdminArgs),

    /// Create or upgrade the database schema.
    Migrate,
}

#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Number of dispatcher workers.
    #[arg(short = 'w', long, default_value = "4")]
    pub workers: usize,

    /// Listen address, overriding STATS_CACHE_LISTEN_ADDR.
    #[arg(long)]
    pub listen: Option<String>,

    /// Upper bound on a single stage run, in seconds.
    #[arg(long, default_value = "1800")]
    pub stage_timeout_secs: u64,
}

#[derive(Parser, Debug)]
pub struct AdminArgs {
    #[command(subcommand)]
    pub command: AdminCommand,
}

#[derive(clap::Subcommand, Debug)]
pub enum AdminCommand {
    /// Turn the statistics cache on.
    Enable,
    /// Turn the statistics cache off. Running jobs are not cancelled.
    Disable,
    /// Run discovery and the submit-or-poll check now.
    Trigger,
    /// List study cache entries.
    ListStudies {
        #[arg(long)]
        repository: Option<String>,
    },
    /// Set a study's caching intent.
    SetStudy {
        #[arg(long)]
        repository: String,
        #[arg(long)]
        study: String,
        #[arg(long, action = clap::ArgAction::Set)]
        should_cache: bool,
        /// Reconcile immediately instead of on the next discovery pass.
        #[arg(long)]
        reconcile: bool,
    },
    /// Set a repertoire's caching intent.
    SetRepertoire {
        #[arg(long)]
        repertoire: String,
        #[arg(long, action = clap::ArgAction::Set)]
        should_cache: bool,
    },
    /// Delete cached statistics for a study and all its repertoires.
    ClearStudy {
        #[arg(long)]
        repository: String,
        #[arg(long)]
        study: String,
    },
    /// Delete cached statistics for one repertoire.
    ClearRepertoire {
        #[arg(long)]
        repertoire: String,
    },
}

/// Parse CLI arguments so main.rs can read `log_level` before running.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Admin(args) => run_admin_command(args).await,
        Commands::Migrate => run_migrate_command().await,
    }
}

/// Registry and statistics store, backed by the same database when one is configured.
struct Backends {
    registry: Arc<dyn CacheRegistry>,
    statistics: Arc<dyn StatisticsStore>,
}

async fn build_backends(config: &CacheConfig) -> anyhow::Result<Backends> {
    match &config.database_url {
        Some(url) => {
            let database = Arc::new(
                Database::connect(url)
                    .await
                    .context("failed to connect to the registry database")?,
            );
            let applied = database.run_migrations().await?;
            if applied > 0 {
                info!(applied, "Applied schema migrations");
            }
            Ok(Backends {
                registry: database.clone(),
                statistics: database,
            })
        }
        None => {
            warn!("DATABASE_URL not set, using the in-memory registry");
            Ok(Backends {
                registry: Arc::new(MemoryRegistry::new()),
                statistics: Arc::new(MemoryStatisticsStore::new()),
            })
        }
    }
}

fn build_alerter(config: &CacheConfig) -> anyhow::Result<Arc<dyn Alerter>> {
    match &config.slack_webhook {
        Some(url) => Ok(Arc::new(
            SlackAlerter::new(url.clone()).context("failed to build the Slack alerter")?,
        )),
        None => Ok(Arc::new(LogAlerter)),
    }
}

async fn build_pipeline(config: &CacheConfig) -> anyhow::Result<Arc<CachePipeline>> {
    let backends = build_backends(config).await?;
    let compute_url = config
        .compute_url
        .clone()
        .context("STATS_CACHE_COMPUTE_URL is required")?;
    let compute = HttpComputeClient::new(compute_url, config.compute_token.clone())?;

    let pipeline = CachePipeline::new(
        config.clone(),
        backends.registry,
        Arc::new(compute),
        backends.statistics,
        build_alerter(config)?,
    )?;
    Ok(Arc::new(pipeline))
}

async fn build_queue(config: &CacheConfig) -> anyhow::Result<Option<Arc<dyn StageQueue>>> {
    match &config.redis_url {
        Some(url) => {
            let queue = RedisQueue::connect(url, &config.queue_name)
                .await
                .context("failed to connect to the Redis stage queue")?;
            Ok(Some(Arc::new(queue)))
        }
        None => Ok(None),
    }
}

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = CacheConfig::from_env()?;
    if let Some(listen) = args.listen {
        config = config.with_listen_addr(listen);
    }
    config.validate()?;
    init_metrics()?;

    let pipeline = build_pipeline(&config).await?;
    let queue: Arc<dyn StageQueue> = match build_queue(&config).await? {
        Some(queue) => queue,
        None => {
            warn!("REDIS_URL not set, stage jobs will not survive a restart");
            Arc::new(MemoryQueue::new(config.queue_name.clone()))
        }
    };

    let periodic = Arc::new(PeriodicScheduler::new(queue.clone()));
    let executor = Arc::new(StageExecutor::new(
        pipeline.clone(),
        queue.clone(),
        periodic.clone(),
    ));
    let mut dispatcher = Dispatcher::new(
        DispatcherConfig::new(args.workers)
            .with_job_timeout(Duration::from_secs(args.stage_timeout_secs)),
        queue.clone(),
        executor,
    );
    dispatcher.start().await?;
    enqueue_stage(queue.as_ref(), StageJob::Bootstrap).await?;

    info!(
        enabled = config.enabled,
        max_jobs = config.max_jobs,
        listen = %config.listen_addr,
        "stats-cache started"
    );

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    };
    let admin = Arc::new(AdminService::new(pipeline.clone(), queue.clone()));
    let state = ServerState::new(queue).with_admin(admin);
    server::serve(&config.listen_addr, state, shutdown).await?;

    periodic.clear();
    dispatcher.shutdown().await?;
    info!(stats = ?pipeline.stats(), "stats-cache stopped");
    Ok(())
}

async fn run_admin_command(args: AdminArgs) -> anyhow::Result<()> {
    let config = CacheConfig::from_env()?;
    config.validate()?;

    let pipeline = build_pipeline(&config).await?;
    let admin = match build_queue(&config).await? {
        Some(queue) => AdminService::new(pipeline, queue),
        None => {
            warn!("REDIS_URL not set, only registry edits are available");
            AdminService::direct(pipeline)
        }
    };

    match args.command {
        AdminCommand::Enable => print_response(admin.enable().await),
        AdminCommand::Disable => print_response(admin.disable().await),
        AdminCommand::Trigger => print_response(admin.trigger().await),
        AdminCommand::ListStudies { repository } => {
            print_response(admin.list_studies(repository.as_deref()).await)
        }
        AdminCommand::SetStudy {
            repository,
            study,
            should_cache,
            reconcile,
        } => print_response(
            admin
                .set_study_should_cache(&repository, &study, should_cache, reconcile)
                .await,
        ),
        AdminCommand::SetRepertoire {
            repertoire,
            should_cache,
        } => print_response(
            admin
                .set_repertoire_should_cache(&repertoire, should_cache)
                .await,
        ),
        AdminCommand::ClearStudy { repository, study } => {
            print_response(admin.clear_study(&repository, &study).await)
        }
        AdminCommand::ClearRepertoire { repertoire } => {
            print_response(admin.clear_repertoire(&repertoire).await)
        }
    }
}

fn print_response<T: Serialize>(response: AdminResponse<T>) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&response)?);
    if response.success {
        Ok(())
    } else {
        anyhow::bail!(response.message)
    }
}

async fn run_migrate_command() -> anyhow::Result<()> {
    let config = CacheConfig::from_env()?;
    let url = config
        .database_url
        .context("DATABASE_URL is required for migrate")?;
    let database = Database::connect(&url).await?;
    let applied = database.run_migrations().await?;
    println!("Applied {} migration steps", applied);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["stats-cache", "serve"]).expect("should parse");
        match cli.command {
            Commands::Serve(args) => {
                assert_eq!(args.workers, 4);
                assert!(args.listen.is_none());
                assert_eq!(args.stage_timeout_secs, 1800);
            }
            _ => panic!("Expected Serve command"),
        }
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn test_admin_set_study() {
        let cli = Cli::try_parse_from([
            "stats-cache",
            "admin",
            "set-study",
            "--repository",
            "ir-1",
            "--study",
            "PRJNA1",
            "--should-cache",
            "true",
            "--reconcile",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Admin(AdminArgs {
                command:
                    AdminCommand::SetStudy {
                        repository,
                        study,
                        should_cache,
                        reconcile,
                    },
            }) => {
                assert_eq!(repository, "ir-1");
                assert_eq!(study, "PRJNA1");
                assert!(should_cache);
                assert!(reconcile);
            }
            _ => panic!("Expected admin set-study"),
        }
    }

    #[test]
    fn test_admin_clear_repertoire_with_log_level() {
        let cli = Cli::try_parse_from([
            "stats-cache",
            "admin",
            "clear-repertoire",
            "--repertoire",
            "rep-9",
            "--log-level",
            "debug",
        ])
        .expect("should parse");
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(
            cli.command,
            Commands::Admin(AdminArgs {
                command: AdminCommand::ClearRepertoire { .. }
            })
        ));
    }

    #[test]
    fn test_migrate_parses() {
        let cli = Cli::try_parse_from(["stats-cache", "migrate"]).expect("should parse");
        assert!(matches!(cli.command, Commands::Migrate));
    }
}
