use std::sync::Arc;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::{fmt, EnvFilter};

use policy_sync::errors::SyncError;
use policy_sync::policy::engine::CasbinEngine;
use policy_sync::policy::errors::PolicyError;
use policy_sync::policy::listener::{publish_reload, InvalidationListener};
use policy_sync::policy::polling::VersionPollingService;
use policy_sync::policy::source::{SourceDescriptor, VersionSourceDescriptor};
use policy_sync::settings::{Redis, Settings};
use policy_sync::{jobs, policy, storage, web};

#[derive(Parser, Debug)]
#[command(
    name = "policy-sync",
    version,
    about = "Keeps an in-memory RBAC policy set in sync with its source of truth"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Apply database migrations before starting
    #[arg(long)]
    migrate: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load policies, start polling and the invalidation listener, serve the admin API
    Serve,
    /// Check the configured source descriptors and exit
    Validate,
    /// Publish a reload notification for the given version
    Publish {
        #[arg(long)]
        version: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, cli.migrate).await,
        Command::Validate => validate(&settings),
        Command::Publish { version } => publish(&settings.redis, version).await,
    }
}

async fn serve(settings: Settings, migrate: bool) -> Result<()> {
    SourceDescriptor::parse(&settings.policy.source)?;

    // init storage (database)
    let db = storage::init(&settings.database).await?;
    if db.is_none() && settings.needs_database() {
        return Err(miette::miette!(
            "database.url must be set when the policy source is a database"
        ));
    }
    if migrate {
        match &db {
            Some(db) => storage::migrate(db).await?,
            None => tracing::warn!("--migrate given but no database is configured"),
        }
    }

    let engine = Arc::new(CasbinEngine::new().await?);

    // initial load is synchronous; any failure aborts startup
    let polling = policy::bootstrap(&settings.policy, db, engine).await?;
    polling.load_initial_version().await;

    let _scheduler = if polling.is_enabled() {
        Some(jobs::init_scheduler(polling.clone()).await?)
    } else {
        tracing::info!("Version polling disabled");
        None
    };

    if let Some(url) = settings.redis.url.as_deref() {
        spawn_listener(url, &settings.redis, polling.clone())?;
    } else {
        tracing::info!("No redis url configured, invalidation listener disabled");
    }

    web::serve(&settings.server, polling).await
}

fn spawn_listener(
    url: &str,
    cfg: &Redis,
    polling: Arc<VersionPollingService>,
) -> Result<(), SyncError> {
    let client = redis::Client::open(url).map_err(PolicyError::from)?;
    let listener = Arc::new(InvalidationListener::new(
        polling,
        cfg.channel.clone(),
        cfg.reload_marker.clone(),
    ));
    tracing::info!(channel = listener.channel(), "Starting invalidation listener");
    listener.spawn(client);
    Ok(())
}

fn validate(settings: &Settings) -> Result<()> {
    let source = SourceDescriptor::parse(&settings.policy.source)?;
    println!("policy source: {source}");

    if let Some(raw) = settings.policy.polling.version_source.as_deref() {
        let version_source = VersionSourceDescriptor::parse(raw)?;
        println!("version source: {version_source}");
    }

    let filter = settings.policy.resource_filter();
    if filter.is_empty() {
        println!("resources: all");
    } else {
        println!("resources: {}", filter.codes().join(","));
    }
    Ok(())
}

async fn publish(cfg: &Redis, version: i64) -> Result<()> {
    let url = cfg
        .url
        .as_deref()
        .ok_or_else(|| miette::miette!("redis.url must be set to publish"))?;
    let client = redis::Client::open(url).into_diagnostic()?;
    let receivers = publish_reload(&client, &cfg.channel, &cfg.reload_marker, version).await?;
    println!("published {}:{version} to {} ({receivers} receivers)", cfg.reload_marker, cfg.channel);
    Ok(())
}
