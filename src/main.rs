use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;

use dbaas_control_plane::api::{self, allow_all, ApiState};
use dbaas_control_plane::config::Config;
use dbaas_control_plane::context::AppContext;
use dbaas_control_plane::health_monitor::HealthMonitor;
use dbaas_control_plane::lifecycle::{reconcile, LifecycleManager};
use dbaas_control_plane::metrics_sampler::MetricsSampler;
use dbaas_control_plane::orchestrator::PodmanRuntime;
use dbaas_control_plane::persistence::Store;
use dbaas_control_plane::snapshot_service::SnapshotService;
use dbaas_control_plane::vnet::VNetAllocator;
use dbaas_control_plane::volume::VolumeService;

#[derive(Parser)]
#[command(name = "dbaasd")]
#[command(about = "Database-as-a-Service control plane", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run migrations and start the HTTP API (default).
    Serve,
    /// Apply pending schema migrations then exit.
    Migrate,
    /// Roll back the most recently applied migration.
    MigrateDown,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to read configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Migrate => {
            let store = connect(&config).await?;
            store.migrate().await.context("failed to run migrations")?;
            println!("Migrations applied successfully");
        }
        Commands::MigrateDown => {
            let store = connect(&config).await?;
            sqlx::migrate!("./migrations")
                .undo(store.pool(), 0)
                .await
                .context("failed to roll back migration")?;
            println!("Rolled back one migration");
        }
        Commands::Serve => serve(config).await?,
    }

    Ok(())
}

async fn connect(config: &Config) -> Result<Store> {
    tokio::fs::create_dir_all(&config.data_root).await.context("failed to create data root")?;
    Store::connect(&config.database_path()).await.context("failed to connect to the persistence store")
}

async fn serve(config: Config) -> Result<()> {
    let config = Arc::new(config);
    tokio::fs::create_dir_all(&config.data_root).await.context("failed to create data root")?;
    tokio::fs::create_dir_all(config.containers_dir()).await?;
    tokio::fs::create_dir_all(config.volumes_dir()).await?;
    tokio::fs::create_dir_all(config.snapshots_dir()).await?;
    tokio::fs::create_dir_all(config.tls_dir()).await?;
    tokio::fs::create_dir_all(config.logs_dir()).await?;

    let store = Store::connect(&config.database_path()).await.context("failed to connect to the persistence store")?;
    store.migrate().await.context("failed to run migrations")?;

    let networks = config
        .vnet_default_name
        .clone()
        .into_iter()
        .map(|name| (name, std::net::Ipv4Addr::new(10, 88, 0, 0), 254))
        .collect();

    let ctx = AppContext {
        store: Arc::new(store),
        runtime: Arc::new(PodmanRuntime::new(config.container_bin.clone())),
        volumes: Arc::new(VolumeService::new(config.volumes_dir())),
        vnets: Arc::new(VNetAllocator::new(networks)),
        config: Arc::clone(&config),
    };

    tracing::info!("running crash-recovery reconcile pass");
    reconcile::run(&ctx).await.context("reconcile pass failed")?;

    let lifecycle = Arc::new(LifecycleManager::new(ctx.clone()));
    let snapshots = Arc::new(SnapshotService::new(ctx.clone()));
    let health = HealthMonitor::new(ctx.clone());
    let metrics = MetricsSampler::new(ctx.clone());

    health.clone().spawn();
    metrics.clone().spawn();
    metrics.clone().spawn_retention_sweep();

    let state = ApiState { ctx, lifecycle, snapshots, health, metrics, check: allow_all() };
    let router = api::build_router(state);

    let listener = tokio::net::TcpListener::bind(config.address())
        .await
        .with_context(|| format!("failed to bind {}", config.address()))?;
    tracing::info!(address = %config.address(), "dbaasd listening");
    axum::serve(listener, router).await.context("server error")?;

    Ok(())
}
