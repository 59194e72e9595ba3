use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use cronbox_scheduler::JobScheduler;
use cronbox_store::{ExecutionStore, SqliteExecutionStore, SqliteTaskStore, TaskStore};
use cronbox_tasks::TaskService;

/// Task scheduling and execution daemon.
#[derive(Parser)]
#[command(name = "cronboxd", version)]
struct Cli {
    /// Path to the config file (defaults to ~/.cronbox/cronbox.toml).
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cronbox=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: explicit path > CRONBOX_CONFIG env > ~/.cronbox/cronbox.toml
    let config_path = cli
        .config
        .or_else(|| std::env::var("CRONBOX_CONFIG").ok());
    let config = cronbox_core::CronboxConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({e}), using defaults");
        cronbox_core::CronboxConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    cronbox_store::db::init_db(&db)?;
    info!("database migrations complete");

    // Each store gets its own connection so lifecycle calls and execution
    // recording never contend on one mutex.
    let tasks: Arc<dyn TaskStore> =
        Arc::new(SqliteTaskStore::new(rusqlite::Connection::open(db_path)?)?);
    let executions: Arc<dyn ExecutionStore> =
        Arc::new(SqliteExecutionStore::new(rusqlite::Connection::open(db_path)?)?);

    let scheduler = Arc::new(JobScheduler::new());
    let service = Arc::new(TaskService::new(
        tasks,
        executions,
        Arc::clone(&scheduler),
        config.scripts.dir.clone(),
    ));

    // Executions a previous process life left running are failures now,
    // before anything new starts firing.
    service.mark_interrupted_on_startup();

    let scheduled = service.startup_reload()?;
    info!(scheduled, "existing tasks reloaded");

    scheduler.start();
    info!("cronboxd running; press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    let timeout = Duration::from_secs(config.scheduler.shutdown_timeout_secs);
    scheduler.stop(timeout).await;
    info!("bye");
    Ok(())
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
