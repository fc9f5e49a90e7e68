use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use nudge_core::clock::SystemClock;
use nudge_core::db;
use nudge_core::notify::StdoutNotifier;
use nudge_core::scheduler::Scheduler;
use nudge_core::store::SqliteStore;

mod config;

#[derive(Parser, Debug)]
#[command(name = "nudged", about = "Task reminder daemon", version)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, default_value = "nudge.toml")]
    config: String,
    /// Override the database path from the configuration.
    #[arg(short, long)]
    database: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = config::Config::load(&args.config)?;
    if let Some(database) = args.database {
        config.database_path = database;
    }
    config.validate()?;
    let tz = config.timezone()?;

    tracing::info!(
        database = %config.database_path,
        timezone = %config.timezone,
        digest_hour = config.digest_hour,
        scan_interval_secs = config.scan_interval_secs,
        default_due = %format!("{:02}:{:02}", config.default_due_hour, config.default_due_minute),
        categories = ?config.categories,
        "starting reminder daemon"
    );

    let pool = db::establish_connection(&config.database_path).await?;
    let clock = Arc::new(SystemClock::new(tz));
    let store = Arc::new(SqliteStore::new(pool, clock.clone()));
    let notifier = Arc::new(StdoutNotifier);

    let scheduler = Scheduler::new(
        store,
        notifier,
        clock,
        Duration::from_secs(config.scan_interval_secs),
        config.digest_hour,
    );

    tokio::select! {
        _ = scheduler.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    Ok(())
}
