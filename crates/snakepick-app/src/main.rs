// Snakepick entry point.
//
// Startup sequence:
// 1. Load config
// 2. Initialize tracing (log to file)
// 3. Open database
// 4. Import player catalog, draft windows and retention
// 5. Build the ranking service
// 6. Spawn the allocation scheduler
// 7. Wait for Ctrl+C, then shut the scheduler down

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use snakepick_app::catalog;
use snakepick_app::config::{self, LoggingConfig};
use snakepick_app::scheduler::{self, SchedulerCommand};
use snakepick_core::db::Database;
use snakepick_core::draft::window::{Clock, SystemClock};
use snakepick_core::service::RankingService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = config::load_config().context("failed to load configuration")?;

    // 2. Initialize tracing
    init_tracing(&config.logging)?;
    info!("Snakepick starting up");
    info!(
        "Config loaded: league={}, season {}, {} squads, {} draft windows",
        config.league.name,
        config.league.season,
        config.league.squads.len(),
        config.windows.len()
    );

    // 3. Open database
    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    // 4. Import catalog, windows and retention
    catalog::import(&db, &config).context("failed to import player catalog")?;

    // 5. Build the ranking service
    let service = Arc::new(RankingService::new(db, SystemClock, config.rules()));
    match service.preferred_window(config.league.season, None) {
        Ok(Some(window)) => {
            let now = service.clock().now();
            info!(
                "Current draft window: {} ({}, {:?}, locks in {}s)",
                window.id,
                window.kind.code(),
                window.status_at(now),
                window.remaining_seconds(now)
            );
        }
        Ok(None) => info!("No draft windows configured for season {}", config.league.season),
        Err(e) => error!("Failed to select current draft window: {}", e),
    }

    // 6. Spawn the allocation scheduler
    let (cmd_tx, cmd_rx) = mpsc::channel(8);
    let tick = Duration::from_secs(config.tick_seconds);
    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler::run(service, tick, cmd_rx).await {
            error!("Scheduler error: {}", e);
        }
    });

    // 7. Wait for Ctrl+C
    info!("Snakepick ready");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    let _ = cmd_tx.send(SchedulerCommand::Shutdown).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), scheduler_handle).await;

    info!("Snakepick shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file under the configured directory.
fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join(&logging.directory);
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("snakepick.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter)),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
