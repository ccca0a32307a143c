//! Tally balance reconciler.
//!
//! Compares every cached account balance and cash/bank mirror with a full
//! recomputation from posted journal lines. Drift is logged at error level
//! and, when configured, recorded in `balance_drift_alerts`. Balances are
//! never corrected here.
//!
//! Usage:
//!   reconciler           - Run every `reconciliation.interval_secs` until Ctrl-C
//!   reconciler --once    - Run a single pass; exit code 2 when drift is found

use std::process::ExitCode;
use std::time::Duration;

use sea_orm_migration::MigratorTrait;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tally_db::migration::Migrator;
use tally_db::{Reconciler, connect_with};
use tally_shared::AppConfig;
use tally_shared::config::LogConfig;

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tally=info,reconciler=info,sqlx=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if log.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load()?;
    init_tracing(&config.log);

    let once = std::env::args().skip(1).any(|arg| arg == "--once");

    let db = connect_with(&config.database).await?;
    Migrator::up(&db, None).await?;
    info!(
        max_connections = config.database.max_connections,
        "connected to database"
    );

    let reconciler = Reconciler::new(db, config.reconciliation.clone());

    if once {
        let report = reconciler.run().await?;
        return Ok(if report.is_clean() {
            ExitCode::SUCCESS
        } else {
            ExitCode::from(2)
        });
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(
        config.reconciliation.interval_secs.max(1),
    ));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    info!(
        interval_secs = config.reconciliation.interval_secs,
        tolerance = %config.reconciliation.tolerance,
        "reconciler started"
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = reconciler.run().await {
                    error!(error = %e, "reconciliation pass failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}
