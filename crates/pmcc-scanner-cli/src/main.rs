mod config;
mod health;
mod logging;
mod market_hours;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config::AppConfig;
use scan_coordinator::ScanCoordinator;
use tokio::signal::unix::SignalKind;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "pmcc-scanner", about = "Poor Man's Covered Call opportunity scanner")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single scan and exit.
    Scan {
        #[arg(long, default_value_t = true)]
        once: bool,
    },
    /// Run the scheduled daemon with a health endpoint.
    Serve,
    /// Load and validate configuration, then exit without scanning.
    ValidateConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    config.validate()?;
    tracing::info!("configuration loaded and validated");

    match cli.command {
        Command::ValidateConfig => {}
        Command::Scan { once: _ } => {
            if !run_one_scan(&config).await? {
                // §6: scan aborted with zero opportunities and no healthy
                // provider / deadline reached — exit 1 rather than 0.
                std::process::exit(1);
            }
        }
        Command::Serve => serve(config).await?,
    }

    Ok(())
}

/// Runs one scan and returns whether it should be considered a success for
/// process exit-code purposes (§6): `false` only when the registry never
/// produced any screened symbols (no healthy provider for `screen_stocks`)
/// or the wall-clock deadline was reached with zero opportunities.
async fn run_one_scan(config: &AppConfig) -> Result<bool> {
    let registry = config.build_registry();
    let notifier = Arc::new(config.notifications.build_manager());
    let coordinator = ScanCoordinator::new(Arc::clone(&registry), notifier);
    let scan_config = config.build_scan_config();

    tracing::info!("starting scan");
    let results = coordinator.run_scan(&scan_config, CancellationToken::new()).await;
    tracing::info!(
        opportunities = results.opportunities.len(),
        errors = results.errors.len(),
        "scan complete"
    );

    let deadline_reached = results
        .warnings
        .iter()
        .any(|w| w.contains("deadline reached"));
    let aborted = results.stats.screened == 0 || (deadline_reached && results.opportunities.is_empty());
    Ok(!aborted)
}

/// A4/A5: interval-ticked daemon gated by US-Eastern market hours, with a
/// sibling `axum` health server and SIGINT/SIGTERM-triggered cancellation of
/// any in-flight scan.
async fn serve(config: AppConfig) -> Result<()> {
    let registry = config.build_registry();
    let notifier = Arc::new(config.notifications.build_manager());
    let coordinator = ScanCoordinator::new(Arc::clone(&registry), notifier);
    let scan_config = config.build_scan_config();

    let health_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.health_port)).await?;
    let health_router = health::router(Arc::clone(&registry));
    let health_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(health_listener, health_router).await {
            tracing::error!(error = %e, "health endpoint server exited");
        }
    });

    let shutdown = CancellationToken::new();
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let mut interval = tokio::time::interval(Duration::from_secs(config.scan_interval_secs));

    tracing::info!(interval_secs = config.scan_interval_secs, port = config.health_port, "daemon started");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                tracing::info!("received SIGTERM, shutting down");
                break;
            }
            _ = interval.tick() => {
                if config.market_hours_only && !market_hours::is_market_open(config.extended_hours) {
                    tracing::debug!("market closed, skipping scan tick");
                    continue;
                }

                tracing::info!("starting scheduled scan");
                let results = coordinator.run_scan(&scan_config, shutdown.child_token()).await;
                tracing::info!(
                    opportunities = results.opportunities.len(),
                    errors = results.errors.len(),
                    "scheduled scan complete"
                );
            }
        }
    }

    shutdown.cancel();
    health_server.abort();
    Ok(())
}
