//! Main entry point for the Scrim Room service
//!
//! Loads configuration, initializes logging, runs the service until a
//! shutdown signal arrives and then shuts it down gracefully.

use anyhow::Result;
use clap::Parser;
use scrim_room::config::{validate_config, AppConfig};
use scrim_room::service::{AppState, HealthCheck, HealthStatus};
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Scrim Room - lobby and match coordination for rated team scrims
#[derive(Parser)]
#[command(
    name = "scrim-room",
    version,
    about = "Lobby and match coordination service for rated team scrims",
    long_about = "Scrim Room seats players into rating-gated lobbies, starts matches on an \
                 external match service once lobbies fill up, and records results and \
                 rating changes when the match service reports back."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Match service URL override
    #[arg(long, value_name = "URL", help = "Override match service base URL")]
    match_service_url: Option<String>,

    /// Callback URL override
    #[arg(long, value_name = "URL", help = "Override the public completion callback URL")]
    callback_url: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Watchdog interval override
    #[arg(long, value_name = "SECONDS", help = "Override the watchdog sweep interval")]
    watchdog_interval: Option<u64>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Build the service without serving traffic and report its health
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let mut app_state = AppState::new(config).await?;
    app_state.start().await?;
    let health = HealthCheck::check(&app_state.handle()).await;
    app_state.shutdown().await?;

    match health {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            println!("  Active Lobbies: {}", health.stats.active_lobbies);
            println!("  Active Matches: {}", health.stats.active_matches);
            println!("  Players Waiting: {}", health.stats.players_waiting);

            if health.status == HealthStatus::Healthy {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Scrim Room Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   HTTP: {}:{}",
        config.service.http_host, config.service.http_port
    );
    info!("   Match service: {}", config.match_service.base_url);
    info!("   Callback URL: {}", config.match_service.callback_url);
    info!(
        "   Rating gate: {} (bonus cap {}, base rate {})",
        config.matchmaking.rating_gate_threshold,
        config.matchmaking.rating_bonus_cap,
        config.matchmaking.rating_base_rate
    );
    info!(
        "   Watchdog: every {}s, pending grace {}s",
        config.matchmaking.watchdog_interval_seconds, config.matchmaking.pending_grace_seconds
    );
}

/// Load and merge configuration from file, environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(url) = &args.match_service_url {
        config.match_service.base_url = url.clone();
    }

    if let Some(url) = &args.callback_url {
        config.match_service.callback_url = url.clone();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    if let Some(interval) = args.watchdog_interval {
        config.matchmaking.watchdog_interval_seconds = interval;
    }

    validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    info!("Scrim Room is running, press Ctrl+C to shut down");
    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    let shutdown_timeout = config.shutdown_timeout() + Duration::from_secs(1);
    match tokio::time::timeout(shutdown_timeout, app_state.shutdown()).await {
        Ok(Ok(stats)) => info!(
            "Graceful shutdown completed - {} matches started, {} finished, {} abandoned",
            stats.matches_started, stats.matches_finished, stats.matches_abandoned
        ),
        Ok(Err(e)) => warn!("Shutdown completed with errors: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    info!("Scrim Room stopped");
    Ok(())
}
