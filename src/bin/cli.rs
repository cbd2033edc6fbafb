//! buildwatch CLI
//!
//! Local execution entry point. For AWS Lambda, use `buildwatch-lambda`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use buildwatch::{
    error::Result,
    models::Config,
    pipeline::{Watcher, log_outcome},
    storage::{LocalStore, StateStore},
    utils::log::level_filter,
};
use clap::{Parser, Subcommand};

/// buildwatch - Deployment change watcher
#[derive(Parser, Debug)]
#[command(
    name = "buildwatch",
    version,
    about = "Detects new deployments of a site and summarizes what changed"
)]

struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory holding the persisted state keys
    #[arg(short, long, default_value = "state")]
    state_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one detection pass
    Run,

    /// Run detection on a fixed interval until interrupted
    Watch {
        /// Seconds between runs
        #[arg(long, default_value_t = 300)]
        interval_secs: u64,
    },

    /// Send a test notification without inspecting the site
    TestNotify,

    /// Validate configuration
    Validate,

    /// Show the stored build id and module count
    Info,
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let filter = if verbose {
        log::LevelFilter::Debug
    } else {
        level_filter(level)
    };
    env_logger::Builder::new()
        .filter_level(filter)
        .parse_default_env()
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config);
    config.apply_env();
    init_logging(cli.verbose, &config.logging.level);

    log::info!("buildwatch starting...");
    log::info!("Loaded configuration from {}", cli.config.display());

    let store = Arc::new(LocalStore::new(&cli.state_dir));

    match cli.command {
        Command::Run => {
            config.validate()?;
            let watcher = Watcher::from_config(config, store)?;
            let outcome = watcher.run().await?;
            log_outcome(&outcome);
        }

        Command::Watch { interval_secs } => {
            config.validate()?;
            let watcher = Watcher::from_config(config, store)?;
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            log::info!(
                "Watching {} every {}s (Ctrl-C to stop)",
                watcher.config().target.url,
                interval_secs.max(1)
            );
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        // A failed run is logged; the next tick tries again.
                        watcher.run_logged().await;
                    }
                    _ = tokio::signal::ctrl_c() => {
                        log::info!("Interrupted, stopping watch");
                        break;
                    }
                }
            }
        }

        Command::TestNotify => {
            if config.notifier.webhook_url.trim().is_empty() {
                return Err(buildwatch::error::AppError::config(
                    "notifier.webhook_url is not set",
                ));
            }
            let watcher = Watcher::from_config(config, store)?;
            watcher.send_test_notification().await?;
            log::info!("Test notification sent");
        }

        Command::Validate => {
            log::info!("Validating configuration...");

            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK (target {})", config.target.url);
        }

        Command::Info => {
            let state = StateStore::new(store.clone());
            log::info!("State directory: {}", store.root().display());

            match state.last_build_id().await? {
                Some(build_id) => log::info!("Last build: {}", build_id),
                None => log::info!("No snapshot found yet."),
            }
            if let Some(scripts) = state.last_scripts().await? {
                log::info!("Stored modules: {}", scripts.len());
                log::info!("Content digest: {}", scripts.digest());
                for name in scripts.names() {
                    log::debug!("    {}", name);
                }
            }
        }
    }

    log::info!("Done!");

    Ok(())
}
