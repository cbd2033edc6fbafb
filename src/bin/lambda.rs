//! AWS Lambda entry point for buildwatch
//!
//! Deploy with `cargo lambda build --release --features lambda`
//! and attach a scheduled EventBridge rule.
//!
//! ## Environment Variables
//!
//! - `S3_BUCKET`: bucket holding the watcher state (required)
//! - `S3_PREFIX`: key prefix (default: `buildwatch`)
//! - `CONFIG_KEY`: optional store key of a TOML config
//! - `TARGET_URL`, `WEBHOOK_URL`, `SUMMARY_ENDPOINT`, `SUMMARY_API_KEY`, `SUMMARY_MODEL`
//! - `RUST_LOG`: Log level (e.g., `info`, `debug`)

use buildwatch::lambda::handler;
use lambda_runtime::service_fn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), lambda_runtime::Error> {
    // JSON logs for CloudWatch; `log` records are bridged in by `init`
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("buildwatch Lambda starting...");
    lambda_runtime::run(service_fn(handler)).await
}
