// src/lambda/mod.rs

//! AWS Lambda handler for the watcher.
//!
//! Meant for a scheduled (EventBridge) trigger. Each invocation:
//! 1. Loads configuration (optional TOML object in S3, then environment)
//! 2. Runs one detection pass against the S3-backed state
//! 3. Reports the outcome; failures are returned in the payload, never raised
//!
//! Invoking with `{"test": true}` sends a fixed test notification instead.

use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::pipeline::{RunOutcome, Watcher, log_outcome};
use crate::storage::KeyValueStore;
use crate::storage::s3::S3Store;

/// Lambda invocation payload.
///
/// Scheduled events carry their own fields; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
pub struct WatchRequest {
    /// Send the diagnostic notification instead of running detection
    #[serde(default)]
    pub test: bool,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct WatchResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RunOutcome>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub execution_time_ms: u64,
}

/// Main Lambda handler function.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<WatchRequest>,
) -> std::result::Result<WatchResponse, LambdaError> {
    let start = std::time::Instant::now();
    let (request, _context) = event.into_parts();

    info!("Starting invocation: test={}", request.test);

    let result = run_invocation(&request).await;
    let execution_time_ms = start.elapsed().as_millis() as u64;

    match result {
        Ok(outcome) => {
            info!("Invocation finished in {}ms", execution_time_ms);
            Ok(WatchResponse {
                success: true,
                outcome,
                error: None,
                execution_time_ms,
            })
        }
        Err(e) => {
            error!("Invocation failed: {}", e);
            Ok(WatchResponse {
                success: false,
                error: Some(e.to_string()),
                execution_time_ms,
                ..Default::default()
            })
        }
    }
}

/// Internal invocation logic.
async fn run_invocation(request: &WatchRequest) -> Result<Option<RunOutcome>> {
    let store = Arc::new(S3Store::from_env().await?);
    let config = load_lambda_config(store.as_ref()).await?;
    config.validate()?;

    let watcher = Watcher::from_config(config, store)?;

    if request.test {
        watcher.send_test_notification().await?;
        info!("Test notification sent");
        return Ok(None);
    }

    let outcome = watcher.run().await?;
    log_outcome(&outcome);
    Ok(Some(outcome))
}

/// Load configuration suitable for the Lambda environment.
///
/// When `CONFIG_KEY` is set, that key is read from the store as TOML; the
/// environment overrides are applied on top either way.
async fn load_lambda_config(store: &dyn KeyValueStore) -> Result<Config> {
    let config = match std::env::var("CONFIG_KEY") {
        Ok(key) => {
            info!("Loading config from store key {}", key);
            let text = store
                .get(&key)
                .await?
                .ok_or_else(|| AppError::config(format!("Config key not found: {key}")))?;
            let mut config: Config = toml::from_str(&text)?;
            config.apply_env();
            config
        }
        Err(_) => Config::from_env(),
    };
    Ok(config)
}
