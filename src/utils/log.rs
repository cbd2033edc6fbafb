// src/utils/log.rs

//! Run-report helpers on top of the `log` facade.
//!
//! Keeps step and summary lines uniform between the CLI and Lambda output.

/// Log a step in a run
pub fn step(step_num: usize, total: usize, message: &str) {
    log::info!("[STEP {}/{}] {}", step_num, total, message);
}

/// Log a summary section
pub fn summary(title: &str, items: &[(&str, String)]) {
    log::info!("[SUMMARY] {}", title);
    for (key, value) in items {
        log::info!("    {}: {}", key, value);
    }
}

/// Map a configured level name to a filter, defaulting to `Info`.
pub fn level_filter(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "debug" => log::LevelFilter::Debug,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "trace" => log::LevelFilter::Trace,
        _ => log::LevelFilter::Info,
    }
}
