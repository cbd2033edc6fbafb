// src/models/mod.rs

//! Domain models for the build watcher.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod notification;
mod snapshot;

// Re-export all public types
pub use config::{
    Config, DiffConfig, HttpConfig, LoggingConfig, NotifierConfig, SummarizerConfig, TargetConfig,
};
pub use notification::{Embed, EmbedField, EmbedFooter, NotificationPayload, WebhookMessage};
pub use snapshot::{ScriptSet, Snapshot};
