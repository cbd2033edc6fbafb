//! Service layer for the build watcher.
//!
//! This module contains the external collaborators:
//! - Page and script retrieval (`SiteFetcher`, `HttpFetcher`)
//! - Summary generation (`TextGenerator`, `ChatCompletionClient`)
//! - Change notification (`Notifier`, `WebhookNotifier`)

mod fetcher;
mod notifier;
mod summarizer;

pub use fetcher::{HttpFetcher, ScriptFailure, ScriptFetch, SiteFetcher, fetch_scripts};
pub use notifier::{Notifier, WebhookNotifier};
pub use summarizer::{
    ChatCompletionClient, EMPTY_DIFF_SUMMARY, FAILED_SUMMARY, Summary, SummarySource,
    TextGenerator, UNPARSEABLE_SUMMARY, build_prompt, summarize,
};
