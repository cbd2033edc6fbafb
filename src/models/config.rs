//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Site being watched
    #[serde(default)]
    pub target: TargetConfig,

    /// HTTP client behavior
    #[serde(default)]
    pub http: HttpConfig,

    /// Token diff limits
    #[serde(default)]
    pub diff: DiffConfig,

    /// Text-generation endpoint used for summaries
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Outbound webhook settings
    #[serde(default)]
    pub notifier: NotifierConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Build configuration purely from defaults and environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Override settings from environment variables when present.
    ///
    /// Secrets (webhook URL, API key) are expected to arrive this way rather
    /// than through the TOML file.
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(url) = var("TARGET_URL") {
            self.target.url = url;
        }
        if let Some(url) = var("WEBHOOK_URL") {
            self.notifier.webhook_url = url;
        }
        if let Some(endpoint) = var("SUMMARY_ENDPOINT") {
            self.summarizer.endpoint = endpoint;
        }
        if let Some(key) = var("SUMMARY_API_KEY") {
            self.summarizer.api_key = key;
        }
        if let Some(model) = var("SUMMARY_MODEL") {
            self.summarizer.model = model;
        }
        if let Some(secs) = var("HTTP_TIMEOUT_SECS").and_then(|v| v.parse().ok()) {
            self.http.timeout_secs = secs;
        }
        if let Some(n) = var("MAX_CONCURRENT").and_then(|v| v.parse().ok()) {
            self.http.max_concurrent = n;
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.target.url)
            .map_err(|e| AppError::validation(format!("target.url is invalid: {e}")))?;
        if !self.target.script_prefix.starts_with('/') {
            return Err(AppError::validation(
                "target.script_prefix must start with '/'",
            ));
        }
        if self.http.user_agent.trim().is_empty() {
            return Err(AppError::validation("http.user_agent is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        if self.diff.max_tokens_per_list == 0 || self.diff.max_chars == 0 {
            return Err(AppError::validation("diff limits must be > 0"));
        }
        if self.summarizer.endpoint.trim().is_empty() {
            return Err(AppError::validation("summarizer.endpoint is empty"));
        }
        if !self.summarizer.prompt_template.contains("{diff}") {
            return Err(AppError::validation(
                "summarizer.prompt_template must contain {diff}",
            ));
        }
        if self.notifier.webhook_url.trim().is_empty() {
            return Err(AppError::validation("notifier.webhook_url is empty"));
        }
        Ok(())
    }
}

/// The watched site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Page whose markup carries the build id
    #[serde(default = "defaults::target_url")]
    pub url: String,

    /// Path prefix of bundled script references
    #[serde(default = "defaults::script_prefix")]
    pub script_prefix: String,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: defaults::target_url(),
            script_prefix: defaults::script_prefix(),
        }
    }
}

/// HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent script downloads
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Limits applied when rendering the token diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffConfig {
    /// Tokens must be strictly longer than this to be listed
    #[serde(default = "defaults::min_token_length")]
    pub min_token_length: usize,

    /// Tokens listed per added/removed line
    #[serde(default = "defaults::max_tokens_per_list")]
    pub max_tokens_per_list: usize,

    /// Hard cap on the rendered diff text
    #[serde(default = "defaults::max_diff_chars")]
    pub max_chars: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            min_token_length: defaults::min_token_length(),
            max_tokens_per_list: defaults::max_tokens_per_list(),
            max_chars: defaults::max_diff_chars(),
        }
    }
}

/// Chat-completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default = "defaults::summary_endpoint")]
    pub endpoint: String,

    /// Bearer token; usually supplied through `SUMMARY_API_KEY`
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "defaults::summary_model")]
    pub model: String,

    #[serde(default = "defaults::summary_max_tokens")]
    pub max_tokens: u32,

    /// Prompt sent with the diff; `{diff}` is replaced by the diff text
    #[serde(default = "defaults::prompt_template")]
    pub prompt_template: String,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::summary_endpoint(),
            api_key: String::new(),
            model: defaults::summary_model(),
            max_tokens: defaults::summary_max_tokens(),
            prompt_template: defaults::prompt_template(),
        }
    }
}

/// Webhook message settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Usually supplied through `WEBHOOK_URL`
    #[serde(default)]
    pub webhook_url: String,

    /// Plain content line above the embed
    #[serde(default = "defaults::notify_content")]
    pub content: String,

    #[serde(default = "defaults::notify_title")]
    pub title: String,

    #[serde(default = "defaults::notify_footer")]
    pub footer: String,

    /// Embed accent color as a 24-bit RGB integer
    #[serde(default = "defaults::notify_color")]
    pub color: u32,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: String::new(),
            content: defaults::notify_content(),
            title: defaults::notify_title(),
            footer: defaults::notify_footer(),
            color: defaults::notify_color(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// One of `debug`, `info`, `warn`, `error`
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    // Target defaults
    pub fn target_url() -> String {
        "https://example.com/".into()
    }
    pub fn script_prefix() -> String {
        "/_next/static/chunks/".into()
    }

    // HTTP defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; buildwatch/0.1; +deployment-monitor)".into()
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        8
    }

    // Diff defaults
    pub fn min_token_length() -> usize {
        3
    }
    pub fn max_tokens_per_list() -> usize {
        40
    }
    pub fn max_diff_chars() -> usize {
        3000
    }

    // Summarizer defaults
    pub fn summary_endpoint() -> String {
        "https://api.openai.com/v1/chat/completions".into()
    }
    pub fn summary_model() -> String {
        "gpt-4o-mini".into()
    }
    pub fn summary_max_tokens() -> u32 {
        120
    }
    pub fn prompt_template() -> String {
        "The following is a token-level diff of the JavaScript bundles of a website \
         between two deployments. Lines starting with '+' are new modules, '~' are \
         changed modules with the identifiers that were added or removed. In one short \
         sentence, describe what most likely changed for users of the site.\n\n{diff}"
            .into()
    }

    // Notifier defaults
    pub fn notify_content() -> String {
        "New deployment detected".into()
    }
    pub fn notify_title() -> String {
        "Site updated".into()
    }
    pub fn notify_footer() -> String {
        "buildwatch".into()
    }
    pub fn notify_color() -> u32 {
        0x5865F2
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
