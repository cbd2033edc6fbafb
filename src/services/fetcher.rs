// src/services/fetcher.rs

//! Page and script retrieval.
//!
//! Script downloads fan out concurrently; a failed download drops that one
//! module and is reported in [`ScriptFetch::failures`].

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::ScriptSet;
use crate::pipeline::canonical_name;
use crate::utils::resolve_url;

/// Source of page markup and script bodies.
#[async_trait]
pub trait SiteFetcher: Send + Sync {
    /// Fetch a page body; non-success statuses are errors.
    async fn fetch_page(&self, url: &str) -> Result<String>;

    /// Fetch a single script body.
    async fn fetch_script(&self, url: &str) -> Result<String>;
}

/// reqwest-backed fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn get_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::fetch(url, status));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl SiteFetcher for HttpFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }

    async fn fetch_script(&self, url: &str) -> Result<String> {
        self.get_text(url).await
    }
}

/// A script path that could not be downloaded.
#[derive(Debug, Clone)]
pub struct ScriptFailure {
    pub path: String,
    pub error: String,
}

/// Outcome of a script fan-out.
#[derive(Debug, Default)]
pub struct ScriptFetch {
    /// Downloaded modules keyed by canonical name
    pub scripts: ScriptSet,
    pub failures: Vec<ScriptFailure>,
}

impl ScriptFetch {
    /// Paths that were requested but are missing from `scripts`.
    pub fn dropped_paths(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.path.clone()).collect()
    }
}

/// Download every path relative to `origin`, at most `concurrency` at a time.
///
/// Results are keyed by [`canonical_name`]; when two paths share a canonical
/// name, whichever finished last wins.
pub async fn fetch_scripts(
    fetcher: &dyn SiteFetcher,
    origin: &Url,
    paths: &[String],
    concurrency: usize,
) -> ScriptFetch {
    let mut outcome = ScriptFetch::default();

    let mut downloads = stream::iter(paths)
        .map(|path| async move {
            let url = resolve_url(origin, path);
            (path, fetcher.fetch_script(&url).await)
        })
        .buffer_unordered(concurrency.max(1));

    while let Some((path, result)) = downloads.next().await {
        match result {
            Ok(content) => outcome.scripts.insert(canonical_name(path), content),
            Err(error) => {
                log::warn!("Failed to download script {}: {}", path, error);
                outcome.failures.push(ScriptFailure {
                    path: path.clone(),
                    error: error.to_string(),
                });
            }
        }
    }

    outcome
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    struct FakeFetcher {
        scripts: HashMap<String, String>,
        requested: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                scripts: entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SiteFetcher for FakeFetcher {
        async fn fetch_page(&self, _url: &str) -> Result<String> {
            Ok(String::new())
        }

        async fn fetch_script(&self, url: &str) -> Result<String> {
            self.requested.lock().unwrap().push(url.to_string());
            self.scripts
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::Fetch {
                    url: url.to_string(),
                    status: 404,
                })
        }
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_successes() {
        let fetcher = FakeFetcher::new(&[
            (
                "https://example.com/_next/static/chunks/main-0123456789abcdef.js",
                "main body",
            ),
            (
                "https://example.com/_next/static/chunks/framework-fedcba9876543210.js",
                "framework body",
            ),
        ]);
        let origin = Url::parse("https://example.com/some/page").unwrap();
        let paths = vec![
            "/_next/static/chunks/main-0123456789abcdef.js".to_string(),
            "/_next/static/chunks/missing-aaaaaaaaaaaaaaaa.js".to_string(),
            "/_next/static/chunks/framework-fedcba9876543210.js".to_string(),
        ];

        let outcome = fetch_scripts(&fetcher, &origin, &paths, 2).await;

        assert_eq!(outcome.scripts.len(), 2);
        assert_eq!(
            outcome.scripts.get("/_next/static/chunks/main.js"),
            Some("main body")
        );
        assert_eq!(
            outcome.scripts.get("/_next/static/chunks/framework.js"),
            Some("framework body")
        );
        assert_eq!(
            outcome.dropped_paths(),
            vec!["/_next/static/chunks/missing-aaaaaaaaaaaaaaaa.js"]
        );
        assert_eq!(fetcher.requested.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_paths() {
        let fetcher = FakeFetcher::new(&[]);
        let origin = Url::parse("https://example.com/").unwrap();
        let outcome = fetch_scripts(&fetcher, &origin, &[], 4).await;
        assert!(outcome.scripts.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let fetcher = FakeFetcher::new(&[("https://example.com/a.js", "a")]);
        let origin = Url::parse("https://example.com/").unwrap();
        let outcome = fetch_scripts(&fetcher, &origin, &["/a.js".to_string()], 0).await;
        assert_eq!(outcome.scripts.get("/a.js"), Some("a"));
    }
}
