// src/pipeline/run.rs

//! Change-detection run.
//!
//! One call to [`Watcher::run`] fetches the target page, compares its build
//! id with the stored one and, on a new deployment, diffs the scripts,
//! summarizes, notifies and persists the new snapshot. Nothing is kept in
//! memory between runs.

use std::sync::Arc;

use serde::Serialize;
use url::Url;

use crate::error::Result;
use crate::models::{Config, NotificationPayload, ScriptSet, Snapshot};
use crate::pipeline::{ScriptDiffer, ScriptPathExtractor, extract_build_id};
use crate::services::{
    ChatCompletionClient, HttpFetcher, Notifier, ScriptFetch, SiteFetcher, Summary, TextGenerator,
    WebhookNotifier, fetch_scripts, summarize,
};
use crate::storage::{KeyValueStore, StateStore};
use crate::utils::http::create_async_client;
use crate::utils::log as report;

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No prior state; the current snapshot was stored without notifying
    Bootstrap {
        build_id: String,
        modules: usize,
        dropped: Vec<String>,
    },
    /// Build id matches the stored one
    NoChange { build_id: String },
    /// New build detected, notified and stored
    Changed {
        previous_build_id: String,
        build_id: String,
        modules: usize,
        dropped: Vec<String>,
        summary: Summary,
        notified: bool,
    },
    /// The page carried no build id; nothing was touched
    Aborted { reason: String },
}

impl RunOutcome {
    pub fn state(&self) -> &'static str {
        match self {
            RunOutcome::Bootstrap { .. } => "bootstrap",
            RunOutcome::NoChange { .. } => "no_change",
            RunOutcome::Changed { .. } => "changed",
            RunOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// The pipeline with its collaborators injected.
pub struct Watcher {
    config: Config,
    fetcher: Arc<dyn SiteFetcher>,
    state: StateStore,
    generator: Arc<dyn TextGenerator>,
    notifier: Arc<dyn Notifier>,
}

impl Watcher {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn SiteFetcher>,
        store: Arc<dyn KeyValueStore>,
        generator: Arc<dyn TextGenerator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            fetcher,
            state: StateStore::new(store),
            generator,
            notifier,
        }
    }

    /// Wire the HTTP collaborators from configuration around `store`.
    pub fn from_config(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let client = create_async_client(&config.http)?;
        let fetcher = Arc::new(HttpFetcher::with_client(client.clone()));
        let generator = Arc::new(ChatCompletionClient::new(
            client.clone(),
            config.summarizer.clone(),
        ));
        let notifier = Arc::new(WebhookNotifier::new(client, config.notifier.clone()));
        Ok(Self::new(config, fetcher, store, generator, notifier))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Run the detection pipeline once.
    ///
    /// Errors are returned only for failures before any state is written
    /// (page fetch, store reads) or for the final persistence step.
    pub async fn run(&self) -> Result<RunOutcome> {
        let target = Url::parse(&self.config.target.url)?;

        report::step(1, 4, &format!("Fetching {}", target));
        let markup = self.fetcher.fetch_page(target.as_str()).await?;

        let Some(build_id) = extract_build_id(&markup) else {
            log::warn!("No build id found on {}; skipping this run", target);
            return Ok(RunOutcome::Aborted {
                reason: format!("no build id found on {target}"),
            });
        };

        let previous_build_id = self.state.last_build_id().await?;
        if previous_build_id.as_deref() == Some(build_id.as_str()) {
            log::info!("Build {} unchanged", build_id);
            return Ok(RunOutcome::NoChange { build_id });
        }

        report::step(2, 4, "Downloading scripts");
        let fetched = self.fetch_current_scripts(&target, &markup).await?;
        let dropped = fetched.dropped_paths();
        let snapshot = Snapshot::new(build_id, fetched.scripts)?;

        let Some(previous_build_id) = previous_build_id else {
            log::info!(
                "No previous state; storing build {} as baseline",
                snapshot.build_id()
            );
            self.state.save_snapshot(&snapshot).await?;
            return Ok(RunOutcome::Bootstrap {
                build_id: snapshot.build_id().to_string(),
                modules: snapshot.scripts.len(),
                dropped,
            });
        };

        log::info!(
            "New build detected: {} → {}",
            previous_build_id,
            snapshot.build_id()
        );

        report::step(3, 4, "Diffing and summarizing");
        let previous_scripts = self.state.last_scripts().await?.unwrap_or_default();
        let summary = self.summarize_change(&previous_scripts, &snapshot.scripts).await;

        report::step(4, 4, "Notifying and saving");
        let payload = NotificationPayload::new(
            previous_build_id.as_str(),
            snapshot.build_id(),
            summary.text.as_str(),
        );
        let notified = match self.notifier.send(&payload).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Notification failed, continuing: {}", e);
                false
            }
        };

        // Saved even when the notification failed, so the same transition is
        // not announced again on the next run.
        self.state.save_snapshot(&snapshot).await?;

        Ok(RunOutcome::Changed {
            previous_build_id,
            build_id: snapshot.build_id().to_string(),
            modules: snapshot.scripts.len(),
            dropped,
            summary,
            notified,
        })
    }

    /// Run once and log the outcome; failures are logged, never propagated.
    pub async fn run_logged(&self) -> Option<RunOutcome> {
        match self.run().await {
            Ok(outcome) => {
                log_outcome(&outcome);
                Some(outcome)
            }
            Err(e) => {
                log::error!("Run failed: {}", e);
                None
            }
        }
    }

    /// Send the fixed diagnostic notification, bypassing detection.
    pub async fn send_test_notification(&self) -> Result<()> {
        self.notifier.send(&NotificationPayload::test()).await
    }

    async fn fetch_current_scripts(&self, target: &Url, markup: &str) -> Result<ScriptFetch> {
        let extractor = ScriptPathExtractor::new(&self.config.target.script_prefix)?;
        let paths = extractor.extract(markup);
        log::info!("Found {} script references", paths.len());

        let fetched = fetch_scripts(
            self.fetcher.as_ref(),
            target,
            &paths,
            self.config.http.max_concurrent,
        )
        .await;

        if !fetched.failures.is_empty() {
            log::warn!(
                "{} of {} scripts could not be downloaded",
                fetched.failures.len(),
                paths.len()
            );
        }
        Ok(fetched)
    }

    async fn summarize_change(&self, previous: &ScriptSet, current: &ScriptSet) -> Summary {
        let result = ScriptDiffer::new(self.config.diff.clone()).calculate(previous, current);
        log::info!(
            "Diff: {} reported, {} unchanged, {} with only short-token changes",
            result.changes.len(),
            result.unchanged,
            result.suppressed
        );
        let diff_text = result.render(self.config.diff.max_chars);
        summarize(
            self.generator.as_ref(),
            &self.config.summarizer.prompt_template,
            &diff_text,
        )
        .await
    }
}

/// Write the run summary block for an outcome.
pub fn log_outcome(outcome: &RunOutcome) {
    let mut items = vec![("State", outcome.state().to_string())];
    match outcome {
        RunOutcome::Bootstrap {
            build_id,
            modules,
            dropped,
        } => {
            items.push(("Build", build_id.clone()));
            items.push(("Modules", modules.to_string()));
            items.push(("Dropped", dropped.len().to_string()));
        }
        RunOutcome::NoChange { build_id } => items.push(("Build", build_id.clone())),
        RunOutcome::Changed {
            previous_build_id,
            build_id,
            modules,
            dropped,
            summary,
            notified,
        } => {
            items.push(("Build", format!("{previous_build_id} → {build_id}")));
            items.push(("Modules", modules.to_string()));
            items.push(("Dropped", dropped.len().to_string()));
            items.push(("Summary", summary.text.clone()));
            items.push(("Notified", notified.to_string()));
        }
        RunOutcome::Aborted { reason } => items.push(("Reason", reason.clone())),
    }
    report::summary("Run complete", &items);
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::AppError;
    use crate::services::{EMPTY_DIFF_SUMMARY, SummarySource};
    use crate::storage::{LAST_BUILD_ID, MemoryStore};

    const ORIGIN: &str = "https://shop.example.com";

    /// Serves one page and a mutable set of scripts.
    #[derive(Default)]
    struct FakeSite {
        page: Mutex<Option<String>>,
        scripts: Mutex<HashMap<String, String>>,
        script_requests: AtomicUsize,
    }

    impl FakeSite {
        fn publish(&self, build_id: &str, scripts: &[(&str, &str)]) {
            let tags: String = scripts
                .iter()
                .map(|(path, _)| format!(r#"<script src="{path}" defer></script>"#))
                .collect();
            *self.page.lock().unwrap() = Some(format!(
                r#"<html><head>{tags}</head><body><script id="__NEXT_DATA__">{{"buildId":"{build_id}"}}</script></body></html>"#
            ));
            *self.scripts.lock().unwrap() = scripts
                .iter()
                .map(|(path, body)| (format!("{ORIGIN}{path}"), body.to_string()))
                .collect();
        }

        fn publish_raw(&self, markup: &str) {
            *self.page.lock().unwrap() = Some(markup.to_string());
        }

        fn break_script(&self, path: &str) {
            self.scripts.lock().unwrap().remove(&format!("{ORIGIN}{path}"));
        }
    }

    #[async_trait]
    impl SiteFetcher for FakeSite {
        async fn fetch_page(&self, url: &str) -> Result<String> {
            self.page.lock().unwrap().clone().ok_or_else(|| AppError::Fetch {
                url: url.to_string(),
                status: 503,
            })
        }

        async fn fetch_script(&self, url: &str) -> Result<String> {
            self.script_requests.fetch_add(1, Ordering::SeqCst);
            self.scripts.lock().unwrap().get(url).cloned().ok_or_else(|| {
                AppError::Fetch {
                    url: url.to_string(),
                    status: 404,
                }
            })
        }
    }

    #[derive(Default)]
    struct FakeGenerator {
        prompts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<Option<String>> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(Some("Checkout now supports coupons.".to_string()))
        }
    }

    #[derive(Default)]
    struct FakeNotifier {
        sent: Mutex<Vec<NotificationPayload>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for FakeNotifier {
        async fn send(&self, payload: &NotificationPayload) -> Result<()> {
            self.sent.lock().unwrap().push(payload.clone());
            if self.fail {
                return Err(AppError::notify("https://hooks.example.com", "HTTP 500"));
            }
            Ok(())
        }
    }

    struct Harness {
        site: Arc<FakeSite>,
        store: Arc<MemoryStore>,
        generator: Arc<FakeGenerator>,
        notifier: Arc<FakeNotifier>,
        watcher: Watcher,
    }

    fn harness_with(notifier: FakeNotifier) -> Harness {
        let mut config = Config::default();
        config.target.url = format!("{ORIGIN}/");
        config.notifier.webhook_url = "https://hooks.example.com/abc".to_string();

        let site = Arc::new(FakeSite::default());
        let store = Arc::new(MemoryStore::new());
        let generator = Arc::new(FakeGenerator::default());
        let notifier = Arc::new(notifier);
        let watcher = Watcher::new(
            config,
            site.clone(),
            store.clone(),
            generator.clone(),
            notifier.clone(),
        );
        Harness {
            site,
            store,
            generator,
            notifier,
            watcher,
        }
    }

    fn harness() -> Harness {
        harness_with(FakeNotifier::default())
    }

    const MAIN_V1: (&str, &str) = (
        "/_next/static/chunks/main-0123456789abcdef.js",
        "function renderCart(items){return items}",
    );
    const MAIN_V2: (&str, &str) = (
        "/_next/static/chunks/main-fedcba9876543210.js",
        "function renderCart(items){return applyCoupon(items)}",
    );
    const FRAMEWORK: (&str, &str) = (
        "/_next/static/chunks/framework-0c7baedefba6b077.js",
        "function createElement(type){}",
    );

    #[tokio::test]
    async fn test_first_run_bootstraps_without_notifying() {
        let h = harness();
        h.site.publish("build-1", &[MAIN_V1, FRAMEWORK]);

        let outcome = h.watcher.run().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Bootstrap {
                build_id: "build-1".into(),
                modules: 2,
                dropped: vec![],
            }
        );
        assert!(h.notifier.sent.lock().unwrap().is_empty());
        assert!(h.generator.prompts.lock().unwrap().is_empty());

        let scripts = h.watcher.state().last_scripts().await.unwrap().unwrap();
        assert_eq!(
            scripts.get("/_next/static/chunks/main.js"),
            Some(MAIN_V1.1)
        );
        assert_eq!(
            h.watcher.state().last_build_id().await.unwrap().as_deref(),
            Some("build-1")
        );
    }

    #[tokio::test]
    async fn test_same_page_twice_is_no_change() {
        let h = harness();
        h.site.publish("build-1", &[MAIN_V1]);

        h.watcher.run().await.unwrap();
        let writes = h.store.write_count();
        let requests = h.site.script_requests.load(Ordering::SeqCst);

        let outcome = h.watcher.run().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::NoChange {
                build_id: "build-1".into()
            }
        );
        assert_eq!(h.store.write_count(), writes);
        assert_eq!(h.site.script_requests.load(Ordering::SeqCst), requests);
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_script_changes_without_new_build_id_are_ignored() {
        let h = harness();
        h.site.publish("build-1", &[MAIN_V1]);
        h.watcher.run().await.unwrap();

        h.site.publish("build-1", &[MAIN_V2, FRAMEWORK]);
        let outcome = h.watcher.run().await.unwrap();

        assert_eq!(outcome.state(), "no_change");
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_new_build_notifies_then_persists() {
        let h = harness();
        h.site.publish("build-1", &[MAIN_V1]);
        h.watcher.run().await.unwrap();

        h.site.publish("build-2", &[MAIN_V2, FRAMEWORK]);
        let outcome = h.watcher.run().await.unwrap();

        let RunOutcome::Changed {
            previous_build_id,
            build_id,
            summary,
            notified,
            ..
        } = &outcome
        else {
            panic!("expected a change, got {outcome:?}");
        };
        assert_eq!(previous_build_id, "build-1");
        assert_eq!(build_id, "build-2");
        assert_eq!(summary.source, SummarySource::Generated);
        assert!(*notified);

        let prompts = h.generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("~ changed module: /_next/static/chunks/main.js"));
        assert!(prompts[0].contains("applyCoupon"));
        assert!(prompts[0].contains("+ added module: /_next/static/chunks/framework.js"));

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].previous_build_id, "build-1");
        assert_eq!(sent[0].new_build_id, "build-2");
        assert_eq!(sent[0].summary, "Checkout now supports coupons.");

        assert_eq!(
            h.watcher.state().last_build_id().await.unwrap().as_deref(),
            Some("build-2")
        );
    }

    #[tokio::test]
    async fn test_trivial_change_uses_fallback_summary() {
        let h = harness();
        h.site.publish("build-1", &[MAIN_V1]);
        h.watcher.run().await.unwrap();

        // Same content under a new hash and build id
        h.site.publish("build-2", &[(MAIN_V2.0, MAIN_V1.1)]);
        let outcome = h.watcher.run().await.unwrap();

        let RunOutcome::Changed { summary, .. } = outcome else {
            panic!("expected a change");
        };
        assert_eq!(summary.text, EMPTY_DIFF_SUMMARY);
        assert!(h.generator.prompts.lock().unwrap().is_empty());
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_still_persists() {
        let h = harness_with(FakeNotifier {
            fail: true,
            ..FakeNotifier::default()
        });
        h.site.publish("build-1", &[MAIN_V1]);
        h.watcher.run().await.unwrap();

        h.site.publish("build-2", &[MAIN_V2]);
        let outcome = h.watcher.run().await.unwrap();

        let RunOutcome::Changed { notified, .. } = outcome else {
            panic!("expected a change");
        };
        assert!(!notified);
        assert_eq!(
            h.watcher.state().last_build_id().await.unwrap().as_deref(),
            Some("build-2")
        );

        // The transition is not announced a second time
        assert_eq!(h.watcher.run().await.unwrap().state(), "no_change");
        assert_eq!(h.notifier.sent.lock().unwrap().len(), 1);
    }

    /// Records what the store holds at the moment a notification goes out.
    struct StoreWatchingNotifier {
        store: Arc<MemoryStore>,
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait]
    impl Notifier for StoreWatchingNotifier {
        async fn send(&self, _payload: &NotificationPayload) -> Result<()> {
            let stored = self.store.get(LAST_BUILD_ID).await?;
            self.seen.lock().unwrap().push(stored);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_snapshot_persisted_after_notification() {
        let mut config = Config::default();
        config.target.url = format!("{ORIGIN}/");

        let site = Arc::new(FakeSite::default());
        let store = Arc::new(MemoryStore::new());
        let notifier = Arc::new(StoreWatchingNotifier {
            store: store.clone(),
            seen: Mutex::new(Vec::new()),
        });
        let watcher = Watcher::new(
            config,
            site.clone(),
            store.clone(),
            Arc::new(FakeGenerator::default()),
            notifier.clone(),
        );

        site.publish("build-1", &[MAIN_V1]);
        watcher.run().await.unwrap();

        site.publish("build-2", &[MAIN_V2]);
        assert_eq!(watcher.run().await.unwrap().state(), "changed");

        assert_eq!(
            *notifier.seen.lock().unwrap(),
            vec![Some("build-1".to_string())]
        );
        assert_eq!(
            store.get(LAST_BUILD_ID).await.unwrap().as_deref(),
            Some("build-2")
        );
        assert_eq!(watcher.run().await.unwrap().state(), "no_change");
    }

    #[tokio::test]
    async fn test_missing_build_id_aborts_without_writes() {
        let h = harness();
        h.site.publish_raw("<html><body>Under maintenance</body></html>");

        let outcome = h.watcher.run().await.unwrap();

        assert_eq!(outcome.state(), "aborted");
        assert_eq!(h.store.write_count(), 0);
        assert_eq!(h.site.script_requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_page_fetch_failure_is_an_error() {
        let h = harness();
        let err = h.watcher.run().await.unwrap_err();
        assert!(matches!(err, AppError::Fetch { status: 503, .. }));
        assert_eq!(h.store.write_count(), 0);
        assert!(h.watcher.run_logged().await.is_none());
    }

    #[tokio::test]
    async fn test_partial_script_failure_keeps_the_rest() {
        let h = harness();
        let third = (
            "/_next/static/chunks/webpack-59c5c889f52620d6.js",
            "function webpackRuntime(){}",
        );
        h.site.publish("build-1", &[MAIN_V1, FRAMEWORK, third]);
        h.site.break_script(FRAMEWORK.0);

        let outcome = h.watcher.run().await.unwrap();

        assert_eq!(
            outcome,
            RunOutcome::Bootstrap {
                build_id: "build-1".into(),
                modules: 2,
                dropped: vec![FRAMEWORK.0.to_string()],
            }
        );
        let scripts = h.watcher.state().last_scripts().await.unwrap().unwrap();
        assert_eq!(scripts.len(), 2);
        assert!(scripts.get("/_next/static/chunks/framework.js").is_none());
    }

    #[tokio::test]
    async fn test_blank_stored_build_id_bootstraps() {
        let h = harness();
        h.store.put(LAST_BUILD_ID, "").await.unwrap();
        h.site.publish("build-1", &[MAIN_V1]);

        assert_eq!(h.watcher.run().await.unwrap().state(), "bootstrap");
        assert!(h.notifier.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_test_notification() {
        let h = harness();
        h.watcher.send_test_notification().await.unwrap();

        let sent = h.notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let expected = NotificationPayload::test();
        assert_eq!(sent[0].previous_build_id, expected.previous_build_id);
        assert_eq!(sent[0].new_build_id, expected.new_build_id);
        assert_eq!(sent[0].summary, expected.summary);
        assert_eq!(h.store.write_count(), 0);
    }

    #[test]
    fn test_outcome_serializes_with_state_tag() {
        let outcome = RunOutcome::NoChange {
            build_id: "abc".into(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["state"], "no_change");
        assert_eq!(json["build_id"], "abc");
    }
}
