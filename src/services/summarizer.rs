// src/services/summarizer.rs

//! One-line summaries of a token diff.
//!
//! [`summarize`] never fails: an empty diff, an unexpected response, and a
//! transport error each map to a fixed sentence.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::SummarizerConfig;

/// Returned for an empty diff without calling the generator.
pub const EMPTY_DIFF_SUMMARY: &str =
    "No meaningful code changes detected; this looks like a rebuild or a non-functional change.";

/// Returned when the generator answered but no text could be read.
pub const UNPARSEABLE_SUMMARY: &str = "Could not parse a summary from the summarization service.";

/// Returned when the generator call failed.
pub const FAILED_SUMMARY: &str = "Summary generation failed.";

/// External text-generation collaborator.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Send one prompt. `Ok(None)` means the response had no usable text.
    async fn generate(&self, prompt: &str) -> Result<Option<String>>;
}

/// Where a summary's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummarySource {
    Generated,
    EmptyDiff,
    Unparseable,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub text: String,
    pub source: SummarySource,
}

impl Summary {
    fn fallback(text: &str, source: SummarySource) -> Self {
        Self {
            text: text.to_string(),
            source,
        }
    }
}

/// Fill the prompt template with the diff text.
pub fn build_prompt(template: &str, diff: &str) -> String {
    template.replace("{diff}", diff)
}

/// Summarize `diff`, substituting a fixed sentence on any failure.
pub async fn summarize(generator: &dyn TextGenerator, template: &str, diff: &str) -> Summary {
    if diff.trim().is_empty() {
        return Summary::fallback(EMPTY_DIFF_SUMMARY, SummarySource::EmptyDiff);
    }

    let prompt = build_prompt(template, diff);
    match generator.generate(&prompt).await {
        Ok(Some(text)) if !text.trim().is_empty() => Summary {
            text: text.trim().to_string(),
            source: SummarySource::Generated,
        },
        Ok(_) => {
            log::warn!("Summarization response carried no text");
            Summary::fallback(UNPARSEABLE_SUMMARY, SummarySource::Unparseable)
        }
        Err(e) => {
            log::error!("Summarization failed: {}", e);
            Summary::fallback(FAILED_SUMMARY, SummarySource::Failed)
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Pull the first completion's text out of a chat-completions response.
fn first_completion(body: &serde_json::Value) -> Option<String> {
    let response: ChatResponse = serde_json::from_value(body.clone()).ok()?;
    response
        .choices
        .into_iter()
        .next()?
        .message?
        .content
}

/// Chat-completions HTTP client.
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: Client,
    config: SummarizerConfig,
}

impl ChatCompletionClient {
    pub fn new(client: Client, config: SummarizerConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionClient {
    async fn generate(&self, prompt: &str) -> Result<Option<String>> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::summarize(format!("HTTP {status}")));
        }

        let body: serde_json::Value = response.json().await?;
        Ok(first_completion(&body))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    enum Reply {
        Text(&'static str),
        Nothing,
        Error,
    }

    struct FakeGenerator {
        reply: Reply,
        calls: AtomicUsize,
    }

    impl FakeGenerator {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextGenerator for FakeGenerator {
        async fn generate(&self, prompt: &str) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("applyCoupon"));
            match self.reply {
                Reply::Text(text) => Ok(Some(text.to_string())),
                Reply::Nothing => Ok(None),
                Reply::Error => Err(AppError::summarize("HTTP 500")),
            }
        }
    }

    const TEMPLATE: &str = "Summarize:\n{diff}";
    const DIFF: &str = "~ changed module: app.js\n  added: applyCoupon\n";

    #[tokio::test]
    async fn test_empty_diff_skips_generator() {
        let generator = FakeGenerator::new(Reply::Text("unused"));
        for diff in ["", "   \n\t"] {
            let summary = summarize(&generator, TEMPLATE, diff).await;
            assert_eq!(summary.text, EMPTY_DIFF_SUMMARY);
            assert_eq!(summary.source, SummarySource::EmptyDiff);
        }
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_generated_text_trimmed() {
        let generator = FakeGenerator::new(Reply::Text("  Added coupon support at checkout.\n"));
        let summary = summarize(&generator, TEMPLATE, DIFF).await;
        assert_eq!(summary.text, "Added coupon support at checkout.");
        assert_eq!(summary.source, SummarySource::Generated);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unparseable_fallback() {
        let generator = FakeGenerator::new(Reply::Nothing);
        let summary = summarize(&generator, TEMPLATE, DIFF).await;
        assert_eq!(summary.text, UNPARSEABLE_SUMMARY);
        assert_eq!(summary.source, SummarySource::Unparseable);
    }

    #[tokio::test]
    async fn test_failure_fallback() {
        let generator = FakeGenerator::new(Reply::Error);
        let summary = summarize(&generator, TEMPLATE, DIFF).await;
        assert_eq!(summary.text, FAILED_SUMMARY);
        assert_eq!(summary.source, SummarySource::Failed);
    }

    #[test]
    fn test_build_prompt() {
        assert_eq!(build_prompt(TEMPLATE, "x"), "Summarize:\nx");
    }

    #[test]
    fn test_first_completion() {
        let body = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "First."}},
                {"message": {"role": "assistant", "content": "Second."}}
            ]
        });
        assert_eq!(first_completion(&body), Some("First.".to_string()));
    }

    #[test]
    fn test_chat_request_shape() {
        let request = ChatRequest {
            model: "gpt-4o-mini",
            messages: vec![ChatMessage {
                role: "user",
                content: "Summarize this",
            }],
            max_tokens: 120,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": "Summarize this"}],
                "max_tokens": 120
            })
        );
    }

    #[test]
    fn test_first_completion_unexpected_shapes() {
        assert_eq!(first_completion(&json!({})), None);
        assert_eq!(first_completion(&json!({"choices": []})), None);
        assert_eq!(first_completion(&json!({"choices": [{}]})), None);
        assert_eq!(first_completion(&json!({"choices": "nope"})), None);
        assert_eq!(first_completion(&json!({"error": {"message": "quota"}})), None);
    }
}
