//! Notification payload and its webhook wire shape.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::NotifierConfig;

/// One detected build transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationPayload {
    pub previous_build_id: String,
    pub new_build_id: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl NotificationPayload {
    pub fn new(
        previous_build_id: impl Into<String>,
        new_build_id: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            previous_build_id: previous_build_id.into(),
            new_build_id: new_build_id.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }

    /// Fixed payload for the diagnostic trigger.
    pub fn test() -> Self {
        Self::new(
            "test-previous",
            "test-current",
            "This is a test notification. No deployment was inspected.",
        )
    }

    /// Render the webhook body using the configured presentation.
    pub fn to_message(&self, config: &NotifierConfig) -> WebhookMessage {
        WebhookMessage {
            content: config.content.clone(),
            embeds: vec![Embed {
                title: config.title.clone(),
                description: self.summary.clone(),
                color: config.color,
                fields: vec![EmbedField {
                    name: "Build".to_string(),
                    value: format!("{} → {}", self.previous_build_id, self.new_build_id),
                    inline: false,
                }],
                footer: EmbedFooter {
                    text: config.footer.clone(),
                },
                timestamp: self.timestamp.to_rfc3339(),
            }],
        }
    }
}

/// JSON body posted to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookMessage {
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub footer: EmbedFooter,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}
