//! Outbound webhook for finished sessions.
//!
//! After a session is recorded the CLI may POST it as JSON to a
//! user-configured URL (for example a spreadsheet script). Failures are
//! reported to the user only; they never touch timer or history state.

use std::time::Duration;

use serde::Serialize;

use crate::types::SessionEntry;

/// Request timeout for webhook posts.
const WEBHOOK_TIMEOUT_SECS: u64 = 10;

/// Webhook error types.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The request could not be sent or timed out
    #[error("Webhook request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The receiver answered with a non-success status
    #[error("Webhook rejected the session: HTTP {0}")]
    Status(reqwest::StatusCode),
}

/// JSON body posted to the webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    /// Task name
    pub task: String,
    /// Duration as `M:SS`
    pub duration: String,
    /// ISO-8601 UTC timestamp
    pub timestamp: String,
    /// Local date
    pub date: String,
    /// Local time
    pub time: String,
}

impl From<&SessionEntry> for WebhookPayload {
    fn from(entry: &SessionEntry) -> Self {
        Self {
            task: entry.task.clone(),
            duration: entry.duration_text.clone(),
            timestamp: entry.timestamp_iso.clone(),
            date: entry.date_text.clone(),
            time: entry.time_text.clone(),
        }
    }
}

/// Client posting sessions to one webhook URL.
pub struct WebhookClient {
    client: reqwest::Client,
    url: String,
}

impl WebhookClient {
    /// Creates a client for `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>) -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(WEBHOOK_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Posts `entry` once; no retry.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or a non-2xx status.
    pub async fn post_session(&self, entry: &SessionEntry) -> Result<(), WebhookError> {
        let payload = WebhookPayload::from(entry);
        let response = self.client.post(&self.url).json(&payload).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, url = %self.url, "webhook rejected session");
            return Err(WebhookError::Status(status));
        }

        tracing::debug!(url = %self.url, task = %payload.task, "session posted to webhook");
        Ok(())
    }
}
