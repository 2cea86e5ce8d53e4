use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;

use super::{NotifyError, Notifier};

/// Publishes alerts as `{"subject", "message"}` JSON to an HTTP endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    subject: &'a str,
    message: &'a str,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { subject, message })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        classify_status(response.status())
    }
}

fn classify_status(status: StatusCode) -> Result<(), NotifyError> {
    if status.is_success() {
        Ok(())
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Err(NotifyError::Transport(format!("webhook returned {status}")))
    } else {
        Err(NotifyError::Rejected(format!("webhook returned {status}")))
    }
}
