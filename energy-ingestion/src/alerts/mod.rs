mod dispatcher;
mod logging;
mod webhook;

pub use dispatcher::{Alert, AlertDispatcher, DispatchError, DEFAULT_ALERT_SUBJECT};
pub use logging::LogNotifier;
pub use webhook::WebhookNotifier;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Delivery did not happen or its result is unknown; worth retrying.
    #[error("notification transport error: {0}")]
    Transport(String),
    #[error("notification rejected: {0}")]
    Rejected(String),
}

/// Fan-out notification channel (topic publish, webhook, ...).
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError>;
}
