use super::{NotifyError, Notifier};

/// Emits alerts into the service log. Used when no external channel is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        tracing::warn!(subject, message, "anomaly alert");
        Ok(())
    }
}
