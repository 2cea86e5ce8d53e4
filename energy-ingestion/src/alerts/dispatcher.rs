use std::{sync::Arc, time::Duration};

use energy_client::domain::{format_timestamp, EnergyReading};
use serde::Serialize;

use super::{NotifyError, Notifier};

pub const DEFAULT_ALERT_SUBJECT: &str = "Energy Anomaly Alert";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub subject: String,
    pub message: String,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("alert dispatch failed after {attempts} attempt(s): {source}")]
pub struct DispatchError {
    pub attempts: u32,
    pub source: NotifyError,
}

/// Turns anomalous readings into notifications.
///
/// Callers invoke it only after the reading is committed to the store.
/// Delivery is best effort: failures are returned to the caller for
/// reporting and never affect the stored reading.
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    subject: String,
    max_retries: u32,
    retry_backoff: Duration,
    timeout: Duration,
}

impl AlertDispatcher {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        subject: impl Into<String>,
        max_retries: u32,
        retry_backoff: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            notifier,
            subject: subject.into(),
            max_retries,
            retry_backoff,
            timeout,
        }
    }

    pub fn compose(&self, reading: &EnergyReading) -> Alert {
        let timestamp =
            format_timestamp(reading.timestamp).unwrap_or_else(|_| reading.timestamp.to_string());

        let message = format!(
            "Anomaly detected\n\n\
             Site ID: {}\n\
             Timestamp: {}\n\
             Generated: {} kWh\n\
             Consumed: {} kWh\n\
             Net: {} kWh\n",
            reading.site_id,
            timestamp,
            reading.energy_generated_kwh,
            reading.energy_consumed_kwh,
            reading.net_energy_kwh,
        );

        Alert {
            subject: self.subject.clone(),
            message,
        }
    }

    pub async fn dispatch(&self, reading: &EnergyReading) -> Result<(), DispatchError> {
        let alert = self.compose(reading);

        let mut attempt: u32 = 0;
        loop {
            let res = match tokio::time::timeout(
                self.timeout,
                self.notifier.publish(&alert.subject, &alert.message),
            )
            .await
            {
                Ok(res) => res,
                Err(_) => Err(NotifyError::Transport(format!(
                    "publish timed out after {}ms",
                    self.timeout.as_millis()
                ))),
            };

            match res {
                Ok(()) => {
                    metrics::counter!("energy_alerts_sent_total").increment(1);
                    tracing::info!(site_id = %reading.site_id, "anomaly alert sent");
                    return Ok(());
                }
                Err(e @ NotifyError::Transport(_)) if attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        site_id = %reading.site_id,
                        "alert publish failed, retrying with backoff"
                    );
                    tokio::time::sleep(self.retry_backoff * attempt).await;
                }
                Err(e) => {
                    metrics::counter!("energy_alert_failures_total").increment(1);
                    return Err(DispatchError {
                        attempts: attempt + 1,
                        source: e,
                    });
                }
            }
        }
    }
}
