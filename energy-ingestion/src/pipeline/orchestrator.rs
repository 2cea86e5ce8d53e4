use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use energy_client::domain::EnergyReading;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::outcome::{
    AlertStatus, BatchAccumulator, BatchOutcome, FailureReason, RecordOutcome, RecordResult,
};
use crate::{
    alerts::{AlertDispatcher, Notifier, DEFAULT_ALERT_SUBJECT},
    sinks::{IdempotentWriter, ReadingStore},
    transform::{classify, normalize, RawRecord, SITE_ID},
};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("malformed batch: {0}")]
    MalformedBatch(String),
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Records of one batch processed at the same time.
    pub concurrency: usize,
    pub batch_timeout: Duration,
    pub write_max_retries: u32,
    pub write_retry_backoff: Duration,
    pub write_timeout: Duration,
    pub alert_subject: String,
    pub alert_max_retries: u32,
    pub alert_retry_backoff: Duration,
    pub alert_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            concurrency: 8,
            batch_timeout: Duration::from_secs(30),
            write_max_retries: 3,
            write_retry_backoff: Duration::from_millis(200),
            write_timeout: Duration::from_secs(5),
            alert_subject: DEFAULT_ALERT_SUBJECT.to_string(),
            alert_max_retries: 2,
            alert_retry_backoff: Duration::from_millis(200),
            alert_timeout: Duration::from_secs(3),
        }
    }
}

/// Split a batch payload into raw records.
///
/// The payload must be a non-empty JSON array; elements are not inspected.
pub fn parse_batch(payload: &[u8]) -> Result<Vec<RawRecord>, BatchError> {
    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(BatchError::MalformedBatch("empty payload".to_string()));
    }

    let value: Value = serde_json::from_slice(payload)
        .map_err(|e| BatchError::MalformedBatch(format!("invalid JSON: {e}")))?;

    match value {
        Value::Array(records) if !records.is_empty() => Ok(records),
        Value::Array(_) => Err(BatchError::MalformedBatch(
            "batch contains no records".to_string(),
        )),
        other => Err(BatchError::MalformedBatch(format!(
            "expected a JSON array of records, got {}",
            json_type(&other)
        ))),
    }
}

/// Raw `site_id` of a record, used to label failures before normalization.
fn site_hint(raw: &RawRecord) -> Option<String> {
    raw.get(SITE_ID).and_then(Value::as_str).map(str::to_owned)
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Drives batches of raw records through normalize, classify, write and alert.
pub struct BatchOrchestrator {
    stages: Arc<RecordStages>,
    concurrency: usize,
    batch_timeout: Duration,
}

struct RecordStages {
    writer: IdempotentWriter,
    dispatcher: AlertDispatcher,
}

impl BatchOrchestrator {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        notifier: Arc<dyn Notifier>,
        settings: OrchestratorSettings,
    ) -> Self {
        let writer = IdempotentWriter::new(
            store,
            settings.write_max_retries,
            settings.write_retry_backoff,
            settings.write_timeout,
        );
        let dispatcher = AlertDispatcher::new(
            notifier,
            settings.alert_subject,
            settings.alert_max_retries,
            settings.alert_retry_backoff,
            settings.alert_timeout,
        );

        Self {
            stages: Arc::new(RecordStages { writer, dispatcher }),
            concurrency: settings.concurrency.max(1),
            batch_timeout: settings.batch_timeout,
        }
    }

    pub async fn ingest(&self, batch_id: &str, payload: &[u8]) -> Result<BatchOutcome, BatchError> {
        self.ingest_with_cancel(batch_id, payload, CancellationToken::new())
            .await
    }

    /// Ingest one batch, stopping early on `cancel` or the batch timeout.
    ///
    /// When stopping early, records that have not started are skipped and
    /// records already in flight finish in the background, so a committed
    /// write still gets its alert. Both are reported as `Incomplete`.
    pub async fn ingest_with_cancel(
        &self,
        batch_id: &str,
        payload: &[u8],
        cancel: CancellationToken,
    ) -> Result<BatchOutcome, BatchError> {
        let started = Instant::now();

        let records = match parse_batch(payload) {
            Ok(records) => records,
            Err(e) => {
                metrics::counter!("energy_batches_malformed_total").increment(1);
                tracing::warn!(batch_id, error = %e, "rejecting batch");
                return Err(e);
            }
        };
        metrics::counter!("energy_batches_total").increment(1);

        let received = records.len();
        let site_hints: Vec<Option<String>> = records.iter().map(site_hint).collect();
        tracing::info!(batch_id, received, "processing batch");

        let batch_cancel = cancel.child_token();
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::channel::<RecordOutcome>(received);

        for (index, raw) in records.into_iter().enumerate() {
            let stages = Arc::clone(&self.stages);
            let permits = Arc::clone(&permits);
            let batch_cancel = batch_cancel.clone();
            let tx = tx.clone();
            let span = tracing::info_span!("record", batch_id, index);

            tokio::spawn(
                async move {
                    let _permit = tokio::select! {
                        biased;
                        _ = batch_cancel.cancelled() => return,
                        permit = permits.acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => return,
                        },
                    };

                    let outcome = stages.process(index, raw).await;
                    // The receiver is gone once the batch stopped waiting.
                    let _ = tx.send(outcome).await;
                }
                .instrument(span),
            );
        }
        drop(tx);

        let mut acc = BatchAccumulator::new(batch_id, site_hints);
        let deadline = tokio::time::sleep(self.batch_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                next = rx.recv() => match next {
                    Some(outcome) => acc.record(outcome),
                    None => break,
                },
                _ = &mut deadline => {
                    tracing::warn!(
                        batch_id,
                        timeout_ms = self.batch_timeout.as_millis() as u64,
                        "batch timed out; unfinished records reported incomplete"
                    );
                    break;
                }
                _ = batch_cancel.cancelled() => {
                    tracing::warn!(batch_id, "batch cancelled; unfinished records reported incomplete");
                    break;
                }
            }
        }
        batch_cancel.cancel();

        let outcome = acc.finish();
        if outcome.incomplete > 0 {
            metrics::counter!("energy_records_incomplete_total").increment(outcome.incomplete as u64);
        }
        metrics::histogram!("energy_batch_duration_seconds").record(started.elapsed().as_secs_f64());

        tracing::info!(
            batch_id,
            received = outcome.received,
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            incomplete = outcome.incomplete,
            alerts_sent = outcome.alerts_sent,
            retryable = outcome.retryable,
            "batch processed"
        );

        Ok(outcome)
    }
}

impl RecordStages {
    /// Received -> Normalized -> Classified -> Written -> (Alerted | NoAlertNeeded),
    /// or Rejected at the first failing stage.
    async fn process(&self, index: usize, raw: RawRecord) -> RecordOutcome {
        let hint = site_hint(&raw);

        let normalized = match normalize(&raw) {
            Ok(normalized) => normalized,
            Err(rejection) => {
                tracing::warn!(
                    site_id = hint.as_deref().unwrap_or("<unknown>"),
                    reason = %rejection,
                    "record rejected"
                );
                metrics::counter!("energy_records_rejected_total", "reason" => rejection.label())
                    .increment(1);
                return RecordOutcome {
                    index,
                    site_id: hint,
                    result: RecordResult::Rejected {
                        reason: FailureReason::Rejected { rejection },
                    },
                };
            }
        };

        let reading = classify(normalized);

        if let Err(e) = self.writer.write(&reading).await {
            tracing::warn!(
                site_id = %reading.site_id,
                timestamp = %reading.timestamp,
                error = %e,
                "record rejected: write failed"
            );
            metrics::counter!("energy_records_rejected_total", "reason" => "write_failed")
                .increment(1);
            return RecordOutcome {
                index,
                site_id: Some(reading.site_id),
                result: RecordResult::Rejected { reason: e.into() },
            };
        }

        tracing::info!(
            site_id = %reading.site_id,
            timestamp = %reading.timestamp,
            net_energy_kwh = %reading.net_energy_kwh,
            anomaly = reading.anomaly,
            "reading written"
        );
        metrics::counter!("energy_records_accepted_total").increment(1);

        // Only reached after a committed write.
        let alert = if reading.anomaly {
            match self.dispatch_alert(&reading).await {
                Ok(()) => AlertStatus::Sent,
                Err(error) => AlertStatus::Failed {
                    timestamp: reading.timestamp,
                    error,
                },
            }
        } else {
            AlertStatus::NotNeeded
        };

        RecordOutcome {
            index,
            site_id: Some(reading.site_id),
            result: RecordResult::Accepted { alert },
        }
    }

    async fn dispatch_alert(&self, reading: &EnergyReading) -> Result<(), String> {
        self.dispatcher.dispatch(reading).await.map_err(|e| {
            tracing::warn!(
                site_id = %reading.site_id,
                timestamp = %reading.timestamp,
                error = %e,
                "anomaly alert not delivered; reading stays accepted"
            );
            e.to_string()
        })
    }
}
