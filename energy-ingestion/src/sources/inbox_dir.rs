use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, SystemTime},
};

use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_stream::wrappers::ReadDirStream;

use crate::pipeline::{
    parse_batch, BatchError, BatchOutcome, Envelope, PipelineError, RawBatch, Source,
};

pub const PROCESSED_DIR: &str = "processed";
pub const REJECTED_DIR: &str = "rejected";

const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy)]
struct RetryState {
    attempts: u32,
    not_before: Instant,
}

type RetryLedger = Arc<Mutex<HashMap<String, RetryState>>>;

/// Polls a drop directory for `*.json` batch files.
///
/// The batch id is the file name. After ingestion a file moves to
/// `processed/`, or to `rejected/` when the batch was malformed. When the
/// outcome is retryable the file is rewritten in place to hold only the
/// records worth running again, and is picked up after a linear backoff.
/// A batch still failing after `max_retries` re-runs moves to `rejected/`.
pub struct InboxDirSource {
    dir: PathBuf,
    poll_interval: Duration,
    max_retries: u32,
    retry_backoff: Duration,
    retries: RetryLedger,
}

impl InboxDirSource {
    pub fn new<P: Into<PathBuf>>(dir: P, poll_interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            poll_interval,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff: poll_interval,
            retries: Arc::default(),
        }
    }

    pub fn with_retry_policy(mut self, max_retries: u32, retry_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = retry_backoff;
        self
    }

    pub async fn ensure_layout(&self) -> Result<(), PipelineError> {
        for sub in [PROCESSED_DIR, REJECTED_DIR] {
            let path = self.dir.join(sub);
            tokio::fs::create_dir_all(&path).await.map_err(|e| {
                PipelineError::Source(format!("failed to create {}: {e}", path.display()))
            })?;
        }
        Ok(())
    }

    /// Rewrite the batch file to the failed records that may succeed on a
    /// re-run and schedule the next attempt. Returns `false` once the retry
    /// budget is spent.
    async fn schedule_retry(
        &self,
        batch: &RawBatch,
        outcome: &BatchOutcome,
    ) -> Result<bool, PipelineError> {
        let attempts = {
            let ledger = self.retries.lock().unwrap_or_else(PoisonError::into_inner);
            ledger.get(&batch.batch_id).map_or(0, |s| s.attempts) + 1
        };

        let (records, payload) = retry_payload(&batch.payload, outcome)?;
        let path = self.dir.join(&batch.batch_id);
        let tmp = self.dir.join(format!("{}.tmp", batch.batch_id));
        tokio::fs::write(&tmp, &payload).await.map_err(|e| {
            PipelineError::Settle(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &path).await.map_err(|e| {
            PipelineError::Settle(format!("failed to replace {}: {e}", path.display()))
        })?;

        if attempts > self.max_retries {
            return Ok(false);
        }

        let delay = self.retry_backoff * attempts;
        self.retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                batch.batch_id.clone(),
                RetryState {
                    attempts,
                    not_before: Instant::now() + delay,
                },
            );

        metrics::counter!("inbox_batch_retries_total").increment(1);
        tracing::info!(
            batch_id = %batch.batch_id,
            attempt = attempts,
            records,
            delay_ms = delay.as_millis() as u64,
            "failed records left in inbox for retry"
        );
        Ok(true)
    }

    fn forget(&self, batch_id: &str) {
        self.retries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(batch_id);
    }

    async fn move_to(&self, batch: &RawBatch, target: &str) -> Result<(), PipelineError> {
        let from = self.dir.join(&batch.batch_id);
        let to = self.dir.join(target).join(&batch.batch_id);
        tokio::fs::rename(&from, &to).await.map_err(|e| {
            PipelineError::Settle(format!(
                "failed to move {} to {}: {e}",
                from.display(),
                to.display()
            ))
        })?;

        tracing::debug!(batch_id = %batch.batch_id, destination = target, "batch file settled");
        Ok(())
    }
}

/// The records of `payload` whose failure in `outcome` is retryable, as a new
/// batch payload together with their count.
fn retry_payload(payload: &[u8], outcome: &BatchOutcome) -> Result<(usize, Vec<u8>), PipelineError> {
    let mut records = parse_batch(payload)
        .map_err(|e| PipelineError::Settle(format!("cannot split batch for retry: {e}")))?;

    let keep: Vec<_> = outcome
        .failures
        .iter()
        .filter(|f| f.reason.is_retryable())
        .filter_map(|f| records.get_mut(f.index).map(std::mem::take))
        .collect();

    let bytes = serde_json::to_vec(&keep)
        .map_err(|e| PipelineError::Settle(format!("failed to encode retry batch: {e}")))?;
    Ok((keep.len(), bytes))
}

fn is_due(ledger: &RetryLedger, batch_id: &str) -> bool {
    ledger
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(batch_id)
        .map_or(true, |s| Instant::now() >= s.not_before)
}

async fn pending_batches(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| PipelineError::Source(format!("failed to list {}: {e}", dir.display())))?;

    let mut entries = ReadDirStream::new(entries);
    let mut paths = Vec::new();
    while let Some(entry) = entries.next().await {
        let entry = entry
            .map_err(|e| PipelineError::Source(format!("failed to read inbox entry: {e}")))?;
        let path = entry.path();
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        if is_file && path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }

    // Generated file names embed their creation time.
    paths.sort();
    Ok(paths)
}

fn batch_id_for_path(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[async_trait::async_trait]
impl Source for InboxDirSource {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<RawBatch>, PipelineError>> + Send>> {
        let dir = self.dir.clone();
        let poll_interval = self.poll_interval;
        let retries = Arc::clone(&self.retries);

        let s = async_stream::stream! {
            loop {
                match pending_batches(&dir).await {
                    Ok(paths) => {
                        for path in paths {
                            let batch_id = batch_id_for_path(&path);
                            if !is_due(&retries, &batch_id) {
                                continue;
                            }
                            match tokio::fs::read(&path).await {
                                Ok(payload) => yield Ok(Envelope {
                                    payload: RawBatch { batch_id, payload },
                                    received_at: SystemTime::now(),
                                }),
                                Err(e) => {
                                    metrics::counter!("inbox_read_errors_total").increment(1);
                                    yield Err(PipelineError::Source(format!(
                                        "failed to read {}: {e}",
                                        path.display()
                                    )));
                                }
                            }
                        }
                    }
                    Err(e) => yield Err(e),
                }

                tokio::time::sleep(poll_interval).await;
            }
        };

        Box::pin(s)
    }

    async fn settle(
        &self,
        batch: &RawBatch,
        result: &Result<BatchOutcome, BatchError>,
    ) -> Result<(), PipelineError> {
        match result {
            Ok(outcome) if outcome.retryable => {
                if self.schedule_retry(batch, outcome).await? {
                    return Ok(());
                }
                metrics::counter!("inbox_batches_exhausted_total").increment(1);
                tracing::error!(
                    batch_id = %batch.batch_id,
                    max_retries = self.max_retries,
                    "batch still failing after retries, moving to rejected"
                );
                self.forget(&batch.batch_id);
                self.move_to(batch, REJECTED_DIR).await
            }
            Ok(_) => {
                self.forget(&batch.batch_id);
                self.move_to(batch, PROCESSED_DIR).await
            }
            Err(_) => {
                self.forget(&batch.batch_id);
                self.move_to(batch, REJECTED_DIR).await
            }
        }
    }
}
