mod orchestrator;
mod outcome;

use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

pub use orchestrator::{parse_batch, BatchError, BatchOrchestrator, OrchestratorSettings};
pub use outcome::{AlertFailure, BatchOutcome, FailureReason, RecordFailure};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

/// One batch as delivered by a source, before any parsing.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub batch_id: String,
    pub payload: Vec<u8>,
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("settle error: {0}")]
    Settle(String),
}

#[async_trait::async_trait]
pub trait Source: Send + Sync {
    async fn stream(
        &self,
    ) -> Pin<Box<dyn Stream<Item = Result<Envelope<RawBatch>, PipelineError>> + Send>>;

    /// Called once per batch after ingestion with its result.
    async fn settle(
        &self,
        _batch: &RawBatch,
        _result: &Result<BatchOutcome, BatchError>,
    ) -> Result<(), PipelineError> {
        Ok(())
    }
}

pub struct Pipeline<S> {
    pub source: S,
    pub orchestrator: Arc<BatchOrchestrator>,
}

impl<S> Pipeline<S>
where
    S: Source + 'static,
{
    /// Ingest batches from the source until it ends or `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), PipelineError> {
        let mut stream = self.source.stream().await;

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                item = stream.next() => item,
            };
            let Some(item) = item else { break };

            let env = match item {
                Ok(env) => env,
                Err(e) => {
                    tracing::error!(error = %e, "error in batch source");
                    continue;
                }
            };

            if let Ok(waited) = SystemTime::now().duration_since(env.received_at) {
                metrics::histogram!("energy_batch_queue_seconds").record(waited.as_secs_f64());
            }

            let batch = env.payload;
            let result = self
                .orchestrator
                .ingest_with_cancel(&batch.batch_id, &batch.payload, cancel.child_token())
                .await;

            self.source.settle(&batch, &result).await?;
        }

        tracing::info!("batch pipeline stopped");
        Ok(())
    }
}
