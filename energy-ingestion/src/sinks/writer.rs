use std::{sync::Arc, time::Duration};

use energy_client::domain::EnergyReading;
use serde::Serialize;

use super::{ReadingStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteErrorKind {
    Transient,
    Permanent,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} write failure after {attempts} attempt(s): {message}")]
pub struct WriteError {
    pub kind: WriteErrorKind,
    pub attempts: u32,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReceipt {
    pub attempts: u32,
}

/// Upserts readings with bounded retries on transient store failures.
///
/// Every attempt writes the full reading under the same key, so retrying an
/// attempt whose outcome is unknown converges on the same stored state.
pub struct IdempotentWriter {
    store: Arc<dyn ReadingStore>,
    max_retries: u32,
    retry_backoff: Duration,
    write_timeout: Duration,
}

impl IdempotentWriter {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        max_retries: u32,
        retry_backoff: Duration,
        write_timeout: Duration,
    ) -> Self {
        Self {
            store,
            max_retries,
            retry_backoff,
            write_timeout,
        }
    }

    pub async fn write(&self, reading: &EnergyReading) -> Result<WriteReceipt, WriteError> {
        let mut attempt: u32 = 0;
        loop {
            let res = match tokio::time::timeout(self.write_timeout, self.store.put(reading)).await {
                Ok(res) => res,
                Err(_) => Err(StoreError::Transient(format!(
                    "write timed out after {}ms",
                    self.write_timeout.as_millis()
                ))),
            };

            match res {
                Ok(()) => {
                    metrics::counter!("energy_store_writes_total").increment(1);
                    return Ok(WriteReceipt {
                        attempts: attempt + 1,
                    });
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(
                        error = %e,
                        attempt,
                        site_id = %reading.site_id,
                        "store write failed, retrying with backoff"
                    );
                    metrics::counter!("energy_store_write_retries_total").increment(1);
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        attempts = attempt + 1,
                        site_id = %reading.site_id,
                        "store write failed, giving up"
                    );
                    metrics::counter!("energy_store_write_failures_total").increment(1);
                    let kind = if e.is_transient() {
                        WriteErrorKind::Transient
                    } else {
                        WriteErrorKind::Permanent
                    };
                    return Err(WriteError {
                        kind,
                        attempts: attempt + 1,
                        message: e.message().to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::InMemoryReadingStore;
    use energy_client::domain::TimeRange;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};
    use time::macros::datetime;

    /// Fails the first `failures` puts with the given error, then delegates.
    struct FlakyStore {
        inner: InMemoryReadingStore,
        failures: u32,
        error: StoreError,
        calls: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32, error: StoreError) -> Self {
            Self {
                inner: InMemoryReadingStore::new(),
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl ReadingStore for FlakyStore {
        async fn put(&self, reading: &EnergyReading) -> Result<(), StoreError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(self.error.clone());
            }
            self.inner.put(reading).await
        }

        async fn query(
            &self,
            site_id: &str,
            range: Option<TimeRange>,
        ) -> Result<Vec<EnergyReading>, StoreError> {
            self.inner.query(site_id, range).await
        }

        async fn anomalies(&self, site_id: &str) -> Result<Vec<EnergyReading>, StoreError> {
            self.inner.anomalies(site_id).await
        }
    }

    /// Never answers.
    struct HangingStore;

    #[async_trait::async_trait]
    impl ReadingStore for HangingStore {
        async fn put(&self, _reading: &EnergyReading) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn query(&self, _: &str, _: Option<TimeRange>) -> Result<Vec<EnergyReading>, StoreError> {
            Ok(Vec::new())
        }

        async fn anomalies(&self, _: &str) -> Result<Vec<EnergyReading>, StoreError> {
            Ok(Vec::new())
        }
    }

    fn reading() -> EnergyReading {
        EnergyReading {
            site_id: "HydroStation_OR_003".to_string(),
            timestamp: datetime!(2025-06-06 12:00:00 UTC),
            energy_generated_kwh: dec!(10),
            energy_consumed_kwh: dec!(4),
            net_energy_kwh: dec!(6),
            anomaly: false,
        }
    }

    fn writer(store: Arc<dyn ReadingStore>, max_retries: u32) -> IdempotentWriter {
        IdempotentWriter::new(
            store,
            max_retries,
            Duration::from_millis(1),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let store = Arc::new(FlakyStore::new(2, StoreError::Transient("throttled".into())));
        let receipt = writer(store.clone(), 3).write(&reading()).await.unwrap();

        assert_eq!(receipt.attempts, 3);
        assert_eq!(store.inner.len(), 1);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let store = Arc::new(FlakyStore::new(1, StoreError::Permanent("bad key".into())));
        let err = writer(store.clone(), 3).write(&reading()).await.unwrap_err();

        assert_eq!(err.kind, WriteErrorKind::Permanent);
        assert_eq!(err.attempts, 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let store = Arc::new(FlakyStore::new(u32::MAX, StoreError::Transient("down".into())));
        let err = writer(store.clone(), 2).write(&reading()).await.unwrap_err();

        assert_eq!(err.kind, WriteErrorKind::Transient);
        assert_eq!(err.attempts, 3);
        assert_eq!(store.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn timeouts_count_as_transient() {
        let err = IdempotentWriter::new(
            Arc::new(HangingStore),
            1,
            Duration::from_millis(1),
            Duration::from_millis(10),
        )
        .write(&reading())
        .await
        .unwrap_err();

        assert_eq!(err.kind, WriteErrorKind::Transient);
        assert_eq!(err.attempts, 2);
        assert!(err.message.contains("timed out"));
    }

    #[tokio::test]
    async fn retried_write_leaves_same_state_as_single_write() {
        let flaky = Arc::new(FlakyStore::new(1, StoreError::Transient("timeout".into())));
        writer(flaky.clone(), 3).write(&reading()).await.unwrap();

        let clean = Arc::new(InMemoryReadingStore::new());
        writer(clean.clone(), 3).write(&reading()).await.unwrap();

        assert_eq!(flaky.inner.snapshot(), clean.snapshot());
    }
}
