#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use energy_client::domain::{EnergyReading, TimeRange};
use energy_ingestion::{
    alerts::{Notifier, NotifyError},
    pipeline::{BatchOrchestrator, OrchestratorSettings},
    sinks::{InMemoryReadingStore, ReadingStore, StoreError},
};
use serde_json::{json, Value};

/// Notifier that records every publish, optionally failing all of them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub published: Mutex<Vec<(String, String)>>,
    pub fail_with: Option<NotifyError>,
    /// When set, each publish records whether the store already held an
    /// anomaly for the message's site.
    pub observe: Option<Arc<InMemoryReadingStore>>,
    pub seen_in_store: Mutex<Vec<bool>>,
}

impl RecordingNotifier {
    pub fn failing(error: NotifyError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    pub fn observing(store: Arc<InMemoryReadingStore>) -> Self {
        Self {
            observe: Some(store),
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, subject: &str, message: &str) -> Result<(), NotifyError> {
        if let Some(store) = &self.observe {
            let stored = store
                .snapshot()
                .iter()
                .any(|r| r.anomaly && message.contains(&r.site_id));
            self.seen_in_store.lock().unwrap().push(stored);
        }
        self.published
            .lock()
            .unwrap()
            .push((subject.to_string(), message.to_string()));
        match &self.fail_with {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// Store whose writes always fail with the given error.
pub struct FailingStore(pub StoreError);

#[async_trait::async_trait]
impl ReadingStore for FailingStore {
    async fn put(&self, _reading: &EnergyReading) -> Result<(), StoreError> {
        Err(self.0.clone())
    }

    async fn query(&self, _: &str, _: Option<TimeRange>) -> Result<Vec<EnergyReading>, StoreError> {
        Err(self.0.clone())
    }

    async fn anomalies(&self, _: &str) -> Result<Vec<EnergyReading>, StoreError> {
        Err(self.0.clone())
    }
}

/// Store whose writes never complete.
pub struct StalledStore;

#[async_trait::async_trait]
impl ReadingStore for StalledStore {
    async fn put(&self, _reading: &EnergyReading) -> Result<(), StoreError> {
        futures::future::pending().await
    }

    async fn query(&self, _: &str, _: Option<TimeRange>) -> Result<Vec<EnergyReading>, StoreError> {
        Ok(Vec::new())
    }

    async fn anomalies(&self, _: &str) -> Result<Vec<EnergyReading>, StoreError> {
        Ok(Vec::new())
    }
}

/// In-memory store that fails writes for one site with a transient error,
/// `failures` times (`u32::MAX` for always).
pub struct SiteOutageStore {
    pub inner: InMemoryReadingStore,
    site_id: String,
    failures: AtomicU32,
}

impl SiteOutageStore {
    pub fn new(site_id: &str, failures: u32) -> Self {
        Self {
            inner: InMemoryReadingStore::new(),
            site_id: site_id.to_string(),
            failures: AtomicU32::new(failures),
        }
    }

    fn should_fail(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

#[async_trait::async_trait]
impl ReadingStore for SiteOutageStore {
    async fn put(&self, reading: &EnergyReading) -> Result<(), StoreError> {
        if reading.site_id == self.site_id && self.should_fail() {
            return Err(StoreError::Transient("site partition unavailable".into()));
        }
        self.inner.put(reading).await
    }

    async fn query(&self, site_id: &str, range: Option<TimeRange>) -> Result<Vec<EnergyReading>, StoreError> {
        self.inner.query(site_id, range).await
    }

    async fn anomalies(&self, site_id: &str) -> Result<Vec<EnergyReading>, StoreError> {
        self.inner.anomalies(site_id).await
    }
}

/// Short backoffs so retry paths finish quickly.
pub fn fast_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        concurrency: 4,
        batch_timeout: Duration::from_secs(5),
        write_max_retries: 2,
        write_retry_backoff: Duration::from_millis(1),
        write_timeout: Duration::from_secs(1),
        alert_max_retries: 1,
        alert_retry_backoff: Duration::from_millis(1),
        alert_timeout: Duration::from_secs(1),
        ..OrchestratorSettings::default()
    }
}

pub fn orchestrator(
    store: Arc<dyn ReadingStore>,
    notifier: Arc<dyn Notifier>,
) -> BatchOrchestrator {
    BatchOrchestrator::new(store, notifier, fast_settings())
}

pub fn record(site_id: &str, minute: u32, generated: f64, consumed: f64) -> Value {
    json!({
        "site_id": site_id,
        "timestamp": format!("2025-06-06T12:{minute:02}:00Z"),
        "energy_generated_kwh": generated,
        "energy_consumed_kwh": consumed,
    })
}

pub fn payload(records: &[Value]) -> Vec<u8> {
    serde_json::to_vec(records).unwrap()
}
