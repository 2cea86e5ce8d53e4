mod memory;
mod postgres;
mod writer;

use energy_client::domain::{EnergyReading, TimeRange};

pub use memory::InMemoryReadingStore;
pub use postgres::PgReadingStore;
pub use writer::{IdempotentWriter, WriteError, WriteErrorKind, WriteReceipt};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Throttling, timeouts, dropped connections: safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),
    #[error("permanent store error: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Transient(m) | Self::Permanent(m) => m,
        }
    }
}

/// Durable keyed store for classified readings.
///
/// `put` is an upsert on `(site_id, timestamp)`: a second put with the same
/// key replaces the stored value entirely.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn put(&self, reading: &EnergyReading) -> Result<(), StoreError>;

    async fn query(
        &self,
        site_id: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<EnergyReading>, StoreError>;

    async fn anomalies(&self, site_id: &str) -> Result<Vec<EnergyReading>, StoreError>;
}
