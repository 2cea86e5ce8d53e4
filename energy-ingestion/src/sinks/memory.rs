use std::{
    collections::BTreeMap,
    sync::{PoisonError, RwLock},
};

use energy_client::domain::{EnergyReading, ReadingKey, TimeRange};

use super::{ReadingStore, StoreError};

/// Ordered in-process store with the same upsert semantics as the SQL table.
#[derive(Default)]
pub struct InMemoryReadingStore {
    rows: RwLock<BTreeMap<ReadingKey, EnergyReading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ReadingKey) -> Option<EnergyReading> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every stored reading, ordered by key.
    pub fn snapshot(&self) -> Vec<EnergyReading> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn select<F>(&self, site_id: &str, keep: F) -> Vec<EnergyReading>
    where
        F: Fn(&EnergyReading) -> bool,
    {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|r| r.site_id == site_id && keep(r))
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn put(&self, reading: &EnergyReading) -> Result<(), StoreError> {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(reading.key(), reading.clone());
        Ok(())
    }

    async fn query(
        &self,
        site_id: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<EnergyReading>, StoreError> {
        Ok(self.select(site_id, |r| {
            range.map_or(true, |range| range.contains(r.timestamp))
        }))
    }

    async fn anomalies(&self, site_id: &str) -> Result<Vec<EnergyReading>, StoreError> {
        Ok(self.select(site_id, |r| r.anomaly))
    }
}
