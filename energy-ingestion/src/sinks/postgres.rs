use energy_client::{
    db,
    domain::{EnergyReading, TimeRange},
};
use sqlx::postgres::{PgPool, PgPoolOptions};

use super::{ReadingStore, StoreError};

/// `energy_readings` table over a Postgres-wire connection pool.
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(uri: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(uri)
            .await
            .map_err(|e| classify_sqlx_error(&e))?;
        Ok(Self::new(pool))
    }
}

#[async_trait::async_trait]
impl ReadingStore for PgReadingStore {
    async fn put(&self, reading: &EnergyReading) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO energy_readings
                (site_id, ts, energy_generated_kwh, energy_consumed_kwh, net_energy_kwh, anomaly)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (site_id, ts) DO UPDATE SET
                energy_generated_kwh = EXCLUDED.energy_generated_kwh,
                energy_consumed_kwh  = EXCLUDED.energy_consumed_kwh,
                net_energy_kwh       = EXCLUDED.net_energy_kwh,
                anomaly              = EXCLUDED.anomaly
            "#,
        )
        .bind(&reading.site_id)
        .bind(reading.timestamp)
        .bind(reading.energy_generated_kwh)
        .bind(reading.energy_consumed_kwh)
        .bind(reading.net_energy_kwh)
        .bind(reading.anomaly)
        .execute(&self.pool)
        .await
        .map(|_| ())
        .map_err(|e| classify_sqlx_error(&e))
    }

    async fn query(
        &self,
        site_id: &str,
        range: Option<TimeRange>,
    ) -> Result<Vec<EnergyReading>, StoreError> {
        db::readings_for_site(&self.pool, site_id, range)
            .await
            .map_err(|e| classify_anyhow(&e))
    }

    async fn anomalies(&self, site_id: &str) -> Result<Vec<EnergyReading>, StoreError> {
        db::anomalies_for_site(&self.pool, site_id)
            .await
            .map_err(|e| classify_anyhow(&e))
    }
}

fn classify_anyhow(e: &anyhow::Error) -> StoreError {
    match e.downcast_ref::<sqlx::Error>() {
        Some(sqlx_err) => classify_sqlx_error(sqlx_err),
        None => StoreError::Permanent(e.to_string()),
    }
}

pub(crate) fn classify_sqlx_error(e: &sqlx::Error) -> StoreError {
    let transient = match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .map(|code| is_transient_sqlstate(&code))
            .unwrap_or(false),
        _ => false,
    };

    if transient {
        StoreError::Transient(e.to_string())
    } else {
        StoreError::Permanent(e.to_string())
    }
}

/// SQLSTATE classes worth retrying: connection exceptions (08), transaction
/// rollbacks such as serialization failures and deadlocks (40), insufficient
/// resources (53) and operator intervention (57).
fn is_transient_sqlstate(code: &str) -> bool {
    matches!(code.get(..2), Some("08" | "40" | "53" | "57"))
}
