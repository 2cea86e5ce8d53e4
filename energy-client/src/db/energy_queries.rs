use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{EnergyReading, TimeRange};

/// Fetch a time-ordered series of readings for a single site.
///
/// When `range` is given both bounds are inclusive.
pub async fn readings_for_site(
    pool: &PgPool,
    site_id: &str,
    range: Option<TimeRange>,
) -> Result<Vec<EnergyReading>> {
    let rows = match range {
        Some(range) => {
            sqlx::query_as::<_, EnergyReading>(
                r#"
                SELECT
                    site_id,
                    ts,
                    energy_generated_kwh,
                    energy_consumed_kwh,
                    net_energy_kwh,
                    anomaly
                FROM energy_readings
                WHERE site_id = $1
                  AND ts >= $2
                  AND ts <= $3
                ORDER BY ts
                "#,
            )
            .bind(site_id)
            .bind(range.start)
            .bind(range.end)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, EnergyReading>(
                r#"
                SELECT
                    site_id,
                    ts,
                    energy_generated_kwh,
                    energy_consumed_kwh,
                    net_energy_kwh,
                    anomaly
                FROM energy_readings
                WHERE site_id = $1
                ORDER BY ts
                "#,
            )
            .bind(site_id)
            .fetch_all(pool)
            .await?
        }
    };

    Ok(rows)
}

/// Fetch the readings flagged as anomalous for a site.
pub async fn anomalies_for_site(pool: &PgPool, site_id: &str) -> Result<Vec<EnergyReading>> {
    let rows = sqlx::query_as::<_, EnergyReading>(
        r#"
        SELECT
            site_id,
            ts,
            energy_generated_kwh,
            energy_consumed_kwh,
            net_energy_kwh,
            anomaly
        FROM energy_readings
        WHERE site_id = $1
          AND anomaly = TRUE
        ORDER BY ts
        "#,
    )
    .bind(site_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
