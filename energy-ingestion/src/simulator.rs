//! Synthetic producer: random readings for a fixed set of sites, written as
//! batch files into the inbox directory.

use std::path::{Path, PathBuf};

use rand::{seq::SliceRandom, Rng};
use serde_json::{json, Value};
use time::{macros::format_description, OffsetDateTime};

use crate::config::SimulatorConfig;

/// Two-decimal value drawn uniformly from `[low, high]` kWh.
fn kwh<R: Rng>(rng: &mut R, low: i64, high: i64) -> f64 {
    rng.gen_range(low * 100..=high * 100) as f64 / 100.0
}

pub fn generate_record<R: Rng>(rng: &mut R, sites: &[String], now: OffsetDateTime) -> Option<Value> {
    let site_id = sites.choose(rng)?;
    let timestamp = energy_client::domain::format_timestamp(now).ok()?;

    Some(json!({
        "site_id": site_id,
        "timestamp": timestamp,
        "energy_generated_kwh": kwh(rng, -10, 150),
        "energy_consumed_kwh": kwh(rng, -10, 120),
    }))
}

/// One batch of readings; each record is stamped one microsecond after the
/// previous so no two records share a `(site_id, timestamp)` key.
pub fn generate_batch<R: Rng>(
    rng: &mut R,
    cfg: &SimulatorConfig,
    now: OffsetDateTime,
) -> anyhow::Result<Vec<Value>> {
    if cfg.sites.is_empty() {
        anyhow::bail!("simulator.sites must not be empty");
    }
    (0..cfg.records_per_batch)
        .map(|i| {
            let stamp = now + time::Duration::microseconds(i as i64);
            generate_record(rng, &cfg.sites, stamp)
                .ok_or_else(|| anyhow::anyhow!("failed to generate record"))
        })
        .collect()
}

pub fn batch_file_name(now: OffsetDateTime) -> anyhow::Result<String> {
    let stamp = now.format(format_description!(
        "[year][month][day]_[hour][minute][second]_[subsecond digits:3]"
    ))?;
    Ok(format!("energy_data_{stamp}.json"))
}

/// Write one batch into `dir`; the file only appears under its final name
/// once fully written.
pub async fn write_batch(dir: &Path, records: &[Value], now: OffsetDateTime) -> anyhow::Result<PathBuf> {
    let name = batch_file_name(now)?;
    let path = dir.join(&name);
    let tmp = dir.join(format!("{name}.tmp"));

    tokio::fs::write(&tmp, serde_json::to_vec(records)?).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}
