use anyhow::{Context, Result};
use energy_ingestion::{config::AppConfig, observability, simulator};
use std::{env, time::Duration};
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let once = env::args().skip(1).any(|a| a == "--once");
    let cfg = AppConfig::load()?;
    let inbox = cfg
        .inbox
        .as_ref()
        .context("simulate_feed writes into the inbox; configure an [inbox] section")?;
    let sim = &cfg.simulator;

    tokio::fs::create_dir_all(&inbox.dir).await?;
    let mut rng = rand::thread_rng();

    loop {
        let now = OffsetDateTime::now_utc();
        let records = simulator::generate_batch(&mut rng, sim, now)?;
        let path = simulator::write_batch(&inbox.dir, &records, now).await?;
        tracing::info!(path = %path.display(), records = records.len(), "batch written");

        if once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(sim.interval_secs)) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
