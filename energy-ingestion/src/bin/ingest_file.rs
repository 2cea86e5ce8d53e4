use anyhow::{bail, Context, Result};
use energy_ingestion::{bootstrap, config::AppConfig, observability};
use std::{env, path::Path};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let paths: Vec<String> = env::args().skip(1).collect();
    if paths.is_empty() {
        bail!("usage: ingest_file <batch.json> [<batch.json> ...]");
    }

    // Load configuration (point ENERGY_INGEST_CONFIG at a postgres store to persist).
    let cfg = AppConfig::load()?;
    let (orchestrator, _store) = bootstrap::build_orchestrator(&cfg).await?;

    let mut malformed = 0usize;
    for path in &paths {
        let payload = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {path}"))?;
        let batch_id = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.clone());

        match orchestrator.ingest(&batch_id, &payload).await {
            Ok(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
            Err(e) => {
                tracing::error!(batch_id, error = %e, "batch not ingested");
                malformed += 1;
            }
        }
    }

    if malformed > 0 {
        bail!("{malformed} of {} batch file(s) were malformed", paths.len());
    }

    Ok(())
}
