use std::{net::SocketAddr, time::Duration};

use anyhow::Result;
use energy_ingestion::{
    bootstrap,
    config::AppConfig,
    metrics_server,
    observability,
    pipeline::Pipeline,
    query_api,
    sources::{http_batch, InboxDirSource},
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let (orchestrator, store) = bootstrap::build_orchestrator(&cfg).await?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                return;
            }
            tracing::info!("shutdown requested");
            shutdown.cancel();
        });
    }

    // HTTP ingestion and read API
    let app = http_batch::routes(orchestrator.clone(), cfg.http.max_body_bytes)
        .merge(query_api::routes(store));
    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP listener started");

    let server = {
        let shutdown = shutdown.clone();
        async move {
            axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .map_err(anyhow::Error::from)
        }
    };

    // Inbox directory pipeline
    let inbox = {
        let shutdown = shutdown.clone();
        let inbox_cfg = cfg.inbox.clone();
        async move {
            let Some(inbox_cfg) = inbox_cfg else {
                return Ok(());
            };
            let source = InboxDirSource::new(
                inbox_cfg.dir.clone(),
                Duration::from_millis(inbox_cfg.poll_interval_ms),
            )
            .with_retry_policy(
                inbox_cfg.max_retries,
                Duration::from_millis(inbox_cfg.retry_backoff_ms),
            );
            source.ensure_layout().await?;
            tracing::info!(dir = %inbox_cfg.dir.display(), "watching inbox for batch files");

            Pipeline {
                source,
                orchestrator,
            }
            .run(shutdown)
            .await
            .map_err(anyhow::Error::from)
        }
    };

    tokio::try_join!(server, inbox)?;

    Ok(())
}
