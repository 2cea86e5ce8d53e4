use std::{sync::Arc, time::Duration};

use crate::{
    alerts::{LogNotifier, Notifier, WebhookNotifier},
    config::{AppConfig, NotifierKind, StoreKind},
    pipeline::BatchOrchestrator,
    sinks::{InMemoryReadingStore, PgReadingStore, ReadingStore},
};

pub async fn build_store(cfg: &AppConfig) -> anyhow::Result<Arc<dyn ReadingStore>> {
    match cfg.store.kind {
        StoreKind::Memory => {
            tracing::warn!("using in-memory store; readings are lost on restart");
            Ok(Arc::new(InMemoryReadingStore::new()))
        }
        StoreKind::Postgres => {
            let uri = cfg
                .store
                .uri
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("store.uri is required for the postgres store"))?;
            let store = PgReadingStore::connect(uri, cfg.store.max_connections).await?;
            Ok(Arc::new(store))
        }
    }
}

pub fn build_notifier(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Notifier>> {
    match cfg.alerts.kind {
        NotifierKind::Log => Ok(Arc::new(LogNotifier)),
        NotifierKind::Webhook => {
            let url = cfg
                .alerts
                .webhook_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("alerts.webhook_url is required for webhook alerts"))?;
            let notifier = WebhookNotifier::new(url, Duration::from_millis(cfg.alerts.timeout_ms))?;
            Ok(Arc::new(notifier))
        }
    }
}

/// Store, notifier and orchestrator wired from configuration.
pub async fn build_orchestrator(
    cfg: &AppConfig,
) -> anyhow::Result<(Arc<BatchOrchestrator>, Arc<dyn ReadingStore>)> {
    let store = build_store(cfg).await?;
    let notifier = build_notifier(cfg)?;
    let orchestrator = BatchOrchestrator::new(store.clone(), notifier, cfg.orchestrator_settings());
    Ok((Arc::new(orchestrator), store))
}
