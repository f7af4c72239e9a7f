use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use conduit_entity::InMemoryEntityRegistry;
use conduit_instance_runtime::{
    AuditBackend, ControlPlaneConfig, DelayedRetryQueue, InMemoryExecutionEngine,
    LifecycleDispatcher, RetryEscalationTrigger, TemplateLogResolver,
};
use conduit_server::{build_router, ControlPlaneState};
use tracing_subscriber::EnvFilter;

fn load_registry() -> Result<InMemoryEntityRegistry> {
    match std::env::var("CONDUIT_ENTITIES_FILE") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("read CONDUIT_ENTITIES_FILE='{}'", path))?;
            let registry = InMemoryEntityRegistry::from_json(&raw)
                .with_context(|| format!("load entities from '{}'", path))?;
            tracing::info!("loaded {} entities from {}", registry.len(), path);
            Ok(registry)
        }
        Err(_) => Ok(InMemoryEntityRegistry::new()),
    }
}

fn load_engine() -> Result<InMemoryExecutionEngine> {
    match std::env::var("CONDUIT_INSTANCES_FILE") {
        Ok(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("read CONDUIT_INSTANCES_FILE='{}'", path))?;
            InMemoryExecutionEngine::from_json(&raw)
                .with_context(|| format!("load instances from '{}'", path))
        }
        Err(_) => Ok(InMemoryExecutionEngine::new()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,conduit_server=info,conduit_instance_runtime=info")
        }))
        .init();

    let config = ControlPlaneConfig::from_env().map_err(anyhow::Error::msg)?;
    let addr = std::env::var("CONDUIT_SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());
    let tick_secs = match std::env::var("CONDUIT_RETRY_TICK_SECS") {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("invalid CONDUIT_RETRY_TICK_SECS='{}'", raw))?,
        Err(_) => 30,
    };

    let registry = Arc::new(load_registry()?);
    let engine = Arc::new(load_engine()?);
    let audit = config.build_audit_sink().map_err(anyhow::Error::msg)?;
    let queue = Arc::new(DelayedRetryQueue::new(config.retry));

    let dispatcher = LifecycleDispatcher::new(
        engine.clone(),
        registry,
        Arc::new(TemplateLogResolver::new(config.log_base_url.clone())),
        audit,
        config.colos.clone(),
    );
    let trigger = RetryEscalationTrigger::new(engine, queue.clone());

    let retry_queue = queue.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs.max(1)));
        loop {
            interval.tick().await;
            match retry_queue.tick(Utc::now()) {
                Ok(result) if result.rerun > 0 || result.failed > 0 => tracing::info!(
                    "retry tick rerun={} failed={} pending={}",
                    result.rerun,
                    result.failed,
                    retry_queue.pending()
                ),
                Ok(_) => {}
                Err(err) => tracing::warn!("retry tick failed: {}", err),
            }
        }
    });

    let app = build_router(ControlPlaneState::new(Arc::new(dispatcher), Arc::new(trigger)));
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("conduit control plane listening on http://{}", addr);
    tracing::info!(
        "colos={} audit_backend={} retry_attempts={}",
        config.colos.join(","),
        match config.audit_backend {
            AuditBackend::Log => "log",
            AuditBackend::Memory => "memory",
            AuditBackend::Sqlite => "sqlite",
        },
        config.retry.attempts
    );
    axum::serve(listener, app).await?;
    Ok(())
}
