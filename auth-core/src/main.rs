use auth_core::{
    config::AuthCoreConfig,
    services::{AuditEmitter, JwtService, TracingAuditSink},
    AuthCore,
};
use service_core::config::Config;
use service_core::observability::logging::init_tracing;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    let base = Config::load()?;
    init_tracing(&base.service_name, &base.log_level, base.otlp_endpoint.as_deref());

    // Load configuration - fail fast if invalid
    let config = AuthCoreConfig::from_env()?;

    tracing::info!(
        service = %base.service_name,
        environment = ?config.environment,
        strict_mode = config.authz.strict_mode,
        "Starting auth core"
    );

    let jwt = JwtService::new(&config.jwt)?;
    let (audit, audit_task) = AuditEmitter::spawn(Arc::new(TracingAuditSink));

    let core = AuthCore::new(config.clone(), Arc::new(jwt), audit)?;
    tracing::info!(roles = core.authz.list_roles().len(), "Authorization roles loaded");

    let sweep = core
        .sessions
        .spawn_expiry_sweep(Duration::from_secs(config.session.sweep_interval_seconds));
    tracing::info!(
        interval_seconds = config.session.sweep_interval_seconds,
        "Session expiry sweep started"
    );

    shutdown_signal().await;

    sweep.abort();
    // Cancelled is the expected outcome here.
    let _ = sweep.await;
    // Dropping the last emitter closes the channel and lets the dispatcher drain.
    drop(core);
    if let Err(e) = audit_task.await {
        tracing::warn!(error = %e, "Audit dispatcher ended abnormally");
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
