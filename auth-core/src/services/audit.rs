//! Audit emission for session, MFA and authorization events.
//!
//! Services push events into an [`AuditEmitter`], an unbounded channel that
//! never blocks the caller. A dispatcher task drains the channel into the
//! configured [`AuditSink`]; sink failures are logged and dropped so they can
//! never change or delay a decision.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::AuditEvent;

/// External consumer of audit events.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, event: AuditEvent) -> Result<(), anyhow::Error>;
}

/// Sink that writes each event as a structured tracing record.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn log(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        let details = event
            .details
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        match event.severity {
            crate::models::Severity::Info => tracing::info!(
                target: "audit",
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                user_id = %event.actor.user_id,
                session_id = ?event.actor.session_id,
                resource = %event.resource.resource_type,
                action = %event.action,
                outcome = ?event.outcome,
                details = %details,
                "Audit event"
            ),
            _ => tracing::warn!(
                target: "audit",
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                severity = ?event.severity,
                user_id = %event.actor.user_id,
                session_id = ?event.actor.session_id,
                ip_address = ?event.actor.ip_address,
                resource = %event.resource.resource_type,
                action = %event.action,
                outcome = ?event.outcome,
                risk_indicators = ?event.risk_indicators,
                details = %details,
                "Security event"
            ),
        }
        Ok(())
    }
}

/// Sink that keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Result<Vec<AuditEvent>, anyhow::Error> {
        Ok(self
            .events
            .lock()
            .map_err(|e| anyhow::anyhow!("Audit sink mutex poisoned: {}", e))?
            .clone())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log(&self, event: AuditEvent) -> Result<(), anyhow::Error> {
        self.events
            .lock()
            .map_err(|e| anyhow::anyhow!("Audit sink mutex poisoned: {}", e))?
            .push(event);
        Ok(())
    }
}

/// Cheap, cloneable handle the services emit into.
#[derive(Debug, Clone)]
pub struct AuditEmitter {
    tx: Option<mpsc::UnboundedSender<AuditEvent>>,
}

impl AuditEmitter {
    /// Emitter plus the receiving end, for callers that drain events themselves.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AuditEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// Emitter backed by a dispatcher task forwarding to `sink`. Must be called
    /// inside a Tokio runtime.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (emitter, rx) = Self::channel();
        let handle = tokio::spawn(dispatch(rx, sink));
        (emitter, handle)
    }

    /// Emitter that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: AuditEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if let Err(e) = tx.send(event) {
            tracing::warn!(
                event_type = e.0.event_type.as_str(),
                "Audit channel closed, dropping event"
            );
        }
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<AuditEvent>, sink: Arc<dyn AuditSink>) {
    while let Some(event) = rx.recv().await {
        let event_id = event.event_id;
        let event_type = event.event_type;
        if let Err(e) = sink.log(event).await {
            tracing::error!(
                error = %e,
                %event_id,
                event_type = event_type.as_str(),
                "Failed to write audit event"
            );
        }
    }
    tracing::debug!("Audit dispatcher stopped");
}
