//! Destinations for audit events.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::event::AuditEvent;
use crate::errors::Result;
use crate::observability::AUDIT_TARGET;
use crate::storage::{AuditLogRepository, ChainVerification, DbPool};

/// A destination for audit events. Events arrive with the owner already
/// pseudonymized.
#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    async fn record(&self, event: &AuditEvent) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Writes each event as a structured `tracing` record on the audit target
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        tracing::info!(
            target: AUDIT_TARGET,
            owner = event.owner.as_deref().unwrap_or("-"),
            operation = event.operation,
            outcome = %event.outcome,
            tier = event.tier.map(|t| t.as_str()),
            reason = event.reason.map(|r| r.as_str()),
            actor = event.actor.map(|a| a.as_str()),
            fingerprint = event.fingerprint_prefix.as_deref(),
            "audit"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}

/// Appends events to the hash-chained `audit_log` table
#[derive(Debug, Clone)]
pub struct DatabaseAuditSink {
    repository: AuditLogRepository,
}

impl DatabaseAuditSink {
    pub fn new(pool: DbPool) -> Self {
        Self { repository: AuditLogRepository::new(pool) }
    }

    pub async fn verify_chain(&self) -> Result<ChainVerification> {
        self.repository.verify_chain().await
    }
}

#[async_trait]
impl AuditSink for DatabaseAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        self.repository.append(event).await.map(|_| ())
    }

    fn name(&self) -> &'static str {
        "database"
    }
}

/// Keeps events in memory. Used by tests and by embedders that forward
/// events themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events in arrival order
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
