use std::sync::Arc;

use super::event::AuditEvent;
use super::pseudonym::OwnerPseudonymizer;
use super::sink::{AuditSink, DatabaseAuditSink, TracingAuditSink};
use crate::config::AuditConfig;
use crate::domain::OwnerId;
use crate::errors::Result;
use crate::storage::DbPool;

/// Fans audit events out to every configured sink.
///
/// A failing sink is logged and skipped; auditing never changes the outcome
/// of the operation being audited.
#[derive(Debug, Clone, Default)]
pub struct AuditEmitter {
    sinks: Vec<Arc<dyn AuditSink>>,
    pseudonymizer: OwnerPseudonymizer,
}

impl AuditEmitter {
    pub fn new(pseudonymizer: OwnerPseudonymizer) -> Self {
        Self { sinks: Vec::new(), pseudonymizer }
    }

    /// Emitter with no sinks
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Build the emitter described by the audit config
    pub fn from_config(config: &AuditConfig, pool: &DbPool) -> Result<Self> {
        let mut emitter = Self::new(OwnerPseudonymizer::from_config(config)?);
        if config.log_events {
            emitter = emitter.with_sink(Arc::new(TracingAuditSink));
        }
        if config.persist {
            emitter = emitter.with_sink(Arc::new(DatabaseAuditSink::new(pool.clone())));
        }
        Ok(emitter)
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    pub async fn emit(&self, owner: Option<&OwnerId>, mut event: AuditEvent) {
        event.owner = owner.map(|o| self.pseudonymizer.apply(o));

        for sink in &self.sinks {
            if let Err(e) = sink.record(&event).await {
                tracing::error!(
                    error = %e,
                    sink = sink.name(),
                    operation = event.operation,
                    "Failed to record audit event"
                );
            }
        }
    }
}
