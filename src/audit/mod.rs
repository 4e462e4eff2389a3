//! # Audit Trail
//!
//! Every gate operation and every terminal resolver state produces one
//! [`AuditEvent`]. Events carry typed fields only: owner (optionally
//! pseudonymized), operation, outcome, resolution tier or denial reason, and
//! at most the display prefix of a fingerprint. Secrets and vault references
//! have no field to land in.

pub mod emitter;
pub mod event;
pub mod pseudonym;
pub mod sink;

pub use emitter::AuditEmitter;
pub use event::{AuditEvent, AuditOutcome};
pub use pseudonym::OwnerPseudonymizer;
pub use sink::{AuditSink, DatabaseAuditSink, MemoryAuditSink, TracingAuditSink};
