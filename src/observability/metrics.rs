//! # Metrics Collection
//!
//! Counters and histograms recorded through the `metrics` facade. The
//! library installs no exporter; the embedding process picks one.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics recorder for gate, resolver and reconciliation activity
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder {
    enabled: bool,
}

impl MetricsRecorder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// A recorder that drops everything
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Register metric descriptions with the installed recorder
    pub fn describe(&self) {
        describe_counter!(
            "credvault_gate_operations_total",
            Unit::Count,
            "Access Gate operations by operation and outcome"
        );
        describe_histogram!(
            "credvault_gate_operation_duration_seconds",
            Unit::Seconds,
            "Access Gate operation latency"
        );
        describe_counter!(
            "credvault_resolutions_total",
            Unit::Count,
            "Resolutions by terminal outcome"
        );
        describe_counter!(
            "credvault_resolution_retries_total",
            Unit::Count,
            "Gate calls retried by the resolver after Unavailable"
        );
        describe_counter!(
            "credvault_reconciled_total",
            Unit::Count,
            "Pending deletes and orphaned vault entries cleaned up"
        );
        describe_counter!(
            "credvault_security_events_total",
            Unit::Count,
            "Gate calls rejected for an untrusted execution context"
        );
    }

    pub fn record_gate_operation(&self, operation: &'static str, outcome: &'static str, duration: f64) {
        if !self.enabled {
            return;
        }
        counter!("credvault_gate_operations_total", "operation" => operation, "outcome" => outcome)
            .increment(1);
        histogram!("credvault_gate_operation_duration_seconds", "operation" => operation)
            .record(duration);
    }

    pub fn record_resolution(&self, outcome: &'static str) {
        if !self.enabled {
            return;
        }
        counter!("credvault_resolutions_total", "outcome" => outcome).increment(1);
    }

    pub fn record_retry(&self, operation: &'static str) {
        if !self.enabled {
            return;
        }
        counter!("credvault_resolution_retries_total", "operation" => operation).increment(1);
    }

    pub fn record_reconciled(&self, kind: &'static str, count: u64) {
        if !self.enabled || count == 0 {
            return;
        }
        counter!("credvault_reconciled_total", "kind" => kind).increment(count);
    }

    pub fn record_security_event(&self, operation: &'static str) {
        if !self.enabled {
            return;
        }
        counter!("credvault_security_events_total", "operation" => operation).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_installed_recorder_is_noop() {
        let recorder = MetricsRecorder::new(true);
        recorder.describe();
        recorder.record_gate_operation("get_credential", "success", 0.002);
        recorder.record_resolution("gateway");
        recorder.record_retry("lookup_gateway");
        recorder.record_reconciled("pending_credential", 2);
        recorder.record_security_event("get_credential");
    }

    #[test]
    fn test_disabled_recorder() {
        assert!(!MetricsRecorder::disabled().is_enabled());
        assert!(!MetricsRecorder::default().is_enabled());
    }
}
