//! # Observability Infrastructure
//!
//! Structured logging through `tracing` and metrics through the `metrics`
//! facade.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info, AUDIT_TARGET, SECURITY_TARGET};
pub use metrics::MetricsRecorder;

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and return the metrics recorder for the process
pub fn init_observability(config: &ObservabilityConfig) -> Result<MetricsRecorder> {
    init_logging(config)?;

    let recorder = MetricsRecorder::new(config.enable_metrics);
    if config.enable_metrics {
        recorder.describe();
    }

    info!(
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.enable_metrics,
        "Observability initialized"
    );

    Ok(recorder)
}
