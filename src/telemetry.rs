//! Telemetry module for Flowsmith
//!
//! Prometheus counters for pipeline verdicts, generation fallbacks, automation
//! runs and integration calls. Exposed at `GET /metrics`.

use crate::{FlowsmithError, Result};
use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, TextEncoder, register_counter_vec,
    register_histogram_vec,
};

/// Pipeline verdicts by status (approved / rejected)
static PIPELINE_VERDICTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "flowsmith_pipeline_verdicts_total",
        "Total number of generation pipeline verdicts",
        &["status"]
    )
    .unwrap()
});

/// End-to-end pipeline duration
static PIPELINE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        HistogramOpts::new(
            "flowsmith_pipeline_duration_seconds",
            "Duration of generation pipeline runs in seconds"
        ),
        &["status"]
    )
    .unwrap()
});

/// Deterministic fallbacks taken because the generation backend failed
static GENERATION_FALLBACKS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "flowsmith_generation_fallbacks_total",
        "Total number of agent fallbacks after generation failures",
        &["agent"]
    )
    .unwrap()
});

/// Automation runs by trigger (manual / scheduled)
static AUTOMATION_RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "flowsmith_automation_runs_total",
        "Total number of automation runs",
        &["trigger"]
    )
    .unwrap()
});

/// Integration calls by integration and outcome
static INTEGRATION_CALLS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "flowsmith_integration_calls_total",
        "Total number of external integration calls",
        &["integration", "outcome"]
    )
    .unwrap()
});

/// Record a pipeline verdict and its duration
pub fn record_pipeline_verdict(status: &str, duration_secs: f64) {
    PIPELINE_VERDICTS_TOTAL.with_label_values(&[status]).inc();
    PIPELINE_DURATION
        .with_label_values(&[status])
        .observe(duration_secs);
}

/// Record an agent falling back to its deterministic path
pub fn record_generation_fallback(agent: &str) {
    GENERATION_FALLBACKS_TOTAL.with_label_values(&[agent]).inc();
}

/// Record an automation run
pub fn record_automation_run(trigger: &str) {
    AUTOMATION_RUNS_TOTAL.with_label_values(&[trigger]).inc();
}

/// Record an integration call (`ok`, `error`, `cached`, `stale`, ...)
pub fn record_integration_call(integration: &str, outcome: &str) {
    INTEGRATION_CALLS_TOTAL
        .with_label_values(&[integration, outcome])
        .inc();
}

/// Get Prometheus metrics in text format
pub fn get_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| FlowsmithError::config(format!("Failed to encode metrics: {}", e)))?;

    String::from_utf8(buffer)
        .map_err(|e| FlowsmithError::config(format!("Failed to convert metrics to UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_metrics() {
        record_pipeline_verdict("approved", 0.25);
        record_generation_fallback("intent");
        record_automation_run("manual");
        record_integration_call("currency_api", "ok");

        let metrics = get_metrics().unwrap();

        assert!(metrics.contains("flowsmith_pipeline_verdicts_total"));
        assert!(metrics.contains("flowsmith_pipeline_duration_seconds"));
        assert!(metrics.contains("flowsmith_generation_fallbacks_total"));
        assert!(metrics.contains("flowsmith_automation_runs_total"));
        assert!(metrics.contains("flowsmith_integration_calls_total"));
    }
}
