//! Prometheus metrics shared by the signer and the combiner.
//!
//! All metrics follow the naming convention: `odis_<metric>_<unit>`. The
//! `service` label separates signer and combiner series when both run in
//! one process.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Instant;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // HTTP SURFACE
    // =========================================================================

    /// Requests received, by service and endpoint
    pub static ref REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("odis_requests_total", "Requests received"),
        &["service", "endpoint"]
    ).expect("metric creation failed");

    /// Responses sent, by service, endpoint and HTTP status
    pub static ref RESPONSES: IntCounterVec = IntCounterVec::new(
        Opts::new("odis_responses_total", "Responses sent"),
        &["service", "endpoint", "status"]
    ).expect("metric creation failed");

    /// Handler latency
    pub static ref RESPONSE_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new("odis_response_latency_seconds", "Time to produce a response")
            .buckets(exponential_buckets(0.001, 2.0, 15).expect("bucket creation failed")),
        &["service", "endpoint"]
    ).expect("metric creation failed");

    // =========================================================================
    // SIGNER / COMBINER INTERACTION
    // =========================================================================

    /// Handler timeouts on the signer and signer call timeouts on the combiner
    pub static ref SIGNER_TIMEOUTS: IntCounter = IntCounter::new(
        "odis_signer_timeouts_total",
        "Signer requests that exceeded their timeout"
    ).expect("metric creation failed");

    /// Failed signer responses seen by the combiner
    pub static ref SIGNER_RESPONSE_ERRORS: IntCounterVec = IntCounterVec::new(
        Opts::new("odis_signer_response_errors_total", "Signer responses classified as failures"),
        &["signer", "code"]
    ).expect("metric creation failed");

    /// Partial signatures that failed verification
    pub static ref SIGNATURE_SHARES_REJECTED: IntCounter = IntCounter::new(
        "odis_signature_shares_rejected_total",
        "Partial signatures rejected by share verification"
    ).expect("metric creation failed");

    /// Chain lookups for quota that failed after retries
    pub static ref QUOTA_LOOKUP_FAILURES: IntCounter = IntCounter::new(
        "odis_quota_lookup_failures_total",
        "Total quota lookups that failed"
    ).expect("metric creation failed");
}

/// Proof that the collectors are registered.
#[derive(Debug, Clone, Copy)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once: signers and combiners started in the same
/// process share the registry.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS.clone()),
        Box::new(RESPONSES.clone()),
        Box::new(RESPONSE_LATENCY.clone()),
        Box::new(SIGNER_TIMEOUTS.clone()),
        Box::new(SIGNER_RESPONSE_ERRORS.clone()),
        Box::new(SIGNATURE_SHARES_REJECTED.clone()),
        Box::new(QUOTA_LOOKUP_FAILURES.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Counts an incoming request and starts its latency timer.
pub fn observe_request(service: &str, endpoint: &str) -> HistogramTimer {
    REQUESTS.with_label_values(&[service, endpoint]).inc();
    HistogramTimer::new(&RESPONSE_LATENCY.with_label_values(&[service, endpoint]))
}

/// Counts an outgoing response.
pub fn observe_response(service: &str, endpoint: &str, status: u16) {
    RESPONSES
        .with_label_values(&[service, endpoint, &status.to_string()])
        .inc();
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
