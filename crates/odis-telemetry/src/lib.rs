//! # ODIS Telemetry
//!
//! Observability shared by the signer and the combiner.
//!
//! ## Components
//!
//! - Structured logs through `tracing-subscriber` (pretty or JSON)
//! - Optional OpenTelemetry span export over OTLP
//! - Prometheus metrics, served by each service at `/metrics`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use odis_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let _guard = init_telemetry(TelemetryConfig::from_env("odis-signer")).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | unset | OTLP gRPC endpoint, enables span export |
//! | `OTEL_SERVICE_NAME` | binary name | Service name in traces |
//! | `ODIS_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `ODIS_JSON_LOGS` | `true` in containers | JSON output |

#![deny(unsafe_code)]
#![warn(clippy::all)]

mod config;
mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    encode_metrics, observe_request, observe_response, register_metrics, HistogramTimer,
    MetricsHandle, QUOTA_LOOKUP_FAILURES, REGISTRY, REQUESTS, RESPONSES, RESPONSE_LATENCY,
    SIGNATURE_SHARES_REJECTED, SIGNER_RESPONSE_ERRORS, SIGNER_TIMEOUTS,
};
pub use tracing_setup::TracingGuard;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing: {0}")]
    TracerInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging, tracing and metrics.
///
/// Returns a guard that must be held for the lifetime of the application.
/// Dropping it flushes pending spans.
pub async fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    let tracing = tracing_setup::init_tracing(&config).await?;

    Ok(TelemetryGuard {
        _tracing: tracing,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active. Drop to flush and shutdown.
pub struct TelemetryGuard {
    _tracing: TracingGuard,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("shutting down telemetry");
    }
}

/// Structured event tagged with the endpoint that produced it.
///
/// ```rust,ignore
/// log_event!(warn, "/sign", "quota exceeded", account = %account, count);
/// ```
#[macro_export]
macro_rules! log_event {
    (info, $endpoint:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::info!(endpoint = $endpoint, $($($field)*,)? $msg)
    };
    (warn, $endpoint:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::warn!(endpoint = $endpoint, $($($field)*,)? $msg)
    };
    (error, $endpoint:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::error!(endpoint = $endpoint, $($($field)*,)? $msg)
    };
    (debug, $endpoint:expr, $msg:expr $(, $($field:tt)*)?) => {
        tracing::debug!(endpoint = $endpoint, $($($field)*,)? $msg)
    };
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
