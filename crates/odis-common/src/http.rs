//! # Endpoint Guard
//!
//! Tower middleware wrapped around every ODIS router. For each request it
//! counts the request and response, bounds the handler with a timeout,
//! and catches handler panics so a client always receives a complete
//! failure body.
//!
//! Also home to [`Reply`], the handler result both services render.

use crate::errors::{ErrorMessage, ErrorType, OdisError};
use crate::key_version::KEY_VERSION_HEADER;
use crate::wire::Endpoint;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use odis_telemetry::{observe_request, observe_response, SIGNER_TIMEOUTS};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{error, warn};

/// Endpoint result, rendered as the HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    /// Set on responses that carry a signature
    pub key_version: Option<u32>,
    pub body: Value,
}

impl Reply {
    pub fn new(status: StatusCode, body: impl Serialize) -> Self {
        Self {
            status,
            key_version: None,
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    pub fn ok(body: impl Serialize) -> Self {
        Self::new(StatusCode::OK, body)
    }

    pub fn with_key_version(mut self, version: u32) -> Self {
        self.key_version = Some(version);
        self
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self.key_version {
            Some(version) => (
                self.status,
                [(KEY_VERSION_HEADER, version.to_string())],
                Json(self.body),
            )
                .into_response(),
            None => (self.status, Json(self.body)).into_response(),
        }
    }
}

/// Status code of an [`OdisError`], 500 for anything unrepresentable.
pub fn status_of(error: &OdisError) -> StatusCode {
    StatusCode::from_u16(error.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

struct GuardConfig {
    service: &'static str,
    version: String,
    timeout: Duration,
}

/// Guard layer
#[derive(Clone)]
pub struct GuardLayer {
    config: Arc<GuardConfig>,
}

impl GuardLayer {
    /// `service` is the metric label, `version` goes into failure bodies.
    pub fn new(service: &'static str, version: impl Into<String>, timeout: Duration) -> Self {
        Self {
            config: Arc::new(GuardConfig {
                service,
                version: version.into(),
                timeout,
            }),
        }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

/// Guard service
#[derive(Clone)]
pub struct GuardService<S> {
    inner: S,
    config: Arc<GuardConfig>,
}

impl<S> Service<Request<Body>> for GuardService<S>
where
    S: Service<Request<Body>, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let config = Arc::clone(&self.config);
        // the clone in `self` still needs poll_ready; the ready one serves this call
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let endpoint = endpoint_label(req.uri().path());
            let _timer = observe_request(config.service, endpoint);

            let handler = AssertUnwindSafe(inner.call(req)).catch_unwind();
            let response = match tokio::time::timeout(config.timeout, handler).await {
                Ok(Ok(Ok(response))) => response,
                Ok(Ok(Err(never))) => match never {},
                Ok(Err(_panic)) => {
                    error!(
                        endpoint,
                        error = %ErrorMessage::CaughtErrorInEndpointHandler,
                        "handler panicked"
                    );
                    failure_response(
                        &config.version,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorMessage::CaughtErrorInEndpointHandler.into(),
                    )
                }
                Err(_) => {
                    SIGNER_TIMEOUTS.inc();
                    warn!(
                        endpoint,
                        timeout_ms = config.timeout.as_millis() as u64,
                        "request timed out"
                    );
                    failure_response(
                        &config.version,
                        StatusCode::INTERNAL_SERVER_ERROR,
                        ErrorMessage::UnknownError.into(),
                    )
                }
            };

            observe_response(config.service, endpoint, response.status().as_u16());
            Ok(response)
        })
    }
}

/// Known route paths label themselves; anything else shares one label.
fn endpoint_label(path: &str) -> &'static str {
    Endpoint::ALL
        .iter()
        .find_map(|endpoint| {
            if endpoint.signer_path() == path {
                Some(endpoint.signer_path())
            } else if endpoint.combiner_path() == path {
                Some(endpoint.combiner_path())
            } else {
                None
            }
        })
        .unwrap_or("other")
}

/// `{success: false, version, error}`, parseable as any ODIS response.
pub fn failure_response(version: &str, status: StatusCode, error: ErrorType) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "version": version,
            "error": error,
        })),
    )
        .into_response()
}
