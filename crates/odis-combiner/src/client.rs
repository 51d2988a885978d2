//! # Signer Client
//!
//! Forwards a client request to one signer and classifies what comes back.
//!
//! | Outcome | Code | Vote |
//! |---------|------|------|
//! | call exceeds its timeout | `TIMEOUT_FROM_SIGNER` | none |
//! | connection or transport error | `SIGNER_REQUEST_ERROR` | 502 |
//! | non-2xx | the body's `error`, if any | that status |
//! | 2xx body that does not parse | `INVALID_SIGNER_RESPONSE` | 502 |
//! | 2xx with `success: false` | `SIGNER_RESPONSE_FAILED_WITH_OK_STATUS` | 500 |
//! | signature under the wrong key version | `INVALID_KEY_VERSION_RESPONSE` | 500 |

use bytes::Bytes;
use odis_common::wire::domain::DomainResponse;
use odis_common::wire::pnp::PnpResponse;
use odis_common::wire::{Endpoint, AUTHORIZATION_HEADER};
use odis_common::{ErrorMessage, ErrorType, KEY_VERSION_HEADER};
use odis_telemetry::{log_event, SIGNER_RESPONSE_ERRORS, SIGNER_TIMEOUTS};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// A signer response body the combiner knows how to read.
pub trait SignerReply: DeserializeOwned + Clone + Send + Sync + 'static {
    fn is_success(&self) -> bool;

    fn error(&self) -> Option<&str>;

    fn warnings(&self) -> &[String];

    /// The body with fields that legitimately differ between signers
    /// removed. Used to spot discrepancies.
    fn comparable(&self) -> Value;
}

impl SignerReply for PnpResponse {
    fn is_success(&self) -> bool {
        self.success
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn comparable(&self) -> Value {
        serde_json::json!({
            "performedQueryCount": self.performed_query_count,
            "totalQuota": self.total_quota,
            "blockNumber": self.block_number,
        })
    }
}

impl SignerReply for DomainResponse {
    fn is_success(&self) -> bool {
        self.success
    }

    fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn warnings(&self) -> &[String] {
        &self.warnings
    }

    fn comparable(&self) -> Value {
        match &self.status {
            Some(status) => serde_json::json!({
                "counter": status.counter,
                "timer": status.timer,
                "disabled": status.disabled,
            }),
            None => Value::Null,
        }
    }
}

/// A signer response classified as a failure.
#[derive(Debug, Clone)]
pub struct SignerFailure<R> {
    /// HTTP status that counts as this signer's vote; `None` when the
    /// signer never answered
    pub status: Option<u16>,
    pub code: ErrorType,
    /// Parsed body, when there was one
    pub body: Option<R>,
}

impl<R> SignerFailure<R> {
    fn new(status: u16, code: impl Into<ErrorType>) -> Self {
        Self {
            status: Some(status),
            code: code.into(),
            body: None,
        }
    }

    fn timeout() -> Self {
        Self {
            status: None,
            code: ErrorMessage::TimeoutFromSigner.into(),
            body: None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.status.is_none()
    }
}

/// One signer's answer, kept verbatim by the session.
#[derive(Debug, Clone)]
pub struct SignerResponse<R> {
    pub signer: String,
    pub outcome: Result<R, SignerFailure<R>>,
}

/// What to send to every signer.
#[derive(Debug, Clone)]
pub struct OutgoingRequest<'a> {
    pub endpoint: Endpoint,
    /// Client body, forwarded verbatim
    pub body: Bytes,
    pub authorization: Option<&'a str>,
    /// Sent as the key version header and required back on success
    pub key_version: Option<u32>,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// HTTP client for one signer set.
#[derive(Debug, Clone)]
pub struct SignerClient {
    http: reqwest::Client,
    signers: Vec<String>,
    timeout: Duration,
}

impl SignerClient {
    pub fn new(signers: Vec<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()?;
        Ok(Self {
            http,
            signers,
            timeout,
        })
    }

    pub fn signers(&self) -> &[String] {
        &self.signers
    }

    /// Calls `signer`, never failing: every problem becomes a
    /// [`SignerFailure`].
    pub async fn send<R: SignerReply>(
        &self,
        signer: &str,
        request: &OutgoingRequest<'_>,
    ) -> SignerResponse<R> {
        let path = request.endpoint.combiner_path();
        let outcome = match tokio::time::timeout(self.timeout, self.exchange(signer, request)).await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                SIGNER_TIMEOUTS.inc();
                Err(SignerFailure::timeout())
            }
        };

        if let Err(failure) = &outcome {
            SIGNER_RESPONSE_ERRORS
                .with_label_values(&[signer, failure.code.as_str()])
                .inc();
            log_event!(
                warn,
                path,
                "signer request failed",
                signer,
                status = failure.status,
                error = %failure.code
            );
        }

        SignerResponse {
            signer: signer.to_string(),
            outcome,
        }
    }

    async fn exchange<R: SignerReply>(
        &self,
        signer: &str,
        request: &OutgoingRequest<'_>,
    ) -> Result<R, SignerFailure<R>> {
        let url = format!(
            "{}{}",
            signer.trim_end_matches('/'),
            request.endpoint.signer_path()
        );
        let mut builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(request.body.clone());
        if let Some(authorization) = request.authorization {
            builder = builder.header(AUTHORIZATION_HEADER, authorization);
        }
        if let Some(version) = request.key_version {
            builder = builder.header(KEY_VERSION_HEADER, version.to_string());
        }

        let response = builder.send().await.map_err(|err| {
            tracing::debug!(signer, error = %err, "signer transport error");
            SignerFailure::new(502, ErrorMessage::SignerRequestError)
        })?;
        let status = response.status();
        let returned_version = response
            .headers()
            .get(KEY_VERSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u32>().ok());
        let bytes = response
            .bytes()
            .await
            .map_err(|_| SignerFailure::new(502, ErrorMessage::SignerRequestError))?;

        classify(status.as_u16(), returned_version, &bytes, request.key_version)
    }
}

/// Classifies a received response.
pub(crate) fn classify<R: SignerReply>(
    status: u16,
    returned_version: Option<u32>,
    bytes: &[u8],
    expected_version: Option<u32>,
) -> Result<R, SignerFailure<R>> {
    let parsed = serde_json::from_slice::<R>(bytes).ok();

    if !(200..300).contains(&status) {
        let code = parsed
            .as_ref()
            .and_then(|body| body.error())
            .and_then(ErrorType::parse)
            .unwrap_or(ErrorMessage::InvalidSignerResponse.into());
        return Err(SignerFailure {
            status: Some(status),
            code,
            body: parsed,
        });
    }

    let Some(body) = parsed else {
        return Err(SignerFailure::new(502, ErrorMessage::InvalidSignerResponse));
    };
    if !body.is_success() {
        return Err(SignerFailure {
            status: Some(500),
            code: ErrorMessage::SignerResponseFailedWithOkStatus.into(),
            body: Some(body),
        });
    }
    if let Some(expected) = expected_version {
        if returned_version != Some(expected) {
            return Err(SignerFailure::new(
                500,
                ErrorMessage::InvalidKeyVersionResponse,
            ));
        }
    }
    Ok(body)
}
