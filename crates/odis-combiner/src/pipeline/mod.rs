//! # Combiner Pipeline
//!
//! Front-door checks run before any signer is contacted:
//!
//! 1. Parse and validate the body (400)
//! 2. Check the API flag (503)
//! 3. Authenticate (401)
//! 4. Resolve the key version for signing endpoints (400)
//!
//! The policy then fans the request out and resolves the session.

pub mod domain;
pub mod pnp;

use crate::client::SignerClient;
use crate::config::ApiConfig;
use crate::service::CombinerState;
use async_trait::async_trait;
use axum::{extract::rejection::BytesRejection, http::HeaderMap};
use bytes::Bytes;
use odis_common::crypto::ThresholdKey;
use odis_common::http::{status_of, Reply};
use odis_common::key_version::parse_key_version_header;
use odis_common::wire::{Endpoint, AUTHORIZATION_HEADER};
use odis_common::{ErrorType, KeyRing, OdisError, WarningMessage, KEY_VERSION_HEADER};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};
use uuid::Uuid;

/// A parsed client request with the bytes it was parsed from.
pub struct RequestContext<'a, R> {
    pub request: R,
    pub raw: Value,
    /// Forwarded to signers unchanged
    pub body: Bytes,
    pub headers: &'a HeaderMap,
    /// Client `sessionID`, or a generated one
    pub session_id: String,
}

impl<R> RequestContext<'_, R> {
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|value| value.to_str().ok())
    }
}

/// Per-endpoint pieces of the combiner pipeline.
#[async_trait]
pub trait CombinerPolicy: Send + Sync + 'static {
    type Request: DeserializeOwned + Send + Sync;

    fn endpoint(&self) -> Endpoint;

    fn api_enabled(&self, api: &ApiConfig) -> bool;

    fn is_valid(&self, request: &Self::Request) -> bool;

    fn session_id<'r>(&self, request: &'r Self::Request) -> Option<&'r str>;

    /// Warnings to echo on success, or the rejection.
    async fn authenticate(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, Self::Request>,
    ) -> Result<Vec<ErrorType>, OdisError>;

    /// Key versions to sign with; `None` for endpoints that do not sign.
    fn key_ring<'k>(&self, state: &'k CombinerState) -> Option<&'k KeyRing>;

    fn signers<'c>(&self, state: &'c CombinerState) -> &'c SignerClient;

    /// Fans out and resolves the session.
    async fn combine(
        &self,
        state: &CombinerState,
        ctx: &RequestContext<'_, Self::Request>,
        key: Option<Arc<ThresholdKey>>,
        warnings: Vec<ErrorType>,
    ) -> Reply;

    fn failure(&self, version: &str, error: &OdisError) -> Value;
}

fn resolve_key(headers: &HeaderMap, ring: &KeyRing) -> Result<Arc<ThresholdKey>, OdisError> {
    let header = match headers.get(KEY_VERSION_HEADER) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| OdisError::invalid_key_version())?,
        ),
    };
    ring.resolve(parse_key_version_header(header)?)
}

/// Runs one client request through `policy`.
pub async fn run_pipeline<P: CombinerPolicy>(
    policy: &P,
    state: &CombinerState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Reply {
    let path = policy.endpoint().combiner_path();
    let reject = |error: OdisError| {
        warn!(endpoint = path, status = error.status, error = %error.code, "request rejected");
        Reply::new(status_of(&error), policy.failure(&state.version, &error))
    };

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(endpoint = path, error = %rejection, "unreadable body");
            return reject(OdisError::invalid_input());
        }
    };
    let raw: Value = match serde_json::from_slice(&body) {
        Ok(raw) => raw,
        Err(_) => return reject(OdisError::invalid_input()),
    };
    let request: P::Request = match serde_json::from_value(raw.clone()) {
        Ok(request) => request,
        Err(err) => {
            debug!(endpoint = path, error = %err, "body does not match schema");
            return reject(OdisError::invalid_input());
        }
    };
    if !policy.is_valid(&request) {
        return reject(OdisError::invalid_input());
    }

    if !policy.api_enabled(&state.config.api) {
        return reject(OdisError::api_unavailable());
    }

    let session_id = match policy.session_id(&request) {
        Some(id) => id.to_string(),
        None => {
            debug!(endpoint = path, warning = %WarningMessage::MissingSessionId, "generating session id");
            Uuid::new_v4().to_string()
        }
    };
    let ctx = RequestContext {
        request,
        raw,
        body,
        headers,
        session_id,
    };
    let span = tracing::info_span!("session", endpoint = path, session_id = %ctx.session_id);

    async {
        let warnings = match policy.authenticate(state, &ctx).await {
            Ok(warnings) => warnings,
            Err(error) => return reject(error),
        };

        let key = match policy.key_ring(state) {
            None => None,
            Some(ring) => match resolve_key(headers, ring) {
                Ok(key) => Some(key),
                Err(error) => return reject(error),
            },
        };

        policy.combine(state, &ctx, key, warnings).await
    }
    .instrument(span)
    .await
}
