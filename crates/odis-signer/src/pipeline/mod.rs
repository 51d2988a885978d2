//! # Request Pipeline
//!
//! Every signer endpoint runs the same stages:
//!
//! 1. Parse and validate the body (400)
//! 2. Check the API flag (503)
//! 3. Authenticate (401, or the domain-specific code)
//! 4. Resolve the key version for signing endpoints (400)
//! 5. Run the endpoint: quota or rate check, sign, persist, respond
//!
//! An [`EndpointPolicy`] supplies the per-endpoint pieces. PNP and legacy
//! PNP share [`pnp::PnpPolicy`]; the domain endpoints share
//! [`domain::DomainPolicy`].

pub mod domain;
pub mod pnp;

pub use odis_common::http::{status_of, Reply};

use crate::config::ApiConfig;
use crate::keystore::{KeySet, KeyStore};
use crate::service::SignerState;
use async_trait::async_trait;
use axum::{extract::rejection::BytesRejection, http::HeaderMap};
use bytes::Bytes;
use odis_common::crypto::KeyShare;
use odis_common::key_version::parse_key_version_header;
use odis_common::wire::{Endpoint, AUTHORIZATION_HEADER};
use odis_common::{ErrorType, OdisError, KEY_VERSION_HEADER};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// A parsed request with the bytes it was parsed from.
pub struct RequestContext<'a, R> {
    pub request: R,
    /// Body as a JSON tree, for signature checks over canonical JSON
    pub raw: Value,
    /// Exact body bytes, for signature checks over the body
    pub body: &'a [u8],
    pub headers: &'a HeaderMap,
}

impl<R> RequestContext<'_, R> {
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION_HEADER)
            .and_then(|value| value.to_str().ok())
    }
}

/// Share selected for this request.
pub struct ResolvedKey {
    pub version: u32,
    pub share: Arc<KeyShare>,
}

/// Per-endpoint pieces of the pipeline.
#[async_trait]
pub trait EndpointPolicy: Send + Sync + 'static {
    type Request: DeserializeOwned + Send + Sync;

    fn endpoint(&self) -> Endpoint;

    fn api_enabled(&self, api: &ApiConfig) -> bool;

    fn is_valid(&self, request: &Self::Request) -> bool;

    /// Warnings to echo on success, or the rejection.
    async fn authenticate(
        &self,
        state: &SignerState,
        ctx: &RequestContext<'_, Self::Request>,
    ) -> Result<Vec<ErrorType>, OdisError>;

    /// Keyspace to sign with; `None` for endpoints that do not sign.
    fn key_set<'k>(&self, keys: &'k KeyStore) -> Option<&'k KeySet>;

    async fn execute(
        &self,
        state: &SignerState,
        ctx: &RequestContext<'_, Self::Request>,
        key: Option<ResolvedKey>,
        warnings: Vec<ErrorType>,
    ) -> Reply;

    /// Failure body for a rejection before `execute`.
    fn failure(&self, version: &str, error: &OdisError) -> Value;
}

fn resolve_key(headers: &HeaderMap, keys: &KeySet) -> Result<ResolvedKey, OdisError> {
    let header = match headers.get(KEY_VERSION_HEADER) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| OdisError::invalid_key_version())?,
        ),
    };
    let requested = parse_key_version_header(header)?;
    let (version, share) = keys.resolve(requested)?;
    Ok(ResolvedKey { version, share })
}

/// Runs one request through `policy`.
pub async fn run_pipeline<P: EndpointPolicy>(
    policy: &P,
    state: &SignerState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Reply {
    let path = policy.endpoint().signer_path();
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

    let ctx = RequestContext {
        request,
        raw,
        body: &body,
        headers,
    };
    let warnings = match policy.authenticate(state, &ctx).await {
        Ok(warnings) => warnings,
        Err(error) => return reject(error),
    };

    let key = match policy.key_set(&state.keys) {
        None => None,
        Some(keys) => match resolve_key(headers, keys) {
            Ok(key) => Some(key),
            Err(error) => return reject(error),
        },
    };

    policy.execute(state, &ctx, key, warnings).await
}
