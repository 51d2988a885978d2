//! Request authenticity for domain instances that name a signing key.

use super::canonical::canonical_json;
use crate::ecdsa::{keccak256, recover_address, sign_recoverable, EcdsaError};
use k256::ecdsa::SigningKey;
use crate::wire::domain::{DomainRequest, DomainRequestType};
use crate::wire::parse_address;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainAuthError {
    /// Domain carries a publicKey but the request has no signature or nonce
    #[error("Missing domain request signature or nonce")]
    MissingSignature,

    /// A signature was supplied for a domain without a publicKey
    #[error("Unexpected signature for an unkeyed domain")]
    UnexpectedSignature,

    /// Disabling is only possible for keyed domains
    #[error("Domain has no publicKey and cannot be disabled")]
    NotDisableable,

    #[error("Domain request signature does not match publicKey")]
    InvalidSignature,
}

/// Digest a domain signature signs: `keccak256` of the canonical JSON of
/// the raw request with `options.signature` removed.
pub fn domain_request_digest(raw: &Value) -> [u8; 32] {
    let mut unsigned = raw.clone();
    if let Some(options) = unsigned.get_mut("options").and_then(Value::as_object_mut) {
        options.remove("signature");
    }
    keccak256(canonical_json(&unsigned).as_bytes())
}

/// Verifies that `request` (parsed from `raw`) was authorised by its domain.
pub fn verify_domain_request(raw: &Value, request: &DomainRequest) -> Result<(), DomainAuthError> {
    let Some(public_key) = request.domain.public_key.as_deref() else {
        if request.kind == DomainRequestType::DisableDomainRequest {
            return Err(DomainAuthError::NotDisableable);
        }
        if request.options.signature.is_some() {
            return Err(DomainAuthError::UnexpectedSignature);
        }
        return Ok(());
    };

    let (Some(signature), Some(_nonce)) = (
        request.options.signature.as_deref(),
        request.options.nonce,
    ) else {
        return Err(DomainAuthError::MissingSignature);
    };

    let expected = parse_address(public_key).ok_or(DomainAuthError::InvalidSignature)?;
    let recovered = recover_address(&domain_request_digest(raw), signature)
        .map_err(|_| DomainAuthError::InvalidSignature)?;
    if recovered != expected {
        return Err(DomainAuthError::InvalidSignature);
    }
    Ok(())
}

/// Signs a request value in place, setting `options.signature`.
pub fn sign_domain_request(raw: &mut Value, key: &SigningKey) -> Result<(), EcdsaError> {
    let signature = sign_recoverable(&domain_request_digest(raw), key)?;
    if let Some(options) = raw.get_mut("options").and_then(Value::as_object_mut) {
        options.insert("signature".into(), Value::String(signature));
    }
    Ok(())
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers {
    use super::*;

    pub fn sign_domain_request(raw: &mut Value, key: &SigningKey) {
        super::sign_domain_request(raw, key).unwrap()
    }
}
