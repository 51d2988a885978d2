//! Domain endpoint bodies.

use crate::domain::Domain;
use crate::errors::ErrorType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainRequestType {
    DomainQuotaStatusRequest,
    DomainRestrictedSignatureRequest,
    DisableDomainRequest,
}

/// Authorisation options of a domain request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainOptions {
    /// Hex `r ‖ s ‖ v` signature by the domain's `publicKey`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<u64>,
}

/// Body of every domain endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRequest {
    #[serde(rename = "type")]
    pub kind: DomainRequestType,
    pub domain: Domain,
    #[serde(default)]
    pub options: DomainOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blinded_message: Option<String>,
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl DomainRequest {
    /// Checks the request type matches the endpoint and required fields exist.
    pub fn is_valid_for(&self, expected: DomainRequestType) -> bool {
        if self.kind != expected {
            return false;
        }
        match expected {
            DomainRequestType::DomainRestrictedSignatureRequest => self
                .blinded_message
                .as_deref()
                .is_some_and(|m| !m.is_empty()),
            _ => true,
        }
    }
}

/// Client-facing limiter state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainState {
    /// Requests admitted so far.
    pub counter: u64,
    /// Limiter timer, unix seconds.
    pub timer: u64,
    pub disabled: bool,
    /// Responder's clock, unix seconds.
    pub now: u64,
}

/// Response of every domain endpoint, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainResponse {
    pub success: bool,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<DomainState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DomainResponse {
    pub fn success(
        version: impl Into<String>,
        signature: Option<String>,
        status: DomainState,
        warnings: &[ErrorType],
    ) -> Self {
        Self {
            success: true,
            version: version.into(),
            signature,
            status: Some(status),
            error: None,
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
        }
    }

    pub fn failure(
        version: impl Into<String>,
        error: ErrorType,
        status: Option<DomainState>,
    ) -> Self {
        Self {
            success: false,
            version: version.into(),
            signature: None,
            status,
            error: Some(error.to_string()),
            warnings: Vec::new(),
        }
    }
}
