//! Phone-number-privacy bodies.

use super::{parse_address, parse_hash, Address};
use crate::errors::ErrorType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthenticationMethod {
    #[serde(rename = "wallet_key")]
    WalletKey,
    #[serde(rename = "encryption_key")]
    EncryptionKey,
}

/// Body of every PNP endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnpRequest {
    pub account: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blinded_query_phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashed_phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication_method: Option<AuthenticationMethod>,
    #[serde(rename = "sessionID", default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl PnpRequest {
    /// Parsed account address, `None` if malformed.
    pub fn account_address(&self) -> Option<Address> {
        parse_address(&self.account)
    }

    /// Schema check shared by all PNP endpoints.
    ///
    /// Sign endpoints additionally require a blinded query.
    pub fn is_valid(&self, requires_blinded_query: bool) -> bool {
        if self.account_address().is_none() {
            return false;
        }
        if let Some(hashed) = &self.hashed_phone_number {
            if parse_hash(hashed).is_none() {
                return false;
            }
        }
        match &self.blinded_query_phone_number {
            Some(blinded) => !blinded.is_empty(),
            None => !requires_blinded_query,
        }
    }
}

/// Response of every PNP endpoint, success or failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PnpResponse {
    pub success: bool,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performed_query_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_quota: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// Quota counters attached to PNP responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PnpQuotaStatus {
    pub performed_query_count: u64,
    pub total_quota: u64,
    pub block_number: Option<u64>,
}

impl PnpResponse {
    pub fn success(
        version: impl Into<String>,
        signature: Option<String>,
        quota: PnpQuotaStatus,
        warnings: &[ErrorType],
    ) -> Self {
        Self {
            success: true,
            version: version.into(),
            signature,
            performed_query_count: Some(quota.performed_query_count),
            total_quota: Some(quota.total_quota),
            block_number: quota.block_number,
            error: None,
            warnings: warnings.iter().map(|w| w.to_string()).collect(),
        }
    }

    pub fn failure(
        version: impl Into<String>,
        error: ErrorType,
        quota: Option<PnpQuotaStatus>,
    ) -> Self {
        Self {
            success: false,
            version: version.into(),
            signature: None,
            performed_query_count: quota.map(|q| q.performed_query_count),
            total_quota: quota.map(|q| q.total_quota),
            block_number: quota.and_then(|q| q.block_number),
            error: Some(error.to_string()),
            warnings: Vec::new(),
        }
    }

    /// Counters carried by a successful response.
    pub fn quota_status(&self) -> Option<PnpQuotaStatus> {
        Some(PnpQuotaStatus {
            performed_query_count: self.performed_query_count?,
            total_quota: self.total_quota?,
            block_number: self.block_number,
        })
    }
}
