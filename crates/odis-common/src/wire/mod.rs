//! # Wire Types
//!
//! JSON request and response bodies shared by the signer and the combiner.
//! Field names are camelCase.

pub mod domain;
pub mod pnp;

use serde::{Deserialize, Serialize};

pub use primitive_types::{H160 as Address, H256 as Hash};

/// Maximum accepted request body.
pub const MAX_BODY_BYTES: usize = 200 * 1024;

/// Header carrying the request signature.
pub const AUTHORIZATION_HEADER: &str = "authorization";

/// Every endpoint served by ODIS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Status,
    Metrics,
    PnpSign,
    PnpQuota,
    LegacyPnpSign,
    LegacyPnpQuota,
    DomainSign,
    DomainQuotaStatus,
    DisableDomain,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::Status,
        Endpoint::Metrics,
        Endpoint::PnpSign,
        Endpoint::PnpQuota,
        Endpoint::LegacyPnpSign,
        Endpoint::LegacyPnpQuota,
        Endpoint::DomainSign,
        Endpoint::DomainQuotaStatus,
        Endpoint::DisableDomain,
    ];

    /// Route on a signer.
    pub fn signer_path(&self) -> &'static str {
        match self {
            Endpoint::Status => "/status",
            Endpoint::Metrics => "/metrics",
            Endpoint::PnpSign => "/sign",
            Endpoint::PnpQuota => "/quotaStatus",
            Endpoint::LegacyPnpSign => "/getBlindedMessagePartialSig",
            Endpoint::LegacyPnpQuota => "/getQuota",
            Endpoint::DomainSign => "/domain/sign",
            Endpoint::DomainQuotaStatus => "/domain/quotaStatus",
            Endpoint::DisableDomain => "/domain/disable",
        }
    }

    /// Route on the combiner. Only the legacy sign route differs.
    pub fn combiner_path(&self) -> &'static str {
        match self {
            Endpoint::LegacyPnpSign => "/getBlindedMessageSig",
            other => other.signer_path(),
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::Status => "status",
            Endpoint::Metrics => "metrics",
            Endpoint::PnpSign => "pnp_sign",
            Endpoint::PnpQuota => "pnp_quota",
            Endpoint::LegacyPnpSign => "legacy_pnp_sign",
            Endpoint::LegacyPnpQuota => "legacy_pnp_quota",
            Endpoint::DomainSign => "domain_sign",
            Endpoint::DomainQuotaStatus => "domain_quota_status",
            Endpoint::DisableDomain => "domain_disable",
        }
    }

    pub fn is_signing(&self) -> bool {
        matches!(
            self,
            Endpoint::PnpSign | Endpoint::LegacyPnpSign | Endpoint::DomainSign
        )
    }
}

/// `GET /status` body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
}

/// Parses a 20-byte hex address, `0x` prefix optional, any case.
pub fn parse_address(value: &str) -> Option<Address> {
    let raw = value.strip_prefix("0x").unwrap_or(value);
    if raw.len() != 40 {
        return None;
    }
    let bytes = hex::decode(raw).ok()?;
    Some(Address::from_slice(&bytes))
}

/// Parses a 32-byte hex hash, `0x` prefix optional.
pub fn parse_hash(value: &str) -> Option<Hash> {
    let raw = value.strip_prefix("0x").unwrap_or(value);
    if raw.len() != 64 {
        return None;
    }
    let bytes = hex::decode(raw).ok()?;
    Some(Hash::from_slice(&bytes))
}
