//! # Domains
//!
//! A domain is an application-defined policy object that decides how often
//! its instance may be queried. The only supported kind is the sequential
//! delay domain.

pub mod authenticity;
pub mod canonical;

use crate::ecdsa::keccak256;
use crate::wire::parse_address;
use serde::{Deserialize, Serialize};

pub use authenticity::{sign_domain_request, verify_domain_request, DomainAuthError};
pub use canonical::canonical_json;

pub const SEQUENTIAL_DELAY_DOMAIN_NAME: &str = "ODIS Sequential Delay Domain";
pub const SEQUENTIAL_DELAY_DOMAIN_VERSION: &str = "1";

/// One stage of a sequential delay schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequentialDelayStage {
    /// Seconds to wait before the first request of each batch.
    pub delay: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_timer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<u32>,
}

impl SequentialDelayStage {
    pub fn reset_timer(&self) -> bool {
        self.reset_timer.unwrap_or(true)
    }

    pub fn batch_size(&self) -> u64 {
        u64::from(self.batch_size.unwrap_or(1))
    }

    pub fn repetitions(&self) -> u64 {
        u64::from(self.repetitions.unwrap_or(1))
    }

    /// Requests admitted by this stage before the cursor moves on.
    pub fn capacity(&self) -> u64 {
        self.batch_size().saturating_mul(self.repetitions())
    }
}

/// Domain definition as it appears in requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub stages: Vec<SequentialDelayStage>,
    /// Address allowed to sign requests for this domain instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

/// Reasons a domain definition is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    #[error("Unknown domain {name} v{version}")]
    UnknownDomain { name: String, version: String },

    #[error("Invalid domain: {0}")]
    Invalid(String),
}

impl Domain {
    pub fn is_sequential_delay(&self) -> bool {
        self.name == SEQUENTIAL_DELAY_DOMAIN_NAME && self.version == SEQUENTIAL_DELAY_DOMAIN_VERSION
    }

    /// Checks the domain is a supported kind with a well-formed schedule.
    pub fn validate(&self) -> Result<(), DomainError> {
        if !self.is_sequential_delay() {
            return Err(DomainError::UnknownDomain {
                name: self.name.clone(),
                version: self.version.clone(),
            });
        }
        if self.stages.is_empty() {
            return Err(DomainError::Invalid("at least one stage is required".into()));
        }
        for stage in &self.stages {
            if stage.batch_size == Some(0) || stage.repetitions == Some(0) {
                return Err(DomainError::Invalid(
                    "batchSize and repetitions must be positive".into(),
                ));
            }
        }
        if let Some(key) = &self.public_key {
            if parse_address(key).is_none() {
                return Err(DomainError::Invalid("publicKey must be an address".into()));
            }
        }
        Ok(())
    }

    /// `keccak256` of the canonical JSON encoding, hex with `0x`.
    pub fn hash(&self) -> String {
        let value = serde_json::to_value(self).unwrap_or_default();
        format!("0x{}", hex::encode(keccak256(canonical_json(&value).as_bytes())))
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers {
    use super::*;

    pub fn stage(delay: u64) -> SequentialDelayStage {
        SequentialDelayStage {
            delay,
            reset_timer: None,
            batch_size: None,
            repetitions: None,
        }
    }

    pub fn domain(stages: Vec<SequentialDelayStage>, public_key: Option<String>) -> Domain {
        Domain {
            name: SEQUENTIAL_DELAY_DOMAIN_NAME.into(),
            version: SEQUENTIAL_DELAY_DOMAIN_VERSION.into(),
            stages,
            public_key,
            salt: None,
        }
    }
}
