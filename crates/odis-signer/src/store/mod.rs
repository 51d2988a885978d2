//! # Signer Store
//!
//! Persisted quota counters, replay records and domain limiter state.
//!
//! ## Adapters
//!
//! - [`MemoryStore`]: sharded maps, for development and tests
//! - `RocksStore` (feature `rocksdb`): pessimistic transactions over
//!   column families
//!
//! Every composite update (counter plus replay record, limiter state plus
//! request record) is one atomic store operation.

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;

use crate::config::{StorageBackend, StorageConfig};
use async_trait::async_trait;
use odis_common::ecdsa::sha256;
use odis_common::wire::Address;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;

/// Counter namespace. Legacy and current PNP quotas are tracked apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaScope {
    Pnp,
    LegacyPnp,
}

impl QuotaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaScope::Pnp => "pnp",
            QuotaScope::LegacyPnp => "legacy_pnp",
        }
    }
}

/// Result of persisting an issued signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Counter incremented to `performed_query_count`
    Recorded { performed_query_count: u64 },
    /// Already served. Counter untouched.
    Duplicate { performed_query_count: u64 },
}

impl RecordOutcome {
    pub fn performed_query_count(&self) -> u64 {
        match self {
            RecordOutcome::Recorded {
                performed_query_count,
            }
            | RecordOutcome::Duplicate {
                performed_query_count,
            } => *performed_query_count,
        }
    }
}

/// Persisted limiter state of one domain instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStateRecord {
    pub counter: u64,
    pub timer: u64,
    pub disabled: bool,
    /// Highest nonce accepted on a sign, `None` before the first one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_nonce: Option<u64>,
}

/// Audit record of a served domain signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRequestRecord {
    pub domain_hash: String,
    pub timestamp: u64,
    pub blinded_message: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("corrupt store value: {0}")]
    Corrupt(String),

    #[error("store backend {0} is not compiled in")]
    Unavailable(&'static str),
}

/// Outbound port for signer persistence.
#[async_trait]
pub trait SignerStore: Send + Sync {
    /// Signatures issued to `account` in `scope`, 0 if none.
    async fn performed_query_count(
        &self,
        scope: QuotaScope,
        account: &Address,
    ) -> Result<u64, StoreError>;

    /// Whether this exact blinded query was already served to `account`.
    async fn is_duplicate_request(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<bool, StoreError>;

    /// Writes the replay record and increments the counter atomically.
    async fn record_signature(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<RecordOutcome, StoreError>;

    async fn domain_state(&self, domain_hash: &str)
        -> Result<Option<DomainStateRecord>, StoreError>;

    /// Replaces the state when the stored value still equals `expected`
    /// (`None` meaning never written), storing `request` alongside.
    /// Returns `false` when another writer got there first.
    async fn compare_and_swap_domain_state(
        &self,
        domain_hash: &str,
        expected: Option<&DomainStateRecord>,
        new: &DomainStateRecord,
        request: Option<&DomainRequestRecord>,
    ) -> Result<bool, StoreError>;

    /// Sets `disabled`. Idempotent.
    async fn disable_domain(&self, domain_hash: &str) -> Result<DomainStateRecord, StoreError>;
}

/// Lowercase hex account key.
pub(crate) fn account_key(scope: QuotaScope, account: &Address) -> String {
    format!("{}:{account:?}", scope.as_str())
}

/// Replay key: the blinded query is stored by digest.
pub(crate) fn request_key(scope: QuotaScope, account: &Address, blinded_query: &str) -> String {
    format!(
        "{}:{}",
        account_key(scope, account),
        hex::encode(sha256(blinded_query.as_bytes()))
    )
}

/// Opens the configured backend.
pub fn build_store(config: &StorageConfig) -> Result<Arc<dyn SignerStore>, StoreError> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "rocksdb")]
        StorageBackend::Rocksdb => Ok(Arc::new(RocksStore::open(config)?)),
        #[cfg(not(feature = "rocksdb"))]
        StorageBackend::Rocksdb => Err(StoreError::Unavailable("rocksdb")),
    }
}
