//! # Quota Ledger
//!
//! Performed query counts come from the signer store, total quota from
//! on-chain payments. The legacy scope floors total quota for verified
//! accounts.

use crate::config::QuotaConfig;
use crate::store::{QuotaScope, RecordOutcome, SignerStore, StoreError};
use odis_common::chain::{ChainState, ChainStateError};
use odis_common::wire::{Address, Hash};
use odis_telemetry::QUOTA_LOOKUP_FAILURES;
use primitive_types::U256;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QuotaError {
    /// Chain read failed; the caller decides fail-open or fail-closed
    #[error("external lookup failure: {0}")]
    ExternalLookupFailure(#[from] ChainStateError),

    #[error("persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),
}

/// `floor(total_paid / price)`, saturating at `u64::MAX`.
pub fn paid_quota(total_paid: U256, query_price_wei: u64) -> u64 {
    if query_price_wei == 0 {
        return 0;
    }
    let quota = total_paid / U256::from(query_price_wei);
    if quota > U256::from(u64::MAX) {
        u64::MAX
    } else {
        quota.as_u64()
    }
}

pub struct QuotaLedger {
    chain: Arc<dyn ChainState>,
    store: Arc<dyn SignerStore>,
    config: QuotaConfig,
}

impl QuotaLedger {
    pub fn new(chain: Arc<dyn ChainState>, store: Arc<dyn SignerStore>, config: QuotaConfig) -> Self {
        Self {
            chain,
            store,
            config,
        }
    }

    pub async fn performed_query_count(
        &self,
        scope: QuotaScope,
        account: &Address,
    ) -> Result<u64, QuotaError> {
        Ok(self.store.performed_query_count(scope, account).await?)
    }

    /// Total quota for `account`.
    ///
    /// In the legacy scope a verified account gets at least the free
    /// allowance. Without `identifier` the account counts as unverified. A
    /// failed attestation lookup assumes verified.
    pub async fn total_quota(
        &self,
        scope: QuotaScope,
        account: &Address,
        identifier: Option<Hash>,
    ) -> Result<u64, QuotaError> {
        let total_paid = self
            .chain
            .get_total_paid_for_queries(*account)
            .await
            .inspect_err(|err| {
                QUOTA_LOOKUP_FAILURES.inc();
                warn!(account = ?account, error = %err, "total paid lookup failed");
            })?;
        let paid = paid_quota(total_paid, self.config.query_price_wei);

        match scope {
            QuotaScope::Pnp => Ok(paid),
            QuotaScope::LegacyPnp => {
                let verified = match identifier {
                    None => false,
                    Some(identifier) => {
                        match self.chain.get_verified_status(*account, identifier).await {
                            Ok(status) => status.is_verified,
                            Err(err) => {
                                QUOTA_LOOKUP_FAILURES.inc();
                                warn!(account = ?account, error = %err, "verified status lookup failed, assuming verified");
                                true
                            }
                        }
                    }
                };
                let free = if verified {
                    self.config.unverified_query_max + self.config.additional_verified_query_max
                } else {
                    0
                };
                debug!(account = ?account, paid, verified, "legacy quota");
                Ok(paid.max(free))
            }
        }
    }

    pub async fn block_number(&self) -> Result<u64, QuotaError> {
        Ok(self.chain.get_current_block_number().await?)
    }

    pub async fn is_duplicate(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<bool, QuotaError> {
        Ok(self
            .store
            .is_duplicate_request(scope, account, blinded_query)
            .await?)
    }

    /// Persists one issued signature.
    pub async fn record_signature(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<RecordOutcome, QuotaError> {
        Ok(self
            .store
            .record_signature(scope, account, blinded_query)
            .await?)
    }
}
