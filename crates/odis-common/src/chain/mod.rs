//! # Chain State
//!
//! Read-only view of the on-chain data ODIS depends on: registered data
//! encryption keys, attestation status, quota payments and the head block.
//!
//! ## Architecture
//!
//! - [`ChainState`] is the outbound port
//! - [`JsonRpcChainState`] speaks Ethereum JSON-RPC to a full node
//! - [`StaticChainState`] serves seeded values for development and tests
//! - [`RetryingChainState`] wraps any adapter with bounded backoff

pub mod config;
pub mod jsonrpc;
pub mod retry;
pub mod static_state;

use crate::wire::{Address, Hash};
use async_trait::async_trait;
use primitive_types::U256;
use std::sync::Arc;
use thiserror::Error;

pub use config::{ChainConfig, ChainProvider, RetryConfig, StaticAccount};
pub use jsonrpc::JsonRpcChainState;
pub use retry::{retry_with_backoff, RetryingChainState};
pub use static_state::StaticChainState;

/// Chain lookups surface as a single failure class to callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainStateError {
    /// Connection or HTTP-level failure
    #[error("chain transport error: {0}")]
    Transport(String),

    /// Node answered with a JSON-RPC error object
    #[error("chain RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response did not decode
    #[error("chain response decode error: {0}")]
    Decode(String),

    /// Retry loop exceeded its hard timeout
    #[error("chain lookup timed out")]
    Timeout,
}

/// Attestation summary for an (account, identifier) pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifiedStatus {
    pub is_verified: bool,
    pub completed: u32,
    pub remaining: u32,
    pub total: u32,
}

/// Attestations needed before an account counts as verified.
pub const REQUIRED_ATTESTATIONS: u32 = 3;

impl VerifiedStatus {
    /// Applies the verification rule to raw attestation counters.
    pub fn from_stats(completed: u32, requested: u32) -> Self {
        let remaining = REQUIRED_ATTESTATIONS.saturating_sub(completed);
        // completed / requested >= 0.5
        let ratio_ok = requested > 0 && u64::from(completed) * 2 >= u64::from(requested);
        Self {
            is_verified: remaining == 0 && ratio_ok,
            completed,
            remaining,
            total: requested,
        }
    }
}

/// Outbound port for on-chain reads.
#[async_trait]
pub trait ChainState: Send + Sync {
    /// Registered DEK as hex, `None` if the account has none.
    async fn get_data_encryption_key(
        &self,
        account: Address,
    ) -> Result<Option<String>, ChainStateError>;

    async fn get_verified_status(
        &self,
        account: Address,
        identifier: Hash,
    ) -> Result<VerifiedStatus, ChainStateError>;

    /// Total paid for queries, in wei of the payment token.
    async fn get_total_paid_for_queries(&self, account: Address) -> Result<U256, ChainStateError>;

    async fn get_current_block_number(&self) -> Result<u64, ChainStateError>;
}

/// Builds the configured adapter, wrapped with retry.
pub fn build_chain_state(config: &ChainConfig) -> Result<Arc<dyn ChainState>, ChainStateError> {
    let inner: Arc<dyn ChainState> = match config.provider {
        ChainProvider::JsonRpc => Arc::new(JsonRpcChainState::new(config)?),
        ChainProvider::Static => Arc::new(StaticChainState::from_config(config)?),
    };
    Ok(Arc::new(RetryingChainState::new(inner, config.retry.clone())))
}
