//! Chain-state configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which adapter serves chain reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainProvider {
    JsonRpc,
    Static,
}

/// Backoff parameters for chain lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after the first
    pub retries: u32,
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    pub factor: f64,
    /// Bound on the whole retry loop
    #[serde(with = "humantime_serde")]
    pub hard_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retries: 5,
            initial_delay: Duration::from_millis(100),
            factor: 1.5,
            hard_timeout: Duration::from_millis(1000),
        }
    }
}

impl RetryConfig {
    /// Rejects parameters the backoff loop cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.hard_timeout.is_zero() {
            return Err("hard_timeout cannot be 0".into());
        }
        if !self.factor.is_finite() || self.factor < 1.0 {
            return Err(format!("factor must be a finite number >= 1, got {}", self.factor));
        }
        Ok(())
    }
}

/// Seeded account for the static provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticAccount {
    pub address: String,
    /// Hex SEC1 public key
    pub dek: Option<String>,
    /// Decimal wei
    pub total_paid: String,
    pub verified: bool,
}

/// Chain access configuration shared by signer and combiner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    pub provider: ChainProvider,
    /// Full-node JSON-RPC endpoint
    pub rpc_url: String,
    pub accounts_address: String,
    pub payments_address: String,
    pub attestations_address: String,
    /// Per-RPC request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    /// Static provider seed
    pub block_number: u64,
    pub accounts: Vec<StaticAccount>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            provider: ChainProvider::Static,
            rpc_url: "http://127.0.0.1:8545".into(),
            accounts_address: "0x000000000000000000000000000000000000ce10".into(),
            payments_address: "0x0000000000000000000000000000000000000000".into(),
            attestations_address: "0x0000000000000000000000000000000000000000".into(),
            request_timeout: Duration::from_millis(500),
            retry: RetryConfig::default(),
            block_number: 0,
            accounts: Vec::new(),
        }
    }
}
