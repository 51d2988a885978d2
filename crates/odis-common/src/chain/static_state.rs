//! In-process chain state seeded from configuration.

use super::{ChainConfig, ChainState, ChainStateError, VerifiedStatus};
use crate::wire::{parse_address, Address, Hash};
use async_trait::async_trait;
use parking_lot::RwLock;
use primitive_types::U256;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Debug, Clone, Default)]
struct AccountState {
    dek: Option<String>,
    total_paid: U256,
    verified: bool,
}

/// Chain-state stub for development networks and tests.
///
/// `set_failing(true)` makes every lookup fail, which drives the
/// fail-open and fail-closed paths.
#[derive(Debug, Default)]
pub struct StaticChainState {
    accounts: RwLock<HashMap<Address, AccountState>>,
    block_number: AtomicU64,
    failing: AtomicBool,
}

impl StaticChainState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ChainConfig) -> Result<Self, ChainStateError> {
        let state = Self::new();
        state.set_block_number(config.block_number);
        for seeded in &config.accounts {
            let address = parse_address(&seeded.address).ok_or_else(|| {
                ChainStateError::Decode(format!("invalid seeded address {}", seeded.address))
            })?;
            let total_paid = if seeded.total_paid.is_empty() {
                U256::zero()
            } else {
                U256::from_dec_str(&seeded.total_paid)
                    .map_err(|e| ChainStateError::Decode(format!("total_paid: {e:?}")))?
            };
            state.accounts.write().insert(
                address,
                AccountState {
                    dek: seeded.dek.clone(),
                    total_paid,
                    verified: seeded.verified,
                },
            );
        }
        Ok(state)
    }

    pub fn set_dek(&self, account: Address, dek: Option<String>) {
        self.accounts.write().entry(account).or_default().dek = dek;
    }

    pub fn set_total_paid(&self, account: Address, total_paid: U256) {
        self.accounts.write().entry(account).or_default().total_paid = total_paid;
    }

    pub fn set_verified(&self, account: Address, verified: bool) {
        self.accounts.write().entry(account).or_default().verified = verified;
    }

    pub fn set_block_number(&self, block_number: u64) {
        self.block_number.store(block_number, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ChainStateError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChainStateError::Transport("static chain state set to fail".into()));
        }
        Ok(())
    }

    fn account(&self, account: &Address) -> AccountState {
        self.accounts.read().get(account).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChainState for StaticChainState {
    async fn get_data_encryption_key(
        &self,
        account: Address,
    ) -> Result<Option<String>, ChainStateError> {
        self.check()?;
        Ok(self.account(&account).dek)
    }

    async fn get_verified_status(
        &self,
        account: Address,
        _identifier: Hash,
    ) -> Result<VerifiedStatus, ChainStateError> {
        self.check()?;
        Ok(if self.account(&account).verified {
            VerifiedStatus::from_stats(3, 3)
        } else {
            VerifiedStatus::from_stats(0, 0)
        })
    }

    async fn get_total_paid_for_queries(&self, account: Address) -> Result<U256, ChainStateError> {
        self.check()?;
        Ok(self.account(&account).total_paid)
    }

    async fn get_current_block_number(&self) -> Result<u64, ChainStateError> {
        self.check()?;
        Ok(self.block_number.load(Ordering::SeqCst))
    }
}
