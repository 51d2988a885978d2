//! Bounded exponential backoff for chain lookups.

use super::{ChainState, ChainStateError, RetryConfig, VerifiedStatus};
use crate::wire::{Address, Hash};
use async_trait::async_trait;
use primitive_types::U256;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Runs `op` until it succeeds, `retries` extra attempts are spent, or the
/// hard timeout elapses.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    mut op: F,
) -> Result<T, ChainStateError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainStateError>>,
{
    let attempts = async {
        let mut delay = config.initial_delay;
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= config.retries => return Err(err),
                Err(err) => {
                    warn!(attempt, error = %err, "chain lookup failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = next_delay(delay, config);
                    attempt += 1;
                }
            }
        }
    };

    match tokio::time::timeout(config.hard_timeout, attempts).await {
        Ok(result) => result,
        Err(_) => Err(ChainStateError::Timeout),
    }
}

/// Grows `delay` by the backoff factor, capped at the hard timeout.
fn next_delay(delay: Duration, config: &RetryConfig) -> Duration {
    Duration::try_from_secs_f64(delay.as_secs_f64() * config.factor)
        .unwrap_or(config.hard_timeout)
        .min(config.hard_timeout)
}

/// Decorates a [`ChainState`] with [`retry_with_backoff`] on every call.
pub struct RetryingChainState {
    inner: Arc<dyn ChainState>,
    config: RetryConfig,
}

impl RetryingChainState {
    pub fn new(inner: Arc<dyn ChainState>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl ChainState for RetryingChainState {
    async fn get_data_encryption_key(
        &self,
        account: Address,
    ) -> Result<Option<String>, ChainStateError> {
        let inner = &self.inner;
        retry_with_backoff(&self.config, move || inner.get_data_encryption_key(account)).await
    }

    async fn get_verified_status(
        &self,
        account: Address,
        identifier: Hash,
    ) -> Result<VerifiedStatus, ChainStateError> {
        let inner = &self.inner;
        retry_with_backoff(&self.config, move || {
            inner.get_verified_status(account, identifier)
        })
        .await
    }

    async fn get_total_paid_for_queries(&self, account: Address) -> Result<U256, ChainStateError> {
        let inner = &self.inner;
        retry_with_backoff(&self.config, move || inner.get_total_paid_for_queries(account)).await
    }

    async fn get_current_block_number(&self) -> Result<u64, ChainStateError> {
        let inner = &self.inner;
        retry_with_backoff(&self.config, move || inner.get_current_block_number()).await
    }
}
