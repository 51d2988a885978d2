//! In-memory signer store.

use super::{
    account_key, request_key, DomainRequestRecord, DomainStateRecord, QuotaScope, RecordOutcome,
    SignerStore, StoreError,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use odis_common::wire::Address;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// Sharded maps. Composite writes serialize on `write_lock`.
///
/// `set_failing(true)` makes every operation fail, which drives the
/// persistence failure paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    counters: DashMap<String, u64>,
    requests: DashSet<String>,
    domains: DashMap<String, DomainStateRecord>,
    domain_requests: Mutex<Vec<DomainRequestRecord>>,
    write_lock: Mutex<()>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Served domain requests, oldest first.
    pub fn domain_requests(&self) -> Vec<DomainRequestRecord> {
        self.domain_requests.lock().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store set to fail".into()));
        }
        Ok(())
    }

    fn count(&self, key: &str) -> u64 {
        self.counters.get(key).map(|c| *c).unwrap_or(0)
    }
}

#[async_trait]
impl SignerStore for MemoryStore {
    async fn performed_query_count(
        &self,
        scope: QuotaScope,
        account: &Address,
    ) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.count(&account_key(scope, account)))
    }

    async fn is_duplicate_request(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self
            .requests
            .contains(&request_key(scope, account, blinded_query)))
    }

    async fn record_signature(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<RecordOutcome, StoreError> {
        self.check()?;
        let counter_key = account_key(scope, account);
        let _guard = self.write_lock.lock();

        if !self
            .requests
            .insert(request_key(scope, account, blinded_query))
        {
            return Ok(RecordOutcome::Duplicate {
                performed_query_count: self.count(&counter_key),
            });
        }
        let mut counter = self.counters.entry(counter_key).or_insert(0);
        *counter += 1;
        Ok(RecordOutcome::Recorded {
            performed_query_count: *counter,
        })
    }

    async fn domain_state(
        &self,
        domain_hash: &str,
    ) -> Result<Option<DomainStateRecord>, StoreError> {
        self.check()?;
        Ok(self.domains.get(domain_hash).map(|state| *state))
    }

    async fn compare_and_swap_domain_state(
        &self,
        domain_hash: &str,
        expected: Option<&DomainStateRecord>,
        new: &DomainStateRecord,
        request: Option<&DomainRequestRecord>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let _guard = self.write_lock.lock();

        let current = self.domains.get(domain_hash).map(|state| *state);
        if current.as_ref() != expected {
            return Ok(false);
        }
        self.domains.insert(domain_hash.to_string(), *new);
        if let Some(request) = request {
            self.domain_requests.lock().push(request.clone());
        }
        Ok(true)
    }

    async fn disable_domain(&self, domain_hash: &str) -> Result<DomainStateRecord, StoreError> {
        self.check()?;
        let _guard = self.write_lock.lock();

        let mut state = self.domains.entry(domain_hash.to_string()).or_default();
        state.disabled = true;
        Ok(*state)
    }
}
