//! # RocksDB Signer Store
//!
//! Pessimistic `TransactionDB`. Each composite write locks the rows it
//! reads with `get_for_update` and commits in one transaction.
//!
//! ## Column Families
//!
//! - `quota` - performed query counters
//! - `pnp_requests` - replay records
//! - `domain_state` - limiter state per domain hash
//! - `domain_requests` - served domain requests

use super::{
    account_key, request_key, DomainRequestRecord, DomainStateRecord, QuotaScope, RecordOutcome,
    SignerStore, StoreError,
};
use crate::config::StorageConfig;
use async_trait::async_trait;
use odis_common::ecdsa::sha256;
use odis_common::wire::Address;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Options, Transaction, TransactionDB,
    TransactionDBOptions, TransactionOptions, WriteOptions,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub const CF_QUOTA: &str = "quota";
pub const CF_PNP_REQUESTS: &str = "pnp_requests";
pub const CF_DOMAIN_STATE: &str = "domain_state";
pub const CF_DOMAIN_REQUESTS: &str = "domain_requests";

pub const COLUMN_FAMILIES: &[&str] = &[
    CF_QUOTA,
    CF_PNP_REQUESTS,
    CF_DOMAIN_STATE,
    CF_DOMAIN_REQUESTS,
];

fn backend(err: rocksdb::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))
}

fn decode_counter(bytes: Option<Vec<u8>>) -> Result<u64, StoreError> {
    match bytes {
        None => Ok(0),
        Some(bytes) => {
            let raw: [u8; 8] = bytes
                .as_slice()
                .try_into()
                .map_err(|_| StoreError::Corrupt(format!("counter of {} bytes", bytes.len())))?;
            Ok(u64::from_be_bytes(raw))
        }
    }
}

/// RocksDB-backed signer store. Transactions run on the blocking pool.
pub struct RocksStore {
    inner: Arc<RocksDb>,
}

struct RocksDb {
    db: TransactionDB,
    sync_writes: bool,
}

impl RocksStore {
    /// Open or create the database at `config.path`
    pub fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        Ok(Self {
            inner: Arc::new(RocksDb::open(config)?),
        })
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&RocksDb) -> Result<T, StoreError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StoreError::Backend(format!("store task failed: {e}")))?
    }
}

impl RocksDb {
    fn open(config: &StorageConfig) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            &config.path,
            cf_descriptors,
        )
        .map_err(|e| StoreError::Backend(format!("Failed to open RocksDB: {e}")))?;

        tracing::info!(path = %config.path.display(), "opened signer database");
        Ok(Self {
            db,
            sync_writes: config.sync_writes,
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily, StoreError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Backend(format!("missing column family {name}")))
    }

    fn transaction(&self) -> Transaction<'_, TransactionDB> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);
        self.db
            .transaction_opt(&write_opts, &TransactionOptions::default())
    }

    fn read_counter(&self, key: &str) -> Result<u64, StoreError> {
        let cf = self.cf(CF_QUOTA)?;
        decode_counter(self.db.get_cf(cf, key).map_err(backend)?)
    }

    fn has_request(&self, key: &str) -> Result<bool, StoreError> {
        let cf = self.cf(CF_PNP_REQUESTS)?;
        Ok(self.db.get_cf(cf, key).map_err(backend)?.is_some())
    }

    fn record_signature_sync(
        &self,
        counter_key: &str,
        replay_key: &str,
        timestamp: u64,
    ) -> Result<RecordOutcome, StoreError> {
        let quota = self.cf(CF_QUOTA)?;
        let requests = self.cf(CF_PNP_REQUESTS)?;
        let txn = self.transaction();

        let count = decode_counter(
            txn.get_for_update_cf(quota, counter_key, true)
                .map_err(backend)?,
        )?;
        if txn
            .get_for_update_cf(requests, replay_key, true)
            .map_err(backend)?
            .is_some()
        {
            txn.rollback().map_err(backend)?;
            return Ok(RecordOutcome::Duplicate {
                performed_query_count: count,
            });
        }

        let next = count + 1;
        txn.put_cf(quota, counter_key, next.to_be_bytes())
            .map_err(backend)?;
        txn.put_cf(requests, replay_key, timestamp.to_be_bytes())
            .map_err(backend)?;
        txn.commit().map_err(backend)?;
        Ok(RecordOutcome::Recorded {
            performed_query_count: next,
        })
    }

    fn read_domain_state(&self, domain_hash: &str) -> Result<Option<DomainStateRecord>, StoreError> {
        let cf = self.cf(CF_DOMAIN_STATE)?;
        self.db
            .get_cf(cf, domain_hash)
            .map_err(backend)?
            .map(|bytes| decode(&bytes))
            .transpose()
    }

    fn compare_and_swap_sync(
        &self,
        domain_hash: &str,
        expected: Option<&DomainStateRecord>,
        new: &DomainStateRecord,
        request: Option<&DomainRequestRecord>,
    ) -> Result<bool, StoreError> {
        let states = self.cf(CF_DOMAIN_STATE)?;
        let requests = self.cf(CF_DOMAIN_REQUESTS)?;
        let txn = self.transaction();

        let current: Option<DomainStateRecord> = txn
            .get_for_update_cf(states, domain_hash, true)
            .map_err(backend)?
            .map(|bytes| decode(&bytes))
            .transpose()?;
        if current.as_ref() != expected {
            txn.rollback().map_err(backend)?;
            return Ok(false);
        }

        txn.put_cf(states, domain_hash, encode(new)?)
            .map_err(backend)?;
        if let Some(request) = request {
            let key = format!(
                "{}:{:020}:{}",
                request.domain_hash,
                request.timestamp,
                hex::encode(sha256(request.blinded_message.as_bytes()))
            );
            txn.put_cf(requests, key, encode(request)?)
                .map_err(backend)?;
        }
        txn.commit().map_err(backend)?;
        Ok(true)
    }

    fn disable_sync(&self, domain_hash: &str) -> Result<DomainStateRecord, StoreError> {
        let states = self.cf(CF_DOMAIN_STATE)?;
        let txn = self.transaction();

        let mut state: DomainStateRecord = txn
            .get_for_update_cf(states, domain_hash, true)
            .map_err(backend)?
            .map(|bytes| decode(&bytes))
            .transpose()?
            .unwrap_or_default();
        state.disabled = true;
        txn.put_cf(states, domain_hash, encode(&state)?)
            .map_err(backend)?;
        txn.commit().map_err(backend)?;
        Ok(state)
    }
}

#[async_trait]
impl SignerStore for RocksStore {
    async fn performed_query_count(
        &self,
        scope: QuotaScope,
        account: &Address,
    ) -> Result<u64, StoreError> {
        let key = account_key(scope, account);
        self.blocking(move |db| db.read_counter(&key)).await
    }

    async fn is_duplicate_request(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<bool, StoreError> {
        let key = request_key(scope, account, blinded_query);
        self.blocking(move |db| db.has_request(&key)).await
    }

    async fn record_signature(
        &self,
        scope: QuotaScope,
        account: &Address,
        blinded_query: &str,
    ) -> Result<RecordOutcome, StoreError> {
        let counter_key = account_key(scope, account);
        let replay_key = request_key(scope, account, blinded_query);
        let timestamp = odis_common::unix_now();
        self.blocking(move |db| db.record_signature_sync(&counter_key, &replay_key, timestamp))
            .await
    }

    async fn domain_state(
        &self,
        domain_hash: &str,
    ) -> Result<Option<DomainStateRecord>, StoreError> {
        let domain_hash = domain_hash.to_string();
        self.blocking(move |db| db.read_domain_state(&domain_hash)).await
    }

    async fn compare_and_swap_domain_state(
        &self,
        domain_hash: &str,
        expected: Option<&DomainStateRecord>,
        new: &DomainStateRecord,
        request: Option<&DomainRequestRecord>,
    ) -> Result<bool, StoreError> {
        let domain_hash = domain_hash.to_string();
        let expected = expected.copied();
        let new = *new;
        let request = request.cloned();
        self.blocking(move |db| {
            db.compare_and_swap_sync(&domain_hash, expected.as_ref(), &new, request.as_ref())
        })
        .await
    }

    async fn disable_domain(&self, domain_hash: &str) -> Result<DomainStateRecord, StoreError> {
        let domain_hash = domain_hash.to_string();
        self.blocking(move |db| db.disable_sync(&domain_hash)).await
    }
}
