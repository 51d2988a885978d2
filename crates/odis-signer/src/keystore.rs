//! Versioned key shares held by this signer.

use crate::config::{KeySetConfig, KeysConfig};
use odis_common::crypto::{CryptoError, KeyShare};
use odis_common::OdisError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Shares of one keyspace, by key version.
#[derive(Debug, Clone)]
pub struct KeySet {
    current_version: u32,
    shares: BTreeMap<u32, Arc<KeyShare>>,
}

impl KeySet {
    pub fn from_config(config: &KeySetConfig) -> Result<Self, CryptoError> {
        let mut shares = BTreeMap::new();
        for entry in &config.shares {
            let share = KeyShare::from_hex(&entry.share)?;
            if shares.insert(entry.version, Arc::new(share)).is_some() {
                return Err(CryptoError::InvalidParameters(format!(
                    "duplicate key version {}",
                    entry.version
                )));
            }
        }
        Ok(Self {
            current_version: config.current_version,
            shares,
        })
    }

    pub fn from_shares(current_version: u32, shares: impl IntoIterator<Item = (u32, KeyShare)>) -> Self {
        Self {
            current_version,
            shares: shares
                .into_iter()
                .map(|(version, share)| (version, Arc::new(share)))
                .collect(),
        }
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Share for the requested version, or the current one.
    pub fn resolve(&self, requested: Option<u32>) -> Result<(u32, Arc<KeyShare>), OdisError> {
        let version = requested.unwrap_or(self.current_version);
        self.shares
            .get(&version)
            .map(|share| (version, Arc::clone(share)))
            .ok_or_else(OdisError::invalid_key_version)
    }
}

/// PNP and domain keyspaces are rotated independently.
#[derive(Debug, Clone)]
pub struct KeyStore {
    pub pnp: KeySet,
    pub domains: KeySet,
}

impl KeyStore {
    pub fn from_config(config: &KeysConfig) -> Result<Self, CryptoError> {
        Ok(Self {
            pnp: KeySet::from_config(&config.pnp)?,
            domains: KeySet::from_config(&config.domains)?,
        })
    }
}
