//! # Key Versions
//!
//! Signers and the combiner hold one [`KeyVersionInfo`] per deployed key.
//! Requests select a version with the `keyVersion` header, otherwise the
//! configured current version applies.

use crate::crypto::{CryptoError, ThresholdKey};
use crate::errors::OdisError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Request and response header carrying the key version.
pub const KEY_VERSION_HEADER: &str = "keyVersion";

/// Public material of one key version, as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVersionInfo {
    pub version: u32,
    pub threshold: u32,
    /// Hex G2 group public key.
    pub public_key: String,
    /// Hex concatenated G2 commitments, constant term first.
    pub polynomial: String,
}

/// Parses an optional `keyVersion` header value.
///
/// Absent or blank means "use the current version".
pub fn parse_key_version_header(value: Option<&str>) -> Result<Option<u32>, OdisError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .map(Some)
            .map_err(|_| OdisError::invalid_key_version()),
    }
}

/// All configured key versions of one keyspace (PNP or domains).
#[derive(Debug, Clone)]
pub struct KeyRing {
    current_version: u32,
    keys: BTreeMap<u32, Arc<ThresholdKey>>,
}

impl KeyRing {
    /// Parses every entry and checks the current version is among them.
    pub fn new(current_version: u32, infos: &[KeyVersionInfo]) -> Result<Self, CryptoError> {
        let mut keys = BTreeMap::new();
        for info in infos {
            let key = ThresholdKey::from_info(info)?;
            if keys.insert(info.version, Arc::new(key)).is_some() {
                return Err(CryptoError::InvalidParameters(format!(
                    "duplicate key version {}",
                    info.version
                )));
            }
        }
        if !keys.contains_key(&current_version) {
            return Err(CryptoError::InvalidParameters(format!(
                "current key version {current_version} is not configured"
            )));
        }
        Ok(Self {
            current_version,
            keys,
        })
    }

    /// A ring that resolves nothing, for a keyspace whose API is off.
    pub fn empty(current_version: u32) -> Self {
        Self {
            current_version,
            keys: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn current_version(&self) -> u32 {
        self.current_version
    }

    pub fn versions(&self) -> impl Iterator<Item = u32> + '_ {
        self.keys.keys().copied()
    }

    /// Resolves an explicit request or falls back to the current version.
    pub fn resolve(&self, requested: Option<u32>) -> Result<Arc<ThresholdKey>, OdisError> {
        let version = requested.unwrap_or(self.current_version);
        self.keys
            .get(&version)
            .cloned()
            .ok_or_else(OdisError::invalid_key_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_shares;

    #[test]
    fn test_parse_header() {
        assert_eq!(parse_key_version_header(None).unwrap(), None);
        assert_eq!(parse_key_version_header(Some(" ")).unwrap(), None);
        assert_eq!(parse_key_version_header(Some("2")).unwrap(), Some(2));
        assert_eq!(
            parse_key_version_header(Some("two")).unwrap_err(),
            OdisError::invalid_key_version()
        );
        assert!(parse_key_version_header(Some("-1")).is_err());
    }

    #[test]
    fn test_keyring_resolution() {
        let mut rng = rand::thread_rng();
        let v1 = generate_shares(2, 3, &mut rng).unwrap().info(1);
        let v2 = generate_shares(2, 3, &mut rng).unwrap().info(2);
        let ring = KeyRing::new(2, &[v1, v2]).unwrap();

        assert_eq!(ring.resolve(None).unwrap().version, 2);
        assert_eq!(ring.resolve(Some(1)).unwrap().version, 1);
        assert_eq!(
            ring.resolve(Some(3)).unwrap_err(),
            OdisError::invalid_key_version()
        );
        assert_eq!(ring.versions().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_keyring_requires_current() {
        let info = generate_shares(1, 1, &mut rand::thread_rng()).unwrap().info(1);
        assert!(KeyRing::new(2, &[info.clone()]).is_err());
        assert!(KeyRing::new(1, &[info.clone(), info]).is_err());

        let empty = KeyRing::empty(1);
        assert!(empty.is_empty());
        assert!(empty.resolve(None).is_err());
    }
}
