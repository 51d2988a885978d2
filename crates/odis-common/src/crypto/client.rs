//! # Threshold Crypto Client
//!
//! Accumulates verified partial signatures over one blinded message and
//! interpolates them into the threshold signature.

use super::errors::CryptoError;
use super::group::{verify_pairing, G1};
use super::keys::{PartialSignature, ThresholdKey};
use super::poly::recover;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Per-request share accumulator.
///
/// One instance serves exactly one combiner session. Shares may arrive in
/// any order and in excess of the threshold.
#[derive(Debug, Clone)]
pub struct ThresholdCryptoClient {
    key: Arc<ThresholdKey>,
    blinded_message: G1,
    shares: BTreeMap<u32, G1>,
}

impl ThresholdCryptoClient {
    pub fn new(key: Arc<ThresholdKey>, blinded_message: G1) -> Self {
        Self {
            key,
            blinded_message,
            shares: BTreeMap::new(),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.key.threshold
    }

    pub fn key_version(&self) -> u32 {
        self.key.version
    }

    /// Verifies a share against the per-index key and stores it.
    ///
    /// Re-adding an index overwrites the previous share.
    pub fn add_signature_share(&mut self, partial: PartialSignature) -> Result<(), CryptoError> {
        if !self.key.verify_share(&self.blinded_message, &partial) {
            return Err(CryptoError::InvalidPartialSignature {
                index: partial.index,
            });
        }
        self.shares.insert(partial.index, partial.value);
        Ok(())
    }

    /// Decodes a hex-encoded partial signature and adds it.
    pub fn add_encoded_share(&mut self, encoded: &str) -> Result<u32, CryptoError> {
        let partial = PartialSignature::from_hex(encoded)?;
        let index = partial.index;
        self.add_signature_share(partial)?;
        Ok(index)
    }

    pub fn share_count(&self) -> u32 {
        self.shares.len() as u32
    }

    pub fn has_sufficient_shares(&self) -> bool {
        self.share_count() >= self.key.threshold
    }

    /// Interpolates the stored shares into the blinded threshold signature.
    pub fn combine(&self) -> Result<G1, CryptoError> {
        if !self.has_sufficient_shares() {
            return Err(CryptoError::InsufficientShares {
                required: self.key.threshold,
                have: self.share_count(),
            });
        }

        let signature = recover(self.key.threshold, &self.shares)?;
        if !verify_pairing(&self.key.public_key, &self.blinded_message, &signature) {
            return Err(CryptoError::AggregationFailure(
                "combined signature does not verify under the group key".into(),
            ));
        }
        Ok(signature)
    }

    /// Hex encoding of [`Self::combine`].
    pub fn combine_hex(&self) -> Result<String, CryptoError> {
        self.combine()
            .map(|signature| hex::encode(signature.to_bytes()))
    }
}
