//! # Threshold Keys
//!
//! Private key shares, partial signatures and the public key material
//! (group key plus verification polynomial) of one key version.

use super::errors::CryptoError;
use super::group::{verify_pairing, GroupElement, Scalar, G1, G1_LENGTH, G2, SCALAR_LENGTH};
use super::poly::{Private, Public};
use crate::key_version::KeyVersionInfo;
use rand::RngCore;
use zeroize::Zeroize;

const INDEX_LENGTH: usize = 4;

fn split_index(bytes: &[u8], body_len: usize) -> Result<(u32, &[u8]), CryptoError> {
    if bytes.len() != INDEX_LENGTH + body_len {
        return Err(CryptoError::InvalidLength {
            expected: INDEX_LENGTH + body_len,
            actual: bytes.len(),
        });
    }
    let (index, body) = bytes.split_at(INDEX_LENGTH);
    let mut raw = [0u8; INDEX_LENGTH];
    raw.copy_from_slice(index);
    Ok((u32::from_be_bytes(raw), body))
}

// =============================================================================
// KEY SHARE
// =============================================================================

/// One signer's share of the threshold private key.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyShare {
    pub index: u32,
    secret: Scalar,
}

impl std::fmt::Debug for KeyShare {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyShare")
            .field("index", &self.index)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Drop for KeyShare {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl KeyShare {
    pub fn new(index: u32, secret: Scalar) -> Self {
        Self { index, secret }
    }

    /// Computes `s_i · B` over a blinded message.
    pub fn partial_sign(&self, blinded_message: &G1) -> PartialSignature {
        let mut value = *blinded_message;
        value.mul_assign(&self.secret);
        PartialSignature {
            index: self.index,
            value,
        }
    }

    /// Public verification key for this share.
    pub fn public(&self) -> G2 {
        let mut point = G2::generator();
        point.mul_assign(&self.secret);
        point
    }

    /// Encodes as `index (4 bytes BE) ‖ scalar (32 bytes BE)` in hex.
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(INDEX_LENGTH + SCALAR_LENGTH);
        bytes.extend_from_slice(&self.index.to_be_bytes());
        bytes.extend_from_slice(&self.secret.to_bytes());
        let encoded = hex::encode(&bytes);
        bytes.zeroize();
        encoded
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        let mut bytes = hex::decode(encoded.trim().trim_start_matches("0x"))?;
        let parsed = split_index(&bytes, SCALAR_LENGTH)
            .and_then(|(index, body)| Ok(Self::new(index, Scalar::from_bytes(body)?)));
        bytes.zeroize();
        parsed
    }
}

// =============================================================================
// PARTIAL SIGNATURE
// =============================================================================

/// A signer's contribution over a blinded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialSignature {
    pub index: u32,
    pub value: G1,
}

impl PartialSignature {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(INDEX_LENGTH + G1_LENGTH);
        bytes.extend_from_slice(&self.index.to_be_bytes());
        bytes.extend_from_slice(&self.value.to_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let (index, body) = split_index(bytes, G1_LENGTH)?;
        Ok(Self {
            index,
            value: G1::from_bytes(body)?,
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(encoded: &str) -> Result<Self, CryptoError> {
        Self::from_bytes(&hex::decode(encoded.trim_start_matches("0x"))?)
    }
}

// =============================================================================
// THRESHOLD KEY
// =============================================================================

/// Parsed public material for one key version.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdKey {
    pub version: u32,
    pub threshold: u32,
    pub public_key: G2,
    pub polynomial: Public,
}

impl ThresholdKey {
    /// Parses and cross-checks a configured key version.
    ///
    /// The polynomial must carry exactly `threshold` commitments and its
    /// constant term must equal the public key.
    pub fn from_info(info: &KeyVersionInfo) -> Result<Self, CryptoError> {
        if info.threshold == 0 {
            return Err(CryptoError::InvalidParameters("threshold must be > 0".into()));
        }
        let public_key = G2::from_bytes(&hex::decode(info.public_key.trim_start_matches("0x"))?)?;
        let polynomial =
            Public::from_bytes(&hex::decode(info.polynomial.trim_start_matches("0x"))?)?;

        if polynomial.degree_plus_one() != info.threshold {
            return Err(CryptoError::InvalidParameters(format!(
                "polynomial has {} coefficients but threshold is {}",
                polynomial.degree_plus_one(),
                info.threshold
            )));
        }
        if *polynomial.constant() != public_key {
            return Err(CryptoError::InvalidParameters(
                "polynomial constant term does not match public key".into(),
            ));
        }

        Ok(Self {
            version: info.version,
            threshold: info.threshold,
            public_key,
            polynomial,
        })
    }

    /// Checks `e(σ_i, g2) == e(B, P(i))`.
    pub fn verify_share(&self, blinded_message: &G1, partial: &PartialSignature) -> bool {
        let share_key = self.polynomial.evaluate(partial.index).value;
        verify_pairing(&share_key, blinded_message, &partial.value)
    }
}

// =============================================================================
// TRUSTED DEALER
// =============================================================================

/// Output of trusted-dealer key generation.
#[derive(Debug)]
pub struct DealtKey {
    pub public_key: G2,
    pub polynomial: Public,
    pub shares: Vec<KeyShare>,
}

impl DealtKey {
    /// Public configuration entry for this key at `version`.
    pub fn info(&self, version: u32) -> KeyVersionInfo {
        KeyVersionInfo {
            version,
            threshold: self.polynomial.degree_plus_one(),
            public_key: hex::encode(self.public_key.to_bytes()),
            polynomial: hex::encode(self.polynomial.to_bytes()),
        }
    }
}

/// Generates a `t`-of-`n` key with a trusted dealer.
///
/// Intended for development networks and tests.
pub fn generate_shares<R: RngCore>(
    threshold: u32,
    signers: u32,
    rng: &mut R,
) -> Result<DealtKey, CryptoError> {
    if threshold == 0 || threshold > signers {
        return Err(CryptoError::InvalidParameters(format!(
            "threshold {threshold} must be in 1..={signers}"
        )));
    }

    let secret = Private::random(threshold, rng);
    let polynomial = secret.commit();
    let shares = (0..signers)
        .map(|index| KeyShare::new(index, secret.evaluate(index).value))
        .collect();

    Ok(DealtKey {
        public_key: *polynomial.constant(),
        polynomial,
        shares,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::thread_rng;

    #[test]
    fn test_generate_shares_bounds() {
        let mut rng = thread_rng();
        assert!(generate_shares(0, 3, &mut rng).is_err());
        assert!(generate_shares(4, 3, &mut rng).is_err());
        let dealt = generate_shares(2, 3, &mut rng).unwrap();
        assert_eq!(dealt.shares.len(), 3);
        assert_eq!(dealt.shares[2].index, 2);
    }

    #[test]
    fn test_share_hex_roundtrip() {
        let dealt = generate_shares(2, 3, &mut thread_rng()).unwrap();
        let share = &dealt.shares[1];
        let encoded = share.to_hex();
        assert_eq!(encoded.len(), 2 * (INDEX_LENGTH + SCALAR_LENGTH));
        assert!(encoded.starts_with("00000001"));
        assert_eq!(&KeyShare::from_hex(&encoded).unwrap(), share);
    }

    #[test]
    fn test_key_info_cross_checks() {
        let mut rng = thread_rng();
        let dealt = generate_shares(2, 3, &mut rng).unwrap();
        let info = dealt.info(1);
        let key = ThresholdKey::from_info(&info).unwrap();
        assert_eq!(key.threshold, 2);

        let mut wrong_threshold = info.clone();
        wrong_threshold.threshold = 3;
        assert!(ThresholdKey::from_info(&wrong_threshold).is_err());

        let other = generate_shares(2, 3, &mut rng).unwrap();
        let mut wrong_key = info;
        wrong_key.public_key = hex::encode(other.public_key.to_bytes());
        assert!(ThresholdKey::from_info(&wrong_key).is_err());
    }

    #[test]
    fn test_verify_share() {
        let dealt = generate_shares(2, 3, &mut thread_rng()).unwrap();
        let key = ThresholdKey::from_info(&dealt.info(1)).unwrap();
        let blinded = G1::hash_to_curve(b"blinded");

        let partial = dealt.shares[0].partial_sign(&blinded);
        assert!(key.verify_share(&blinded, &partial));

        // right signature, wrong claimed index
        let relabelled = PartialSignature {
            index: 1,
            value: partial.value,
        };
        assert!(!key.verify_share(&blinded, &relabelled));
        assert_eq!(dealt.shares[0].public(), key.polynomial.evaluate(0).value);
    }

    #[test]
    fn test_partial_signature_encoding() {
        let dealt = generate_shares(1, 1, &mut thread_rng()).unwrap();
        let partial = dealt.shares[0].partial_sign(&G1::hash_to_curve(b"m"));
        let decoded = PartialSignature::from_hex(&partial.to_hex()).unwrap();
        assert_eq!(decoded, partial);
        assert!(PartialSignature::from_bytes(&[0u8; 10]).is_err());
    }
}
