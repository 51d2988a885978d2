//! # secp256k1 Helpers
//!
//! Address recovery for wallet-key and domain signatures, and DER
//! verification for data-encryption-key signatures.

use crate::wire::Address;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha2::Sha256;
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// Errors from signature parsing and recovery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EcdsaError {
    /// Not hex, wrong length, or not a valid r/s pair
    #[error("Invalid signature format")]
    InvalidFormat,

    /// v must be 0, 1, 27 or 28
    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    #[error("Failed to recover public key")]
    RecoveryFailed,

    #[error("Invalid public key")]
    InvalidPublicKey,

    #[error("Invalid private key")]
    InvalidPrivateKey,
}

pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// `keccak256("\x19Ethereum Signed Message:\n" ‖ len ‖ message)`.
pub fn personal_message_hash(message: &[u8]) -> [u8; 32] {
    let mut payload = format!("\x19Ethereum Signed Message:\n{}", message.len()).into_bytes();
    payload.extend_from_slice(message);
    keccak256(&payload)
}

/// Derives the Ethereum address of a public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    // skip the 0x04 tag
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}

fn parse_recovery_id(v: u8) -> Result<RecoveryId, EcdsaError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(EcdsaError::InvalidRecoveryId(v)),
    };
    RecoveryId::try_from(id).map_err(|_| EcdsaError::InvalidRecoveryId(v))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, EcdsaError> {
    hex::decode(value.trim().trim_start_matches("0x")).map_err(|_| EcdsaError::InvalidFormat)
}

/// Recovers the signer address from a hex `r ‖ s ‖ v` signature over a
/// 32-byte prehash.
pub fn recover_address(prehash: &[u8; 32], signature_hex: &str) -> Result<Address, EcdsaError> {
    let bytes = decode_hex(signature_hex)?;
    if bytes.len() != 65 {
        return Err(EcdsaError::InvalidFormat);
    }
    let recovery_id = parse_recovery_id(bytes[64])?;
    let signature = Signature::from_slice(&bytes[..64]).map_err(|_| EcdsaError::InvalidFormat)?;
    let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id)
        .map_err(|_| EcdsaError::RecoveryFailed)?;
    Ok(address_from_pubkey(&key))
}

/// Parses a SEC1 public key (compressed or uncompressed), hex encoded.
pub fn parse_public_key(public_key_hex: &str) -> Result<VerifyingKey, EcdsaError> {
    let bytes = decode_hex(public_key_hex)?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| EcdsaError::InvalidPublicKey)
}

/// Verifies a hex DER signature over a prehash.
///
/// High-S signatures are normalised first, matching what most signing
/// libraries accept.
pub fn verify_der_prehash(key: &VerifyingKey, prehash: &[u8], signature_hex: &str) -> bool {
    let Ok(bytes) = decode_hex(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_der(&bytes) else {
        return false;
    };
    let signature = signature.normalize_s().unwrap_or(signature);
    key.verify_prehash(prehash, &signature).is_ok()
}

/// Parses a hex private key.
pub fn parse_signing_key(private_key_hex: &str) -> Result<SigningKey, EcdsaError> {
    let bytes = decode_hex(private_key_hex)?;
    SigningKey::from_slice(&bytes).map_err(|_| EcdsaError::InvalidPrivateKey)
}

/// Signs a prehash, returning hex `r ‖ s ‖ v` with `v` in {27, 28}.
pub fn sign_recoverable(prehash: &[u8; 32], key: &SigningKey) -> Result<String, EcdsaError> {
    let (signature, recovery_id) = key
        .sign_prehash_recoverable(prehash)
        .map_err(|_| EcdsaError::InvalidFormat)?;
    let mut bytes = signature.to_bytes().to_vec();
    bytes.push(recovery_id.to_byte() + 27);
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// Signs a prehash, returning a hex DER signature.
pub fn sign_der(prehash: &[u8], key: &SigningKey) -> Result<String, EcdsaError> {
    let signature: Signature = key
        .sign_prehash(prehash)
        .map_err(|_| EcdsaError::InvalidFormat)?;
    Ok(hex::encode(signature.to_der().as_bytes()))
}

/// Wallet-key `Authorization` value for a request body.
pub fn sign_personal_message(body: &[u8], key: &SigningKey) -> Result<String, EcdsaError> {
    sign_recoverable(&personal_message_hash(body), key)
}

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers {
    use super::*;

    pub fn generate_keypair() -> (SigningKey, Address) {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let address = address_from_pubkey(signing_key.verifying_key());
        (signing_key, address)
    }

    pub fn sign_recoverable(prehash: &[u8; 32], key: &SigningKey) -> String {
        super::sign_recoverable(prehash, key).unwrap()
    }

    pub fn sign_der(prehash: &[u8], key: &SigningKey) -> String {
        super::sign_der(prehash, key).unwrap()
    }
}
