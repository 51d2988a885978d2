//! # Blinding
//!
//! Client-side helpers: blind a message before sending it to ODIS, unblind
//! the threshold signature, and verify the result.

use super::errors::CryptoError;
use super::group::{GroupElement, Scalar, DST_G1, G1, G2};
use blst::min_sig::{PublicKey, Signature};
use blst::BLST_ERROR;
use rand::RngCore;
use zeroize::Zeroize;

/// A blinded message together with the factor needed to unblind.
pub struct BlindedMessage {
    pub point: G1,
    factor: Scalar,
}

impl Drop for BlindedMessage {
    fn drop(&mut self) {
        self.factor.zeroize();
    }
}

impl BlindedMessage {
    /// Hex encoding of the blinded point, as sent on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.point.to_bytes())
    }

    /// Removes the blinding factor: `σ = r⁻¹ · σ_B`.
    pub fn unblind(&self, blinded_signature: &G1) -> G1 {
        let mut signature = *blinded_signature;
        // factor is sampled non-zero
        if let Some(inverse) = self.factor.inverse() {
            signature.mul_assign(&inverse);
        }
        signature
    }

    /// Decodes a hex combined signature and unblinds it.
    pub fn unblind_hex(&self, blinded_signature: &str) -> Result<G1, CryptoError> {
        let bytes = hex::decode(blinded_signature.trim_start_matches("0x"))?;
        Ok(self.unblind(&G1::from_bytes(&bytes)?))
    }
}

/// Blinds `message` as `r · H(m)` with a fresh random `r`.
pub fn blind<R: RngCore>(message: &[u8], rng: &mut R) -> BlindedMessage {
    let factor = Scalar::random(rng);
    let mut point = G1::hash_to_curve(message);
    point.mul_assign(&factor);
    BlindedMessage { point, factor }
}

/// Decodes a hex-encoded blinded message.
pub fn decode_blinded_message(encoded: &str) -> Result<G1, CryptoError> {
    G1::from_bytes(&hex::decode(encoded.trim_start_matches("0x"))?)
}

/// Verifies an unblinded signature against the group public key.
pub fn verify_signature(public_key: &G2, message: &[u8], signature: &G1) -> bool {
    let Ok(sig) = Signature::from_bytes(&signature.to_bytes()) else {
        return false;
    };
    let Ok(pk) = PublicKey::from_bytes(&public_key.to_bytes()) else {
        return false;
    };
    sig.verify(true, message, DST_G1, &[], &pk, true) == BLST_ERROR::BLST_SUCCESS
}
