//! # Crypto Errors

use thiserror::Error;

/// Errors raised by the threshold BLS primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// Byte string of the wrong size for the element being decoded
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Not valid hex
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Point failed decompression, is the identity, or is outside the subgroup
    #[error("Invalid curve point")]
    InvalidPoint,

    /// Scalar not in canonical range
    #[error("Invalid scalar")]
    InvalidScalar,

    /// Share failed the pairing check against the verification polynomial
    #[error("Invalid partial signature from index {index}")]
    InvalidPartialSignature { index: u32 },

    /// combine() called before enough shares were added
    #[error("Insufficient shares: need {required}, have {have}")]
    InsufficientShares { required: u32, have: u32 },

    /// Interpolation produced no valid signature
    #[error("Signature aggregation failed: {0}")]
    AggregationFailure(String),

    /// Threshold or polynomial parameters are inconsistent
    #[error("Invalid threshold parameters: {0}")]
    InvalidParameters(String),
}

impl From<hex::FromHexError> for CryptoError {
    fn from(err: hex::FromHexError) -> Self {
        Self::InvalidHex(err.to_string())
    }
}
