//! # Threshold BLS
//!
//! BLS12-381 threshold signatures with signatures in G1 and keys in G2.
//!
//! - `group`: field and curve element wrappers
//! - `poly`: secret and commitment polynomials, Lagrange recovery
//! - `keys`: key shares, partial signatures, per-version public material
//! - `client`: share accumulation and combination for one request
//! - `blinding`: client-side blind/unblind/verify

pub mod blinding;
pub mod client;
pub mod errors;
pub mod group;
pub mod keys;
pub mod poly;

pub use blinding::{blind, decode_blinded_message, verify_signature, BlindedMessage};
pub use client::ThresholdCryptoClient;
pub use errors::CryptoError;
pub use group::{G1, G2};
pub use keys::{generate_shares, DealtKey, KeyShare, PartialSignature, ThresholdKey};
