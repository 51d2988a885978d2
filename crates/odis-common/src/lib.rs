//! # ODIS Common
//!
//! Building blocks shared by the ODIS signer, combiner and operator tools.
//!
//! ## Modules
//!
//! - [`crypto`]: threshold BLS over BLS12-381 (shares, combination, blinding)
//! - [`auth`]: PNP request authentication (DEK and wallet key)
//! - [`domain`]: sequential delay domains, domain hashing and request authenticity
//! - [`chain`]: read-only chain-state port, JSON-RPC and static adapters, retry
//! - [`wire`]: JSON bodies and endpoint routes
//! - [`errors`]: the error and warning code taxonomy
//! - [`key_version`]: key rotation support
//! - [`http`]: the request guard shared by both services
//!
//! ## Security Notes
//!
//! - All `unsafe` is confined to `crypto::group` (blst FFI)
//! - Deserialised curve points are subgroup-checked
//! - Key shares are zeroized on drop and redacted from `Debug`

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod auth;
pub mod chain;
pub mod crypto;
pub mod domain;
pub mod ecdsa;
pub mod errors;
pub mod http;
pub mod key_version;
pub mod wire;

pub use auth::{authenticate_user, AuthOutcome};
pub use chain::{ChainState, ChainStateError};
pub use errors::{ErrorMessage, ErrorType, OdisError, WarningMessage};
pub use key_version::{KeyRing, KeyVersionInfo, KEY_VERSION_HEADER};

/// Current time in unix seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
