//! # ODIS Admin
//!
//! Operator CLI for an ODIS deployment.
//!
//! - `keygen`: deal a `t`-of-`n` key and write signer and combiner config
//!   fragments
//! - `status`: probe a combiner or signer
//! - `quota`: PNP quota of a wallet account
//! - `sign`: blind a message, have the combiner sign it, unblind and verify

pub mod api;
pub mod keygen;
pub mod wallet;
