//! # ODIS Test Suite
//!
//! End-to-end tests over real sockets: `n` in-process signers behind one
//! combiner, each signer with its own store and chain view.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! ├── harness.rs        # Cluster builder and request helpers
//! └── integration/
//!     ├── pnp_flows.rs      # Signing, quota reconciliation, replay
//!     ├── domain_flows.rs   # Rate limiting, nonces, disable
//!     └── fault_tolerance.rs# Offline and hanging signers
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p odis-tests
//! cargo test -p odis-tests integration::fault_tolerance::
//! ```

pub mod harness;
pub mod integration;
