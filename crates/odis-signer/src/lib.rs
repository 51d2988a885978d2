//! # ODIS Signer
//!
//! One replica holding a share of each threshold key. The combiner fans
//! requests out to every signer and combines their partial signatures.
//!
//! ## Architecture
//!
//! - [`pipeline`]: the per-endpoint request pipeline and its PNP and
//!   domain policies
//! - [`quota`]: PNP quota from on-chain payments and stored counters
//! - [`limiter`]: the sequential delay state transition
//! - [`store`]: persisted counters, replay records and domain state
//! - [`keystore`]: versioned key shares
//! - [`service`]: router and server loop
//!
//! ## Endpoints
//!
//! | Route | Flow |
//! |-------|------|
//! | `POST /sign` | PNP sign |
//! | `POST /quotaStatus` | PNP quota |
//! | `POST /getBlindedMessagePartialSig` | legacy PNP sign |
//! | `POST /getQuota` | legacy PNP quota |
//! | `POST /domain/sign` | domain sign |
//! | `POST /domain/quotaStatus` | domain quota |
//! | `POST /domain/disable` | domain disable |
//! | `GET /status` | version |
//! | `GET /metrics` | Prometheus exposition |

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod config;
pub mod keystore;
pub mod limiter;
pub mod pipeline;
pub mod quota;
pub mod service;
pub mod store;

pub use config::SignerConfig;
pub use service::{SignerError, SignerService, SignerState};
pub use store::{MemoryStore, SignerStore};
