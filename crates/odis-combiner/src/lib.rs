//! # ODIS Combiner
//!
//! Client-facing front door. Each request is checked, fanned out to every
//! signer of its keyspace, and resolved once a threshold of signers agree.
//!
//! ## Architecture
//!
//! - [`pipeline`]: front-door checks and the PNP and domain policies
//! - [`client`]: HTTP calls to signers and response classification
//! - [`session`]: one fan-out, early termination and failure majority
//! - [`threshold`]: counter reconciliation across signers
//! - [`service`]: router and server loop
//!
//! ## Endpoints
//!
//! | Route | Signer route | Flow |
//! |-------|--------------|------|
//! | `POST /sign` | `/sign` | PNP sign |
//! | `POST /quotaStatus` | `/quotaStatus` | PNP quota |
//! | `POST /getBlindedMessageSig` | `/getBlindedMessagePartialSig` | legacy PNP sign |
//! | `POST /getQuota` | `/getQuota` | legacy PNP quota |
//! | `POST /domain/sign` | `/domain/sign` | domain sign |
//! | `POST /domain/quotaStatus` | `/domain/quotaStatus` | domain quota |
//! | `POST /domain/disable` | `/domain/disable` | domain disable |
//! | `GET /status` | | version |
//! | `GET /metrics` | | Prometheus exposition |

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod threshold;

pub use client::{SignerClient, SignerResponse};
pub use config::CombinerConfig;
pub use service::{CombinerError, CombinerService, CombinerState};
