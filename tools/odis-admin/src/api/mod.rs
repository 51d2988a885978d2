//! Client for the combiner endpoints the operator CLI calls.

mod client;

pub use client::{ApiError, CombinerClient, SignReply};
