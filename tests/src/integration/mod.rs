//! Cross-service flows through the combiner.

pub mod domain_flows;
pub mod fault_tolerance;
pub mod pnp_flows;
