//! # Threshold State
//!
//! Reconciles the counters reported by individual signers into the one
//! figure the combiner returns. Both rules tolerate up to `t - 1`
//! signers that under-report usage.
//!
//! - PNP: the `t`-th smallest `performedQueryCount`, with `totalQuota`
//!   and `blockNumber` from the same response
//! - Domains: among enabled states, the `t`-th largest `counter` and
//!   `timer`

use crate::config::DiscrepancyConfig;
use odis_common::wire::domain::DomainState;
use odis_common::wire::pnp::PnpQuotaStatus;
use odis_common::{ErrorType, WarningMessage};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ThresholdError {
    #[error("{have} signer responses, {required} required")]
    InsufficientResponses { have: usize, required: usize },
}

fn require(have: usize, threshold: usize) -> Result<(), ThresholdError> {
    if threshold == 0 || have < threshold {
        return Err(ThresholdError::InsufficientResponses {
            have,
            required: threshold,
        });
    }
    Ok(())
}

fn spread(values: impl Iterator<Item = u64>) -> u64 {
    let (min, max) = values.fold((u64::MAX, 0), |(lo, hi), v| (lo.min(v), hi.max(v)));
    max.saturating_sub(min)
}

/// Reconciled PNP counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PnpThreshold {
    pub quota: PnpQuotaStatus,
    pub warnings: Vec<ErrorType>,
    /// Largest minus smallest reported `totalQuota`
    pub total_quota_spread: u64,
}

impl PnpThreshold {
    pub fn total_quota_exceeds(&self, limits: &DiscrepancyConfig) -> bool {
        self.total_quota_spread > limits.max_total_quota_discrepancy
    }
}

pub fn pnp_threshold_state(
    statuses: &[PnpQuotaStatus],
    threshold: usize,
    limits: &DiscrepancyConfig,
) -> Result<PnpThreshold, ThresholdError> {
    require(statuses.len(), threshold)?;

    let mut sorted = statuses.to_vec();
    sorted.sort_by_key(|status| status.performed_query_count);
    let trusted = sorted[threshold - 1];

    let mut warnings = Vec::new();
    let total_quota_spread = spread(sorted.iter().map(|s| s.total_quota));
    if total_quota_spread > 0 {
        warnings.push(WarningMessage::InconsistentSignerQuotaMeasurements.into());
    }
    if spread(sorted.iter().map(|s| s.performed_query_count)) > limits.max_query_count_discrepancy {
        warnings.push(WarningMessage::InconsistentSignerQueryMeasurements.into());
    }
    let blocks: Vec<u64> = sorted.iter().filter_map(|s| s.block_number).collect();
    if !blocks.is_empty() && spread(blocks.iter().copied()) > limits.max_block_discrepancy {
        warnings.push(WarningMessage::InconsistentSignerBlockNumbers.into());
    }

    Ok(PnpThreshold {
        quota: trusted,
        warnings,
        total_quota_spread,
    })
}

/// Reconciled domain state plus warnings.
pub fn domain_threshold_state(
    states: &[DomainState],
    threshold: usize,
) -> Result<(DomainState, Vec<ErrorType>), ThresholdError> {
    require(states.len(), threshold)?;

    let mut warnings = Vec::new();
    let enabled: Vec<&DomainState> = states.iter().filter(|s| !s.disabled).collect();
    if !enabled.is_empty() && enabled.len() != states.len() {
        warnings.push(WarningMessage::InconsistentSignerDomainDisabledStates.into());
    }
    let now = states.iter().map(|s| s.now).max().unwrap_or(0);

    if enabled.len() < threshold {
        return Ok((
            DomainState {
                counter: 0,
                timer: 0,
                disabled: true,
                now,
            },
            warnings,
        ));
    }

    let k = enabled.len() - threshold;
    let mut counters: Vec<u64> = enabled.iter().map(|s| s.counter).collect();
    let mut timers: Vec<u64> = enabled.iter().map(|s| s.timer).collect();
    counters.sort_unstable();
    timers.sort_unstable();

    Ok((
        DomainState {
            counter: counters[k],
            timer: timers[k],
            disabled: false,
            now,
        },
        warnings,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn quota(count: u64, total: u64, block: Option<u64>) -> PnpQuotaStatus {
        PnpQuotaStatus {
            performed_query_count: count,
            total_quota: total,
            block_number: block,
        }
    }

    fn domain(counter: u64, timer: u64, disabled: bool) -> DomainState {
        DomainState {
            counter,
            timer,
            disabled,
            now: 100,
        }
    }

    #[test]
    fn test_pnp_takes_threshold_smallest() {
        let limits = DiscrepancyConfig::default();
        let state = pnp_threshold_state(
            &[quota(9, 20, Some(1)), quota(1, 20, Some(1)), quota(4, 20, Some(2))],
            2,
            &limits,
        )
        .unwrap();
        assert_eq!(state.quota.performed_query_count, 4);
        assert_eq!(state.quota.block_number, Some(2));
        // 9 - 1 exceeds the query count limit
        assert_eq!(
            state.warnings,
            vec![WarningMessage::InconsistentSignerQueryMeasurements.into()]
        );
    }

    #[test]
    fn test_pnp_total_quota_from_trusted_response() {
        let limits = DiscrepancyConfig::default();
        let state = pnp_threshold_state(
            &[quota(2, 12, None), quota(3, 10, None), quota(5, 11, None)],
            2,
            &limits,
        )
        .unwrap();
        assert_eq!(state.quota.total_quota, 10);
        assert_eq!(state.total_quota_spread, 2);
        assert!(!state.total_quota_exceeds(&limits));
        assert!(state
            .warnings
            .contains(&WarningMessage::InconsistentSignerQuotaMeasurements.into()));

        let wide = pnp_threshold_state(&[quota(1, 10, None), quota(1, 16, None)], 2, &limits)
            .unwrap();
        assert!(wide.total_quota_exceeds(&limits));
    }

    #[test]
    fn test_pnp_block_discrepancy() {
        let limits = DiscrepancyConfig::default();
        let state = pnp_threshold_state(
            &[quota(1, 10, Some(100)), quota(1, 10, Some(104)), quota(1, 10, None)],
            2,
            &limits,
        )
        .unwrap();
        assert_eq!(
            state.warnings,
            vec![WarningMessage::InconsistentSignerBlockNumbers.into()]
        );
    }

    #[test]
    fn test_pnp_insufficient() {
        assert_eq!(
            pnp_threshold_state(&[quota(1, 1, None)], 2, &DiscrepancyConfig::default()),
            Err(ThresholdError::InsufficientResponses {
                have: 1,
                required: 2
            })
        );
    }

    #[test]
    fn test_domain_takes_threshold_largest() {
        let (state, warnings) = domain_threshold_state(
            &[domain(3, 50, false), domain(7, 10, false), domain(5, 30, false)],
            2,
        )
        .unwrap();
        assert_eq!(state.counter, 5);
        assert_eq!(state.timer, 30);
        assert!(!state.disabled);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_domain_disabled_below_threshold() {
        let (state, warnings) = domain_threshold_state(
            &[domain(3, 50, true), domain(7, 10, false), domain(5, 30, true)],
            2,
        )
        .unwrap();
        assert!(state.disabled);
        assert_eq!(
            warnings,
            vec![WarningMessage::InconsistentSignerDomainDisabledStates.into()]
        );

        let (all, warnings) =
            domain_threshold_state(&[domain(0, 0, true), domain(0, 0, true)], 2).unwrap();
        assert!(all.disabled);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_domain_mixed_but_enough_enabled() {
        let (state, warnings) = domain_threshold_state(
            &[domain(2, 5, false), domain(4, 6, false), domain(0, 0, true)],
            2,
        )
        .unwrap();
        assert!(!state.disabled);
        assert_eq!(state.counter, 2);
        assert_eq!(warnings.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_pnp_selection_is_threshold_smallest(
            counts in proptest::collection::vec(0u64..1000, 1..9),
            t in 1usize..9,
        ) {
            prop_assume!(t <= counts.len());
            let statuses: Vec<_> = counts.iter().map(|c| quota(*c, 5000, None)).collect();
            let state = pnp_threshold_state(&statuses, t, &DiscrepancyConfig::default()).unwrap();
            let chosen = state.quota.performed_query_count;
            let below = counts.iter().filter(|c| **c < chosen).count();
            let at_or_below = counts.iter().filter(|c| **c <= chosen).count();
            prop_assert!(below < t);
            prop_assert!(at_or_below >= t);
        }

        #[test]
        fn prop_domain_counter_backed_by_threshold(
            counters in proptest::collection::vec(0u64..1000, 1..9),
            t in 1usize..9,
        ) {
            prop_assume!(t <= counters.len());
            let states: Vec<_> = counters.iter().map(|c| domain(*c, 0, false)).collect();
            let (state, _) = domain_threshold_state(&states, t).unwrap();
            // at least t signers report a counter this high
            let at_or_above = counters.iter().filter(|c| **c >= state.counter).count();
            prop_assert!(at_or_above >= t);
            let above = counters.iter().filter(|c| **c > state.counter).count();
            prop_assert!(above < t);
        }
    }
}
