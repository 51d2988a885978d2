//! # Sequential Delay Limiter
//!
//! Pure state transition for sequential delay domains. Persistence and
//! nonce handling live in the domain pipeline.

use odis_common::domain::SequentialDelayStage;
use thiserror::Error;

/// Limiter state of one domain instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimiterState {
    pub counter: u64,
    pub timer: u64,
    pub disabled: bool,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum LimiterError {
    #[error("domain is disabled")]
    Disabled,

    /// Retry at or after `not_before`
    #[error("too soon, retry at {not_before}")]
    TooSoon { not_before: u64 },

    /// Every stage has been used up
    #[error("domain quota exhausted")]
    Exhausted,
}

/// Stage applying to the next request and the position inside it.
fn locate(stages: &[SequentialDelayStage], counter: u64) -> Option<(&SequentialDelayStage, u64)> {
    let mut remaining = counter;
    for stage in stages {
        let capacity = stage.capacity();
        if remaining < capacity {
            return Some((stage, remaining));
        }
        remaining -= capacity;
    }
    None
}

/// Admits one request at `attempt_time`, returning the state to persist.
pub fn check(
    stages: &[SequentialDelayStage],
    state: &LimiterState,
    attempt_time: u64,
) -> Result<LimiterState, LimiterError> {
    if state.disabled {
        return Err(LimiterError::Disabled);
    }
    let (stage, stage_counter) = locate(stages, state.counter).ok_or(LimiterError::Exhausted)?;

    // only the first request of a batch waits
    let delay = if stage_counter % stage.batch_size() == 0 {
        stage.delay
    } else {
        0
    };
    let not_before = state.timer.saturating_add(delay);
    if attempt_time < not_before {
        return Err(LimiterError::TooSoon { not_before });
    }

    Ok(LimiterState {
        counter: state.counter + 1,
        timer: if stage.reset_timer() {
            attempt_time
        } else {
            not_before
        },
        disabled: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stage(delay: u64, reset_timer: bool, batch_size: u32, repetitions: u32) -> SequentialDelayStage {
        SequentialDelayStage {
            delay,
            reset_timer: Some(reset_timer),
            batch_size: Some(batch_size),
            repetitions: Some(repetitions),
        }
    }

    fn state(counter: u64, timer: u64) -> LimiterState {
        LimiterState {
            counter,
            timer,
            disabled: false,
        }
    }

    #[test]
    fn test_disabled() {
        let disabled = LimiterState {
            disabled: true,
            ..LimiterState::default()
        };
        assert_eq!(
            check(&[stage(0, true, 1, 1)], &disabled, 100),
            Err(LimiterError::Disabled)
        );
    }

    #[test]
    fn test_delay_then_accept() {
        let stages = [stage(10, true, 1, 1), stage(20, true, 1, 1)];
        let first = check(&stages, &state(0, 0), 10).unwrap();
        assert_eq!(first, state(1, 10));

        assert_eq!(
            check(&stages, &first, 29),
            Err(LimiterError::TooSoon { not_before: 30 })
        );
        assert_eq!(check(&stages, &first, 30).unwrap(), state(2, 30));
        assert_eq!(
            check(&stages, &state(2, 30), 1000),
            Err(LimiterError::Exhausted)
        );
    }

    #[test]
    fn test_batch_members_skip_delay() {
        let stages = [stage(60, true, 3, 1)];
        let s1 = check(&stages, &state(0, 0), 60).unwrap();
        // second and third requests of the batch go straight through
        let s2 = check(&stages, &s1, 60).unwrap();
        let s3 = check(&stages, &s2, 61).unwrap();
        assert_eq!(s3.counter, 3);
        assert_eq!(check(&stages, &s3, 62), Err(LimiterError::Exhausted));
    }

    #[test]
    fn test_no_reset_keeps_schedule() {
        let stages = [stage(10, false, 1, 3)];
        let s1 = check(&stages, &state(0, 100), 150).unwrap();
        // timer advances to the scheduled slot, not the attempt time
        assert_eq!(s1.timer, 110);
        let s2 = check(&stages, &s1, 120).unwrap();
        assert_eq!(s2.timer, 120);
        assert_eq!(
            check(&stages, &s2, 125),
            Err(LimiterError::TooSoon { not_before: 130 })
        );
    }

    #[test]
    fn test_repetitions_extend_stage() {
        let stages = [stage(5, true, 2, 2), stage(100, true, 1, 1)];
        assert_eq!(locate(&stages, 3).map(|(s, c)| (s.delay, c)), Some((5, 3)));
        assert_eq!(locate(&stages, 4).map(|(s, c)| (s.delay, c)), Some((100, 0)));
        assert!(locate(&stages, 5).is_none());
    }

    proptest! {
        #[test]
        fn prop_admission_is_monotonic(
            delays in proptest::collection::vec(0u64..50, 1..5),
            gaps in proptest::collection::vec(0u64..80, 1..20),
        ) {
            let stages: Vec<_> = delays.iter().map(|d| stage(*d, true, 2, 1)).collect();
            let mut current = state(0, 0);
            let mut now = 0u64;
            for gap in gaps {
                now += gap;
                if let Ok(next) = check(&stages, &current, now) {
                    prop_assert_eq!(next.counter, current.counter + 1);
                    prop_assert!(next.timer >= current.timer);
                    prop_assert!(next.timer <= now);
                    current = next;
                }
            }
            let capacity: u64 = stages.iter().map(|s| s.capacity()).sum();
            prop_assert!(current.counter <= capacity);
        }
    }
}
