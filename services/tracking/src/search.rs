//! Binary search over sorted timestamp arrays
//!
//! Both point-in-time queries reduce to one lookup over an entity's
//! non-decreasing `times` array; they differ only in which neighbour of the
//! target they accept.

/// Which sample a lookup selects for a target time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Rightmost sample with `time <= target`; nothing if the series starts
    /// after the target.
    AtOrBefore,
    /// Sample closest to the target, clamped at both ends. On a tie the
    /// earlier sample wins, and an exact hit on a run of equal timestamps
    /// selects the first of the run.
    Nearest,
}

/// Index into `times` (sorted, non-decreasing) chosen by `mode`, or `None`
/// when `times` is empty or nothing qualifies.
pub fn locate(times: &[i64], target: i64, mode: SearchMode) -> Option<usize> {
    let first = *times.first()?;
    let last = times.len() - 1;

    match mode {
        SearchMode::AtOrBefore => {
            let after = times.partition_point(|&t| t <= target);
            after.checked_sub(1)
        }
        SearchMode::Nearest => {
            if target <= first {
                return Some(0);
            }
            if target >= times[last] {
                return Some(last);
            }
            // first < target < times[last], so 0 < hi <= last
            let hi = times.partition_point(|&t| t < target);
            if times[hi] == target {
                return Some(hi);
            }
            let lo = hi - 1;
            let before = target.abs_diff(times[lo]);
            let after = times[hi].abs_diff(target);
            Some(if before <= after { lo } else { hi })
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn sorted_times() -> impl Strategy<Value = Vec<i64>> {
        proptest::collection::vec(-1_000i64..1_000, 1..64).prop_map(|mut v| {
            v.sort();
            v
        })
    }

    proptest! {
        #[test]
        fn prop_at_or_before_is_rightmost_not_after(times in sorted_times(), target in -1_200i64..1_200) {
            match locate(&times, target, SearchMode::AtOrBefore) {
                None => prop_assert!(times[0] > target),
                Some(i) => {
                    prop_assert!(times[i] <= target);
                    prop_assert!(i + 1 == times.len() || times[i + 1] > target);
                }
            }
        }

        #[test]
        fn prop_nearest_is_minimal_and_earliest(times in sorted_times(), target in -1_200i64..1_200) {
            let i = locate(&times, target, SearchMode::Nearest).unwrap();
            let best = times.iter().map(|t| t.abs_diff(target)).min().unwrap();
            prop_assert_eq!(times[i].abs_diff(target), best);
            // Among equally close timestamps the earlier one wins
            prop_assert!(times
                .iter()
                .filter(|t| t.abs_diff(target) == best)
                .all(|t| *t >= times[i]));
            if times[i] == target {
                prop_assert!(i == 0 || times[i - 1] < target);
            }
        }
    }
}
