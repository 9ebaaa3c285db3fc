//! Experience level table.
//!
//! Mirrors the thresholds the backend uses so the profile view can render an
//! experience bar without an extra round trip.

/// Experience needed to reach each level (index 0 = level 1).
pub const LEVEL_THRESHOLDS: [u32; 29] = [
    0, 50, 120, 210, 320, 450, 600, 760, 930, 1110, 1300, 1500, 1710, 1930, 2160, 2400, 2650,
    2910, 3180, 3460, 3750, 4050, 4360, 4680, 5010, 5350, 5700, 6060, 6430,
];

/// Highest reachable level.
pub const MAX_LEVEL: u32 = LEVEL_THRESHOLDS.len() as u32;

/// Level for a given amount of experience.
pub fn level_for(exp: u32) -> u32 {
    LEVEL_THRESHOLDS
        .iter()
        .rposition(|&threshold| exp >= threshold)
        .map(|index| index as u32 + 1)
        .unwrap_or(1)
}

/// Experience required for the next level. At the max level this is the
/// max level's own threshold.
pub fn exp_for_next(exp: u32) -> u32 {
    let level = level_for(exp) as usize;
    if level == LEVEL_THRESHOLDS.len() {
        LEVEL_THRESHOLDS[level - 1]
    } else {
        LEVEL_THRESHOLDS[level]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_boundaries() {
        assert_eq!(level_for(0), 1);
        assert_eq!(level_for(49), 1);
        assert_eq!(level_for(50), 2);
        assert_eq!(level_for(6429), 28);
        assert_eq!(level_for(6430), MAX_LEVEL);
        assert_eq!(level_for(u32::MAX), MAX_LEVEL);
    }

    #[test]
    fn test_exp_for_next() {
        assert_eq!(exp_for_next(0), 50);
        assert_eq!(exp_for_next(60), 120);
        assert_eq!(exp_for_next(9000), 6430);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Level never decreases as experience grows.
        #[test]
        fn prop_level_monotonic(a in 0u32..10_000, b in 0u32..10_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(level_for(lo) <= level_for(hi));
        }

        /// The next threshold is never below the current experience, except at max level.
        #[test]
        fn prop_next_threshold_ahead(exp in 0u32..6430) {
            prop_assert!(exp_for_next(exp) > exp);
        }
    }
}
