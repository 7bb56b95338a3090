//! Weighted outcome selection for collapsing superposed pieces.

use qchess_types::GameError;

/// Total every weight set must add up to.
pub const WEIGHT_TOTAL: u32 = 100;

/// Check that `weights` is non-empty and sums to exactly [WEIGHT_TOTAL].
pub fn validate_distribution(weights: &[u8]) -> Result<(), GameError> {
    let sum: u32 = weights.iter().map(|w| *w as u32).sum();
    if weights.is_empty() || sum != WEIGHT_TOTAL {
        return Err(GameError::InvalidProbabilityDistribution);
    }
    Ok(())
}

/// Pick the index of the outcome `random` lands on.
///
/// `random` is reduced modulo 100 to `r`, and entry `i` wins when `r` is below the running total
/// of weights `0..=i`. The same inputs always select the same index.
pub fn resolve(weights: &[u8], random: u64) -> Result<usize, GameError> {
    validate_distribution(weights)?;
    let r = (random % WEIGHT_TOTAL as u64) as u32;
    let mut cumulative = 0u32;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += *weight as u32;
        if r < cumulative {
            return Ok(index);
        }
    }
    Err(GameError::InvalidProbabilityDistribution)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn boundaries_follow_cumulative_weights() {
        let weights = [30, 70];
        assert_eq!(resolve(&weights, 29), Ok(0));
        assert_eq!(resolve(&weights, 30), Ok(1));
        assert_eq!(resolve(&weights, 99), Ok(1));
        assert_eq!(resolve(&weights, 100), Ok(0));
        assert_eq!(resolve(&weights, 129), Ok(0));
        assert_eq!(resolve(&weights, 130), Ok(1));
        assert_eq!(resolve(&weights, u64::MAX), Ok(0)); // u64::MAX % 100 == 15
        assert_eq!(resolve(&weights, u64::MAX - 16), Ok(1));
    }

    #[test]
    fn zero_weight_entries_are_never_selected() {
        let weights = [0, 100, 0];
        for random in 0..200 {
            assert_eq!(resolve(&weights, random), Ok(1));
        }
    }

    #[test]
    fn malformed_distributions_are_rejected() {
        assert_eq!(
            resolve(&[], 0),
            Err(GameError::InvalidProbabilityDistribution)
        );
        assert_eq!(
            resolve(&[50, 49], 10),
            Err(GameError::InvalidProbabilityDistribution)
        );
        assert_eq!(
            resolve(&[60, 60], 10),
            Err(GameError::InvalidProbabilityDistribution)
        );
        assert_eq!(
            validate_distribution(&[255, 255]),
            Err(GameError::InvalidProbabilityDistribution)
        );
        assert_eq!(validate_distribution(&[100]), Ok(()));
    }

    /// Weight sets summing to 100, built from sorted cut points in `1..100`.
    fn arb_weights() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::btree_set(1u8..100, 0..8).prop_map(|cuts| {
            let mut weights = Vec::with_capacity(cuts.len() + 1);
            let mut previous = 0u8;
            for cut in cuts.into_iter().chain(std::iter::once(100)) {
                weights.push(cut - previous);
                previous = cut;
            }
            weights
        })
    }

    proptest! {
        #[test]
        fn prop_resolve_in_range_and_deterministic(
            weights in arb_weights(),
            random in any::<u64>(),
        ) {
            let first = resolve(&weights, random);
            let second = resolve(&weights, random);
            prop_assert_eq!(first.clone(), second);
            let index = first.expect("valid distribution");
            prop_assert!(index < weights.len());
            prop_assert!(weights[index] > 0, "selected entry must carry weight");
        }

        #[test]
        fn prop_resolve_rejects_wrong_totals(
            weights in prop::collection::vec(any::<u8>(), 0..8),
            random in any::<u64>(),
        ) {
            let sum: u32 = weights.iter().map(|w| *w as u32).sum();
            prop_assume!(sum != WEIGHT_TOTAL);
            prop_assert_eq!(
                resolve(&weights, random),
                Err(GameError::InvalidProbabilityDistribution)
            );
        }
    }
}
