//! Largest-remainder apportionment
//!
//! Splits an integer total across integer weights so that the parts sum to
//! the total exactly. Each part first gets the floor of its proportional
//! share; the leftover units go one each to the largest fractional
//! remainders, ties broken by position.

/// Split `total` in proportion to `weights`.
///
/// Returns all zeros when `total` or the weight sum is zero.
pub fn apportion(total: u64, weights: &[u64]) -> Vec<u64> {
    let sum: u128 = weights.iter().map(|w| u128::from(*w)).sum();
    if total == 0 || sum == 0 {
        return vec![0; weights.len()];
    }

    let mut parts = vec![0u64; weights.len()];
    let mut remainders: Vec<(usize, u128)> = Vec::with_capacity(weights.len());
    let mut distributed: u128 = 0;

    for (idx, weight) in weights.iter().enumerate() {
        if *weight == 0 {
            continue;
        }
        let numerator = u128::from(total) * u128::from(*weight);
        let base = numerator / sum;
        // base <= total, so it fits
        parts[idx] = base as u64;
        distributed += base;
        remainders.push((idx, numerator % sum));
    }

    // Fewer leftover units than non-zero weights
    let mut leftover = u128::from(total) - distributed;
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (idx, _) in remainders {
        if leftover == 0 {
            break;
        }
        parts[idx] += 1;
        leftover -= 1;
    }

    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_split() {
        assert_eq!(apportion(200, &[600, 400]), vec![120, 80]);
        assert_eq!(apportion(1_000_000, &[600, 400]), vec![600_000, 400_000]);
    }

    #[test]
    fn test_leftover_goes_to_largest_remainder() {
        // 100 * 1/3 = 33.33 each, one unit left over
        assert_eq!(apportion(100, &[1, 1, 1]), vec![34, 33, 33]);
        // 10 * (5/7, 2/7) = 7.14, 2.86 -> second has the larger remainder
        assert_eq!(apportion(10, &[5, 2]), vec![7, 3]);
    }

    #[test]
    fn test_sum_is_exact() {
        let weights = [333_333, 333_333, 333_334, 7, 1];
        for total in [1u64, 2, 99, 1_000_001, u64::MAX / 3] {
            let parts = apportion(total, &weights);
            assert_eq!(parts.iter().map(|p| u128::from(*p)).sum::<u128>(), u128::from(total));
        }
    }

    #[test]
    fn test_zero_weights_get_nothing() {
        assert_eq!(apportion(10, &[0, 3, 0]), vec![0, 10, 0]);
        assert_eq!(apportion(10, &[0, 0]), vec![0, 0]);
        assert_eq!(apportion(0, &[1, 2]), vec![0, 0]);
        assert!(apportion(10, &[]).is_empty());
    }

    #[test]
    fn test_part_never_exceeds_weight_when_total_below_sum() {
        let weights = [600, 400, 1];
        let parts = apportion(1_000, &weights);
        for (part, weight) in parts.iter().zip(weights.iter()) {
            assert!(part <= weight);
        }
    }
}
