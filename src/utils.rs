//! Miscellaneous utilities shared across the estimators.
//!
//! A small wrapper around `rand` that draws uniform indices from half-open
//! ranges, plus the median and quality-ranking helpers used by the scoring
//! code.

use ordered_float::OrderedFloat;
use rand::prelude::*;

/// Uniform index generator.
///
/// By default this uses a randomly seeded RNG, but test code can construct
/// it from a fixed seed for reproducible behavior.
#[derive(Debug, Clone)]
pub struct UniformRandomGenerator {
    rng: StdRng,
}

impl Default for UniformRandomGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformRandomGenerator {
    /// Construct with a random seed (suitable for production use).
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Construct with a fixed seed (useful for tests).
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Draw an index uniformly from `[lo, hi)`. The range must be non-empty.
    pub fn next_in(&mut self, lo: usize, hi: usize) -> usize {
        self.rng.gen_range(lo..hi)
    }
}

/// Median of `values`, reordering them in place.
///
/// Even-length inputs average the two middle elements. Returns NaN for an
/// empty slice.
pub fn median_in_place(values: &mut [f64]) -> f64 {
    let n = values.len();
    if n == 0 {
        return f64::NAN;
    }

    let mid = n / 2;
    let (lower, upper, _) = values.select_nth_unstable_by(mid, f64::total_cmp);
    let upper = *upper;
    if n % 2 == 1 {
        return upper;
    }

    // The lower half holds every element ordered before `mid`; its maximum
    // is the other middle value.
    let lower_max = lower
        .iter()
        .copied()
        .max_by(f64::total_cmp)
        .unwrap_or(upper);
    0.5 * (lower_max + upper)
}

/// Sample indices ordered by descending quality score.
///
/// Ties keep their original relative order.
pub fn sorted_quality_indices(quality_scores: &[f64]) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..quality_scores.len()).collect();
    indices.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(quality_scores[i])));
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draws_stay_within_bounds() {
        let mut rng = UniformRandomGenerator::from_seed(1234);
        for _ in 0..1000 {
            let v = rng.next_in(3, 10);
            assert!((3..10).contains(&v));
        }
    }

    #[test]
    fn deterministic_with_same_seed() {
        let mut rng1 = UniformRandomGenerator::from_seed(42);
        let mut rng2 = UniformRandomGenerator::from_seed(42);

        let a1: Vec<usize> = (0..10).map(|_| rng1.next_in(0, 100)).collect();
        let a2: Vec<usize> = (0..10).map(|_| rng2.next_in(0, 100)).collect();

        assert_eq!(a1, a2);
    }

    #[test]
    fn median_of_odd_and_even_lengths() {
        let mut odd = [5.0, 1.0, 3.0];
        assert_eq!(median_in_place(&mut odd), 3.0);

        let mut even = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(median_in_place(&mut even), 2.5);

        let mut single = [7.0];
        assert_eq!(median_in_place(&mut single), 7.0);

        assert!(median_in_place(&mut []).is_nan());
    }

    #[test]
    fn quality_indices_sort_descending() {
        let scores = [0.2, 0.9, 0.5, 0.9];
        assert_eq!(sorted_quality_indices(&scores), vec![1, 3, 2, 0]);
    }
}
