//! Adaptive iteration budgets and termination criteria.
//!
//! The consensus-style policies recompute their iteration budget whenever
//! the best inlier ratio improves, using the standard formula
//! `k = log(1 - confidence) / log(1 - inlier_ratio^subset_size)`.
//! The progressive policies additionally track a termination length `n*`
//! chosen by the non-randomness and maximality criteria.

use crate::settings::CHI_SQUARED;

/// Number of iterations needed to draw at least one all-inlier subset of
/// `subset_size` samples with probability `confidence`, when a sample is an
/// inlier with probability `inlier_ratio`.
///
/// Saturates to `usize::MAX` when `inlier_ratio^subset_size` or
/// `log(1 - inlier_ratio^subset_size)` is numerically zero or NaN. Never
/// returns less than one.
pub fn required_iterations(confidence: f64, inlier_ratio: f64, subset_size: usize) -> usize {
    let p_all_inliers = inlier_ratio.powi(subset_size as i32);
    if p_all_inliers.abs() < f64::MIN_POSITIVE || p_all_inliers.is_nan() {
        return usize::MAX;
    }

    let log_some_outliers = (1.0 - p_all_inliers).ln();
    if log_some_outliers.abs() < f64::MIN_POSITIVE || log_some_outliers.is_nan() {
        return usize::MAX;
    }

    let iterations = ((1.0 - confidence).ln() / log_some_outliers).abs().ceil();
    // `as` saturates infinities to usize::MAX.
    (iterations as usize).max(1)
}

/// Worst-case global draw budget `T_N` of the progressive policies: the
/// iterations required when the outlier proportion is
/// `max_outliers_proportion`, capped at `max_iterations`.
pub fn worst_case_iterations(
    confidence: f64,
    max_outliers_proportion: f64,
    subset_size: usize,
    max_iterations: usize,
) -> usize {
    required_iterations(confidence, 1.0 - max_outliers_proportion, subset_size).min(max_iterations)
}

/// Minimum number of inliers among the top `n` samples for a model to be
/// considered non-random, `Imin(n)`.
///
/// Uses the normal approximation to the binomial distribution of inliers
/// supporting an incorrect model, `B(n, beta)`, with a chi-squared cut at
/// a 10% tail.
pub fn non_random_inliers(subset_size: usize, n: usize, beta: f64) -> usize {
    let n = n as f64;
    let mu = n * beta;
    let sigma = (n * beta * (1.0 - beta)).sqrt();
    (subset_size as f64 + mu + sigma * CHI_SQUARED.sqrt()).ceil() as usize
}

/// Termination length state of the progressive policies.
///
/// Tracks the window size `n*` with the highest inlier ratio that passes
/// the non-randomness test, the inliers counted within it, and the number of
/// draws `k(n*)` needed before the maximality criterion is met.
#[derive(Debug, Clone)]
pub struct TerminationLength {
    subset_size: usize,
    eta0: f64,
    max_draws: usize,
    /// `Imin(n)` indexed by `n`.
    non_random: Vec<usize>,
    n_star: usize,
    inliers_n_star: usize,
    k_n_star: usize,
}

impl TerminationLength {
    pub fn new(
        total_samples: usize,
        subset_size: usize,
        beta: f64,
        eta0: f64,
        max_draws: usize,
    ) -> Self {
        let non_random = (0..=total_samples)
            .map(|n| {
                if n < subset_size {
                    0
                } else {
                    non_random_inliers(subset_size, n, beta)
                }
            })
            .collect();

        Self {
            subset_size,
            eta0,
            max_draws,
            non_random,
            n_star: total_samples,
            inliers_n_star: 0,
            k_n_star: max_draws,
        }
    }

    /// Current termination length `n*`.
    pub fn n_star(&self) -> usize {
        self.n_star
    }

    /// Inliers required within the top `n*` samples.
    pub fn inliers_n_star(&self) -> usize {
        self.inliers_n_star
    }

    /// Draws `k(n*)` needed to satisfy the maximality criterion.
    pub fn k_n_star(&self) -> usize {
        self.k_n_star
    }

    /// Scan window sizes from the total sample count down to the subset size
    /// for the one maximising the inlier ratio while passing `Imin(n)`, and
    /// adopt it if its ratio beats the current `n*`.
    ///
    /// `inliers` is indexed by sample, `sorted_indices` lists samples by
    /// descending quality and `inlier_count` is the total number of inliers.
    /// Returns whether `n*` changed.
    pub fn update(
        &mut self,
        sorted_indices: &[usize],
        inliers: &[bool],
        inlier_count: usize,
    ) -> bool {
        let total = sorted_indices.len();
        let m = self.subset_size.max(1);

        let mut n_best = total;
        let mut inliers_best = inlier_count;
        let mut inliers_test = inlier_count;
        let mut n_test = total;
        while n_test >= m {
            // Invariant: `inliers_test` counts inliers among the top `n_test`.
            if inliers_test * n_best > inliers_best * n_test
                && inliers_test >= self.non_random[n_test]
            {
                n_best = n_test;
                inliers_best = inliers_test;
            }
            if inliers[sorted_indices[n_test - 1]] {
                inliers_test -= 1;
            }
            n_test -= 1;
        }

        if inliers_best * self.n_star > self.inliers_n_star * n_best {
            self.n_star = n_best;
            self.inliers_n_star = inliers_best;
            let ratio = inliers_best as f64 / n_best as f64;
            self.k_n_star =
                required_iterations(1.0 - self.eta0, ratio, self.subset_size).min(self.max_draws);
            true
        } else {
            false
        }
    }

    /// Whether `best_inliers` meets the inliers required at `n*` and enough
    /// draws were made to rule out a better window.
    pub fn is_satisfied(&self, best_inliers: usize, iteration: usize) -> bool {
        best_inliers >= self.inliers_n_star && iteration >= self.k_n_star
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_iterations_closed_form() {
        // ceil(ln(0.01) / ln(1 - 0.8^2)) = ceil(4.5076)
        assert_eq!(required_iterations(0.99, 0.8, 2), 5);
        // ceil(ln(0.01) / ln(1 - 0.5^4)) = ceil(71.36)
        assert_eq!(required_iterations(0.99, 0.5, 4), 72);
    }

    #[test]
    fn required_iterations_all_inliers_needs_one_draw() {
        assert_eq!(required_iterations(0.99, 1.0, 3), 1);
    }

    #[test]
    fn required_iterations_saturates_on_degenerate_ratios() {
        assert_eq!(required_iterations(0.99, 0.0, 2), usize::MAX);
        assert_eq!(required_iterations(0.99, f64::NAN, 2), usize::MAX);
        // 1e-20 squared is representable but 1 - p rounds to 1, so the log is zero.
        assert_eq!(required_iterations(0.99, 1e-20, 1), usize::MAX);
        // Full confidence cannot be reached with outliers present.
        assert_eq!(required_iterations(1.0, 0.5, 2), usize::MAX);
    }

    #[test]
    fn worst_case_budget_is_capped() {
        let unbounded = worst_case_iterations(0.99, 1.0, 3, 1000);
        assert_eq!(unbounded, 1000);
        // ceil(ln(0.01) / ln(1 - 0.2^2)) = ceil(112.8)
        assert_eq!(worst_case_iterations(0.99, 0.8, 2, 100_000), 113);
    }

    #[test]
    fn non_random_bound_grows_with_window() {
        let small = non_random_inliers(2, 10, 0.01);
        let large = non_random_inliers(2, 1000, 0.01);
        assert!(small >= 2);
        assert!(large > small);
        // 2 + 0.1 + sqrt(0.099) * sqrt(2.706) = 2.6176 -> 3
        assert_eq!(small, 3);
    }

    #[test]
    fn termination_length_prefers_dense_top_window() {
        // 40 samples ranked by index; the top 10 are all inliers, the rest
        // contain a single inlier.
        let total = 40;
        let sorted: Vec<usize> = (0..total).collect();
        let mut inliers = vec![false; total];
        for flag in inliers.iter_mut().take(10) {
            *flag = true;
        }
        inliers[30] = true;

        let mut length = TerminationLength::new(total, 2, 0.01, 0.05, 10_000);
        assert_eq!(length.n_star(), total);
        assert!(length.update(&sorted, &inliers, 11));
        assert_eq!(length.n_star(), 10);
        assert_eq!(length.inliers_n_star(), 10);
        assert_eq!(length.k_n_star(), 1);

        // The same support again is not an improvement.
        assert!(!length.update(&sorted, &inliers, 11));
        assert!(length.is_satisfied(11, 1));
        assert!(!length.is_satisfied(9, 1));
    }
}
