//! Progressive sampling window: grows the set of top-ranked samples that
//! minimal subsets are drawn from.

use log::debug;

use crate::error::Result;
use crate::samplers::SubsetSelector;
use crate::utils::sorted_quality_indices;

/// Growth-function driven sampling window over quality-ranked samples.
///
/// Samples are ranked once by descending quality. Subsets are drawn from the
/// top `n` ranks, always including rank `n - 1`, and `n` grows whenever the
/// iteration count passes the expected number of draws `T'_n` that only
/// contain samples from the top `n`. Once the iteration count runs past
/// `T'_n` the window falls back to plain uniform sampling over all samples.
#[derive(Debug, Clone)]
pub struct ProgressiveWindow {
    sorted_indices: Vec<usize>,
    subset_size: usize,
    /// Current window size `n`.
    window: usize,
    /// Expected number of draws `T_n` from the top `n` samples.
    t_n: f64,
    /// Integer crossover point `T'_n`.
    t_n_prime: usize,
    ranks: Vec<usize>,
}

impl ProgressiveWindow {
    /// Build the window for `quality_scores` and minimal subsets of
    /// `subset_size`, where `max_draws` is the global draw budget `T_N`.
    pub fn new(quality_scores: &[f64], subset_size: usize, max_draws: usize) -> Self {
        let total = quality_scores.len();
        let mut t_n = max_draws as f64;
        for i in 0..subset_size.min(total) {
            t_n *= (subset_size - i) as f64 / (total - i) as f64;
        }

        Self {
            sorted_indices: sorted_quality_indices(quality_scores),
            subset_size,
            window: subset_size,
            t_n,
            t_n_prime: 1,
            ranks: vec![0; subset_size],
        }
    }

    /// Current window size `n`.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Integer crossover point `T'_n` of the current window.
    pub fn crossover(&self) -> usize {
        self.t_n_prime
    }

    /// Sample indices ordered by descending quality.
    pub fn sorted_indices(&self) -> &[usize] {
        &self.sorted_indices
    }

    /// Grow the window for iteration `t` (1-based) while it stays below the
    /// current termination length `n_star`.
    pub fn advance(&mut self, t: usize, n_star: usize) {
        if t > self.t_n_prime && self.window < n_star {
            let m = self.subset_size as f64;
            let next = self.window as f64 + 1.0;
            let t_n_next = self.t_n * next / (next - m);
            self.window += 1;
            self.t_n_prime += (t_n_next - self.t_n).ceil() as usize;
            self.t_n = t_n_next;
            debug!(
                "Progressive window grown to {} (crossover at {})",
                self.window, self.t_n_prime
            );
        }
    }

    /// Draw the subset for iteration `t` into `out`, as sample indices.
    pub fn draw(
        &mut self,
        t: usize,
        selector: &mut SubsetSelector,
        out: &mut [usize],
    ) -> Result<()> {
        if self.t_n_prime < t {
            // Past the crossover: plain uniform sampling over every sample.
            return selector.sample(self.subset_size, out);
        }

        selector.sample_in_range(0, self.window, self.subset_size, true, &mut self.ranks)?;
        for (dst, &rank) in out.iter_mut().zip(self.ranks.iter()) {
            *dst = self.sorted_indices[rank];
        }
        Ok(())
    }
}
