//! Subset selector drawing distinct sample indices without replacement.

use std::collections::HashSet;

use crate::error::{Error, Result};
use crate::utils::UniformRandomGenerator;

/// Draws subsets of distinct indices uniformly at random from `[0, num_samples)`.
///
/// The selector owns a working set that tracks the indices chosen during the
/// current call. It is cleared at the start and at the end of every call and
/// reused across calls, so one selector must only serve one call at a time.
#[derive(Debug, Clone)]
pub struct SubsetSelector {
    num_samples: usize,
    rng: UniformRandomGenerator,
    selected: HashSet<usize>,
}

impl SubsetSelector {
    /// Construct a selector over `num_samples` samples with a random seed.
    pub fn new(num_samples: usize) -> Self {
        Self::with_rng(num_samples, UniformRandomGenerator::new())
    }

    /// Construct a selector from a fixed seed (useful for tests).
    pub fn from_seed(num_samples: usize, seed: u64) -> Self {
        Self::with_rng(num_samples, UniformRandomGenerator::from_seed(seed))
    }

    fn with_rng(num_samples: usize, rng: UniformRandomGenerator) -> Self {
        Self {
            num_samples,
            rng,
            selected: HashSet::new(),
        }
    }

    /// Fill `out[..size]` with `size` distinct indices drawn from `[0, num_samples)`.
    pub fn sample(&mut self, size: usize, out: &mut [usize]) -> Result<()> {
        if size == 0 || out.len() < size {
            return Err(Error::InvalidSize {
                size,
                capacity: out.len(),
            });
        }
        if self.num_samples < size {
            return Err(Error::InsufficientSamples {
                required: size,
                available: self.num_samples,
            });
        }

        self.selected.clear();
        self.fill(0, self.num_samples, &mut out[..size]);
        self.selected.clear();
        Ok(())
    }

    /// Fill `out[..size]` with `size` distinct indices drawn from `[lo, hi)`.
    ///
    /// With `pick_last`, index `hi - 1` is always part of the result and
    /// occupies the first slot; the remaining slots are drawn at random.
    pub fn sample_in_range(
        &mut self,
        lo: usize,
        hi: usize,
        size: usize,
        pick_last: bool,
        out: &mut [usize],
    ) -> Result<()> {
        if lo >= hi {
            return Err(Error::InvalidRange { lo, hi });
        }
        if size == 0 || hi - lo < size || out.len() < size {
            return Err(Error::InvalidSize {
                size,
                capacity: (hi - lo).min(out.len()),
            });
        }
        if hi > self.num_samples || self.num_samples < size {
            return Err(Error::InsufficientSamples {
                required: hi.max(size),
                available: self.num_samples,
            });
        }

        self.selected.clear();
        let out = &mut out[..size];
        if pick_last {
            out[0] = hi - 1;
            self.selected.insert(hi - 1);
            self.fill(lo, hi, &mut out[1..]);
        } else {
            self.fill(lo, hi, out);
        }
        self.selected.clear();
        Ok(())
    }

    // Rejection sampling: redraw until an index not yet in the working set
    // shows up. The callers guarantee the range has room for `out.len()`
    // more indices.
    fn fill(&mut self, lo: usize, hi: usize, out: &mut [usize]) {
        for slot in out.iter_mut() {
            loop {
                let candidate = self.rng.next_in(lo, hi);
                if self.selected.insert(candidate) {
                    *slot = candidate;
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_distinct(values: &[usize]) {
        for i in 0..values.len() {
            for j in (i + 1)..values.len() {
                assert_ne!(values[i], values[j]);
            }
        }
    }

    #[test]
    fn sample_returns_distinct_indices_in_range() {
        let mut selector = SubsetSelector::from_seed(10, 7);
        let mut buf = [0usize; 4];
        for _ in 0..200 {
            selector.sample(4, &mut buf).unwrap();
            assert!(buf.iter().all(|&v| v < 10));
            assert_distinct(&buf);
        }
    }

    #[test]
    fn sample_whole_population_is_a_permutation() {
        let mut selector = SubsetSelector::from_seed(6, 3);
        let mut buf = [0usize; 6];
        selector.sample(6, &mut buf).unwrap();
        let mut sorted = buf;
        sorted.sort_unstable();
        assert_eq!(sorted, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn sample_rejects_bad_sizes() {
        let mut selector = SubsetSelector::from_seed(5, 1);
        let mut buf = [0usize; 3];

        assert!(matches!(
            selector.sample(0, &mut buf),
            Err(Error::InvalidSize { .. })
        ));
        assert!(matches!(
            selector.sample(4, &mut buf),
            Err(Error::InvalidSize { .. })
        ));

        let mut big = [0usize; 8];
        assert!(matches!(
            selector.sample(6, &mut big),
            Err(Error::InsufficientSamples {
                required: 6,
                available: 5
            })
        ));
    }

    #[test]
    fn pick_last_always_includes_top_index() {
        let mut selector = SubsetSelector::from_seed(20, 11);
        let mut buf = [0usize; 3];
        for _ in 0..200 {
            selector.sample_in_range(2, 9, 3, true, &mut buf).unwrap();
            assert!(buf.contains(&8));
            assert!(buf.iter().all(|&v| (2..9).contains(&v)));
            assert_distinct(&buf);
        }
    }

    #[test]
    fn range_sampling_without_pick_last_stays_in_range() {
        let mut selector = SubsetSelector::from_seed(20, 5);
        let mut buf = [0usize; 2];
        for _ in 0..200 {
            selector.sample_in_range(4, 7, 2, false, &mut buf).unwrap();
            assert!(buf.iter().all(|&v| (4..7).contains(&v)));
            assert_distinct(&buf);
        }
    }

    #[test]
    fn range_sampling_rejects_bad_ranges() {
        let mut selector = SubsetSelector::from_seed(10, 1);
        let mut buf = [0usize; 3];

        assert!(matches!(
            selector.sample_in_range(5, 5, 2, false, &mut buf),
            Err(Error::InvalidRange { lo: 5, hi: 5 })
        ));
        assert!(matches!(
            selector.sample_in_range(6, 4, 2, false, &mut buf),
            Err(Error::InvalidRange { .. })
        ));
        assert!(matches!(
            selector.sample_in_range(0, 2, 3, false, &mut buf),
            Err(Error::InvalidSize { .. })
        ));
        assert!(matches!(
            selector.sample_in_range(0, 4, 0, true, &mut buf),
            Err(Error::InvalidSize { .. })
        ));
        assert!(matches!(
            selector.sample_in_range(8, 12, 2, true, &mut buf),
            Err(Error::InsufficientSamples { .. })
        ));
    }

    #[test]
    fn working_set_is_cleared_between_calls() {
        let mut selector = SubsetSelector::from_seed(3, 9);
        let mut buf = [0usize; 3];
        // Each call needs the full population; leftovers from a previous
        // call would make the rejection loop spin forever.
        for _ in 0..10 {
            selector.sample(3, &mut buf).unwrap();
            selector.sample_in_range(0, 3, 3, true, &mut buf).unwrap();
        }
        assert!(selector.selected.is_empty());
    }
}
