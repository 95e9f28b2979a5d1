//! Median policy: keep the candidate with the smallest median residual.

use log::{debug, trace};

use crate::core::{
    estimate_candidates, listener_ready, no_model_found, run_estimation, EstimationResult,
    EstimatorBase, EstimatorListener, RobustEstimator, RobustMethod,
};
use crate::error::Result;
use crate::scoring::LmedsInliersData;
use crate::settings::{check_non_negative, check_positive, EstimatorSettings, MedianSettings};
use crate::termination::required_iterations;

/// Least-median-of-squares estimator.
///
/// No fixed threshold is needed. For every candidate the median of all
/// residuals is computed; when it improves on the best so far, the inlier
/// threshold becomes `inlier_factor * median`, samples are reclassified
/// against it and the iteration budget is recomputed from the resulting
/// inlier ratio. The run stops early once that threshold drops to the stop
/// threshold.
#[derive(Debug, Clone)]
pub struct LmedsEstimator<L> {
    base: EstimatorBase,
    listener: Option<L>,
    median: MedianSettings,
}

impl<L: EstimatorListener> Default for LmedsEstimator<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: EstimatorListener> LmedsEstimator<L> {
    pub fn new() -> Self {
        Self {
            base: EstimatorBase::new(RobustMethod::Lmeds),
            listener: None,
            median: MedianSettings::default(),
        }
    }

    pub fn with_listener(listener: L) -> Self {
        Self {
            listener: Some(listener),
            ..Self::new()
        }
    }

    pub fn with_settings(
        settings: EstimatorSettings,
        median: MedianSettings,
        listener: Option<L>,
    ) -> Result<Self> {
        median.validate()?;
        Ok(Self {
            base: EstimatorBase::with_settings(RobustMethod::Lmeds, settings)?,
            listener,
            median,
        })
    }

    pub fn listener(&self) -> Option<&L> {
        self.listener.as_ref()
    }

    pub fn set_listener(&mut self, listener: L) -> Result<()> {
        self.base.check_unlocked()?;
        self.listener = Some(listener);
        Ok(())
    }

    pub fn take_listener(&mut self) -> Result<Option<L>> {
        self.base.check_unlocked()?;
        Ok(self.listener.take())
    }

    pub fn stop_threshold(&self) -> f64 {
        self.median.stop_threshold
    }

    pub fn set_stop_threshold(&mut self, stop_threshold: f64) -> Result<()> {
        self.base.check_unlocked()?;
        check_non_negative("stop_threshold", stop_threshold)?;
        self.median.stop_threshold = stop_threshold;
        Ok(())
    }

    pub fn inlier_factor(&self) -> f64 {
        self.median.inlier_factor
    }

    pub fn set_inlier_factor(&mut self, inlier_factor: f64) -> Result<()> {
        self.base.check_unlocked()?;
        check_positive("inlier_factor", inlier_factor)?;
        self.median.inlier_factor = inlier_factor;
        Ok(())
    }
}

impl<L: EstimatorListener> RobustEstimator for LmedsEstimator<L> {
    type Model = L::Model;
    type InliersData = LmedsInliersData;

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn is_ready(&self) -> bool {
        listener_ready(self.listener.as_ref())
    }

    fn estimate(&mut self) -> Result<EstimationResult<L::Model, LmedsInliersData>> {
        let MedianSettings {
            stop_threshold,
            inlier_factor,
        } = self.median;

        run_estimation(&mut self.base, self.listener.as_mut(), |base, listener| {
            let total = listener.total_samples();
            let subset_size = listener.subset_size();
            let confidence = base.confidence();
            let max_iterations = base.max_iterations();

            let mut selector = base.subset_selector(total);
            let mut subset = vec![0usize; subset_size];
            let mut candidates = Vec::new();
            let mut scratch = Vec::with_capacity(total);

            let mut current = LmedsInliersData::new(total);
            let mut best_data = LmedsInliersData::new(total);
            let mut best = None;
            let mut best_median = f64::INFINITY;
            let mut budget = max_iterations;
            let mut iteration = 0usize;
            let mut stop = false;

            while iteration < budget && !stop && !base.is_cancelled() {
                selector.sample(subset_size, &mut subset)?;
                estimate_candidates(listener, &subset, &mut candidates)?;
                trace!("iteration {iteration}: {} candidates", candidates.len());

                for candidate in candidates.drain(..) {
                    let median = current.score(total, &mut scratch, |i| {
                        listener.residual(&candidate, i)
                    });
                    if median >= best_median || median.is_nan() {
                        continue;
                    }

                    best_median = median;
                    let count = current.derive_threshold(inlier_factor, total, subset_size);
                    std::mem::swap(&mut current, &mut best_data);
                    best = Some(candidate);

                    let ratio = count as f64 / total as f64;
                    budget = required_iterations(confidence, ratio, subset_size)
                        .min(max_iterations);
                    base.set_budget(budget);
                    debug!("LMedS iteration {iteration}: median {median}, {count} inliers");

                    if best_data.estimated_threshold() <= stop_threshold {
                        debug!("LMedS stopping early: threshold below {stop_threshold}");
                        stop = true;
                        break;
                    }
                }

                iteration += 1;
                base.end_iteration(listener, iteration, iteration as f64 / budget as f64);
            }

            let model = best.ok_or_else(|| no_model_found(base))?;
            Ok(EstimationResult {
                model,
                inliers: best_data,
                iterations: iteration,
            })
        })
    }
}
