//! Consensus-count policy: keep the candidate with the most inliers under a
//! fixed threshold.

use log::{debug, trace};

use crate::core::{
    estimate_candidates, listener_ready, no_model_found, run_estimation, EstimationResult,
    EstimatorBase, RobustEstimator, RobustMethod, ThresholdListener,
};
use crate::error::{Error, Result};
use crate::scoring::InliersData;
use crate::settings::{ConsensusSettings, EstimatorSettings};
use crate::termination::required_iterations;

/// RANSAC estimator.
///
/// A sample is an inlier of a candidate when its residual is at most the
/// listener's threshold. Whenever the best inlier count improves, the
/// iteration budget shrinks to the number of draws needed to hit an
/// all-inlier subset with the configured confidence.
#[derive(Debug, Clone)]
pub struct RansacEstimator<L> {
    base: EstimatorBase,
    listener: Option<L>,
    consensus: ConsensusSettings,
}

impl<L: ThresholdListener> Default for RansacEstimator<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ThresholdListener> RansacEstimator<L> {
    pub fn new() -> Self {
        Self {
            base: EstimatorBase::new(RobustMethod::Ransac),
            listener: None,
            consensus: ConsensusSettings::default(),
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
        consensus: ConsensusSettings,
        listener: Option<L>,
    ) -> Result<Self> {
        Ok(Self {
            base: EstimatorBase::with_settings(RobustMethod::Ransac, settings)?,
            listener,
            consensus,
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

    pub fn consensus_settings(&self) -> ConsensusSettings {
        self.consensus
    }

    /// Keep the inlier flags of the best model in the result.
    pub fn set_keep_inliers(&mut self, keep: bool) -> Result<()> {
        self.base.check_unlocked()?;
        self.consensus.keep_inliers = keep;
        Ok(())
    }

    /// Keep the residuals of the best model in the result.
    pub fn set_keep_residuals(&mut self, keep: bool) -> Result<()> {
        self.base.check_unlocked()?;
        self.consensus.keep_residuals = keep;
        Ok(())
    }
}

impl<L: ThresholdListener> RobustEstimator for RansacEstimator<L> {
    type Model = L::Model;
    type InliersData = InliersData;

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn is_ready(&self) -> bool {
        listener_ready(self.listener.as_ref())
    }

    fn estimate(&mut self) -> Result<EstimationResult<L::Model, InliersData>> {
        let ConsensusSettings {
            keep_inliers,
            keep_residuals,
        } = self.consensus;

        run_estimation(&mut self.base, self.listener.as_mut(), |base, listener| {
            let total = listener.total_samples();
            let subset_size = listener.subset_size();
            let threshold = listener.threshold();
            if threshold.is_nan() || threshold < 0.0 {
                return Err(Error::failure(format!("invalid threshold {threshold}")));
            }

            let confidence = base.confidence();
            let max_iterations = base.max_iterations();
            let mut selector = base.subset_selector(total);
            let mut subset = vec![0usize; subset_size];
            let mut candidates = Vec::new();

            let mut current = InliersData::new(total, keep_inliers, keep_residuals);
            let mut best_data = InliersData::new(total, keep_inliers, keep_residuals);
            let mut best = None;
            let mut best_inliers = 0usize;
            let mut budget = max_iterations;
            let mut iteration = 0usize;

            while iteration < budget && !base.is_cancelled() {
                selector.sample(subset_size, &mut subset)?;
                estimate_candidates(listener, &subset, &mut candidates)?;
                trace!("iteration {iteration}: {} candidates", candidates.len());

                for candidate in candidates.drain(..) {
                    let count = current.score_consensus(total, threshold, |i| {
                        listener.residual(&candidate, i)
                    });
                    if count > best_inliers {
                        best_inliers = count;
                        std::mem::swap(&mut current, &mut best_data);
                        best = Some(candidate);

                        let ratio = count as f64 / total as f64;
                        budget = required_iterations(confidence, ratio, subset_size)
                            .min(max_iterations);
                        base.set_budget(budget);
                        debug!(
                            "RANSAC iteration {iteration}: {count}/{total} inliers, budget {budget}"
                        );
                    }
                }

                iteration += 1;
                base.end_iteration(listener, iteration, iteration as f64 / budget as f64);
            }

            let model = best.ok_or_else(|| no_model_found(base))?;
            best_data.retain(keep_inliers, keep_residuals);
            Ok(EstimationResult {
                model,
                inliers: best_data,
                iterations: iteration,
            })
        })
    }
}
