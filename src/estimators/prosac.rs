//! Progressive consensus policy: quality-guided sampling with the
//! non-randomness and maximality termination criteria.

use log::{debug, trace};

use crate::core::{
    estimate_candidates, listener_ready, no_model_found, run_estimation, EstimationResult,
    EstimatorBase, QualityListener, RobustEstimator, RobustMethod, ThresholdListener,
};
use crate::error::{Error, Result};
use crate::samplers::ProgressiveWindow;
use crate::scoring::InliersData;
use crate::settings::{
    check_unit_interval, ConsensusSettings, EstimatorSettings, ProgressiveSettings,
};
use crate::termination::{worst_case_iterations, TerminationLength};

/// PROSAC estimator.
///
/// Subsets are drawn from a window of the best-ranked samples that widens as
/// iterations pass. Every improvement of the inlier count triggers a search
/// for the termination length `n*`; the run ends once the best model has the
/// inliers required at `n*` and `k(n*)` draws were made, or when the
/// worst-case global budget is exhausted.
#[derive(Debug, Clone)]
pub struct ProsacEstimator<L> {
    base: EstimatorBase,
    listener: Option<L>,
    consensus: ConsensusSettings,
    progressive: ProgressiveSettings,
}

impl<L> Default for ProsacEstimator<L>
where
    L: ThresholdListener + QualityListener,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<L> ProsacEstimator<L>
where
    L: ThresholdListener + QualityListener,
{
    pub fn new() -> Self {
        Self {
            base: EstimatorBase::new(RobustMethod::Prosac),
            listener: None,
            consensus: ConsensusSettings::default(),
            progressive: ProgressiveSettings::default(),
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
        progressive: ProgressiveSettings,
        listener: Option<L>,
    ) -> Result<Self> {
        progressive.validate()?;
        Ok(Self {
            base: EstimatorBase::with_settings(RobustMethod::Prosac, settings)?,
            listener,
            consensus,
            progressive,
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

    pub fn progressive_settings(&self) -> ProgressiveSettings {
        self.progressive
    }

    pub fn set_keep_inliers(&mut self, keep: bool) -> Result<()> {
        self.base.check_unlocked()?;
        self.consensus.keep_inliers = keep;
        Ok(())
    }

    pub fn set_keep_residuals(&mut self, keep: bool) -> Result<()> {
        self.base.check_unlocked()?;
        self.consensus.keep_residuals = keep;
        Ok(())
    }

    pub fn set_eta0(&mut self, eta0: f64) -> Result<()> {
        self.base.check_unlocked()?;
        check_unit_interval("eta0", eta0)?;
        self.progressive.eta0 = eta0;
        Ok(())
    }

    pub fn set_beta(&mut self, beta: f64) -> Result<()> {
        self.base.check_unlocked()?;
        check_unit_interval("beta", beta)?;
        self.progressive.beta = beta;
        Ok(())
    }

    pub fn set_max_outliers_proportion(&mut self, proportion: f64) -> Result<()> {
        self.base.check_unlocked()?;
        check_unit_interval("max_outliers_proportion", proportion)?;
        self.progressive.max_outliers_proportion = proportion;
        Ok(())
    }
}

impl<L> RobustEstimator for ProsacEstimator<L>
where
    L: ThresholdListener + QualityListener,
{
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
        let ProgressiveSettings {
            eta0,
            beta,
            max_outliers_proportion,
        } = self.progressive;

        run_estimation(&mut self.base, self.listener.as_mut(), |base, listener| {
            let total = listener.total_samples();
            let subset_size = listener.subset_size();
            let threshold = listener.threshold();
            if threshold.is_nan() || threshold < 0.0 {
                return Err(Error::failure(format!("invalid threshold {threshold}")));
            }
            let scores = listener.quality_scores();
            if scores.len() != total {
                return Err(Error::failure(format!(
                    "{} quality scores for {total} samples",
                    scores.len()
                )));
            }

            let max_iterations = base.max_iterations();
            let global = worst_case_iterations(
                base.confidence(),
                max_outliers_proportion,
                subset_size,
                max_iterations,
            );
            let mut window = ProgressiveWindow::new(scores, subset_size, global);
            let mut length = TerminationLength::new(total, subset_size, beta, eta0, global);
            base.set_budget(global);

            let mut selector = base.subset_selector(total);
            let mut subset = vec![0usize; subset_size];
            let mut candidates = Vec::new();

            // The termination length search needs the inlier flags.
            let mut current = InliersData::new(total, true, keep_residuals);
            let mut best_data = InliersData::new(total, true, keep_residuals);
            let mut best = None;
            let mut best_inliers = 0usize;
            let mut budget = global;
            let mut t = 0usize;

            while !length.is_satisfied(best_inliers, t)
                && t < global
                && t < max_iterations
                && !base.is_cancelled()
            {
                t += 1;
                window.advance(t, length.n_star());
                window.draw(t, &mut selector, &mut subset)?;
                estimate_candidates(listener, &subset, &mut candidates)?;
                trace!(
                    "iteration {t}: window {}, {} candidates",
                    window.window(),
                    candidates.len()
                );

                for candidate in candidates.drain(..) {
                    let count = current.score_consensus(total, threshold, |i| {
                        listener.residual(&candidate, i)
                    });
                    if count <= best_inliers {
                        continue;
                    }

                    best_inliers = count;
                    std::mem::swap(&mut current, &mut best_data);
                    best = Some(candidate);

                    if let Some(flags) = best_data.inliers() {
                        if length.update(window.sorted_indices(), flags, count) {
                            budget = length.k_n_star().min(global);
                            base.set_budget(budget);
                            debug!(
                                "PROSAC iteration {t}: n* = {}, {} inliers required, k(n*) = {}",
                                length.n_star(),
                                length.inliers_n_star(),
                                length.k_n_star()
                            );
                        }
                    }
                    debug!("PROSAC iteration {t}: {count}/{total} inliers, budget {budget}");
                }

                base.end_iteration(listener, t, t as f64 / budget as f64);
            }

            let model = best.ok_or_else(|| no_model_found(base))?;
            best_data.retain(keep_inliers, keep_residuals);
            Ok(EstimationResult {
                model,
                inliers: best_data,
                iterations: t,
            })
        })
    }
}
