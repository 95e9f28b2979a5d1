//! Hybrid policy: fixed threshold with residuals capped at it, keeping the
//! candidate with the smallest median of capped residuals.

use log::{debug, trace};

use crate::core::{
    estimate_candidates, listener_ready, no_model_found, run_estimation, EstimationResult,
    EstimatorBase, RobustEstimator, RobustMethod, ThresholdListener,
};
use crate::error::{Error, Result};
use crate::scoring::MsacInliersData;
use crate::settings::{ConsensusSettings, EstimatorSettings};
use crate::termination::required_iterations;

/// Candidate with the largest inlier count seen during an MSAC run.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusRecord<M> {
    pub model: M,
    pub num_inliers: usize,
}

/// Snapshot returned by [`MsacEstimator`].
///
/// The returned model is the best by median; the best by inlier count only
/// drives the iteration budget and may be a different candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct MsacReport<M> {
    pub best_median: MsacInliersData,
    pub best_consensus: Option<ConsensusRecord<M>>,
}

impl<M> MsacReport<M> {
    pub fn num_inliers(&self) -> usize {
        self.best_median.num_inliers()
    }

    pub fn median_residual(&self) -> f64 {
        self.best_median.median_residual()
    }
}

/// MSAC estimator.
#[derive(Debug, Clone)]
pub struct MsacEstimator<L> {
    base: EstimatorBase,
    listener: Option<L>,
    consensus: ConsensusSettings,
}

impl<L: ThresholdListener> Default for MsacEstimator<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ThresholdListener> MsacEstimator<L> {
    pub fn new() -> Self {
        Self {
            base: EstimatorBase::new(RobustMethod::Msac),
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
            base: EstimatorBase::with_settings(RobustMethod::Msac, settings)?,
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
}

impl<L: ThresholdListener> RobustEstimator for MsacEstimator<L> {
    type Model = L::Model;
    type InliersData = MsacReport<L::Model>;

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn is_ready(&self) -> bool {
        listener_ready(self.listener.as_ref())
    }

    fn estimate(&mut self) -> Result<EstimationResult<L::Model, MsacReport<L::Model>>> {
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
            let mut scratch = Vec::with_capacity(total);

            let mut current = MsacInliersData::new(total, keep_inliers);
            let mut best_data = MsacInliersData::new(total, keep_inliers);
            let mut best = None;
            let mut best_median = f64::INFINITY;
            let mut best_consensus: Option<ConsensusRecord<L::Model>> = None;
            let mut best_inliers = 0usize;
            let mut budget = max_iterations;
            let mut iteration = 0usize;

            while iteration < budget && !base.is_cancelled() {
                selector.sample(subset_size, &mut subset)?;
                estimate_candidates(listener, &subset, &mut candidates)?;
                trace!("iteration {iteration}: {} candidates", candidates.len());

                for candidate in candidates.drain(..) {
                    let (median, count) = current.score(total, threshold, &mut scratch, |i| {
                        listener.residual(&candidate, i)
                    });

                    let count_improved = count > best_inliers;
                    if count_improved {
                        best_inliers = count;
                        best_consensus = Some(ConsensusRecord {
                            model: candidate.clone(),
                            num_inliers: count,
                        });

                        let ratio = count as f64 / total as f64;
                        budget = required_iterations(confidence, ratio, subset_size)
                            .min(max_iterations);
                        base.set_budget(budget);
                        debug!("MSAC iteration {iteration}: {count} inliers, budget {budget}");
                    }

                    if median < best_median {
                        best_median = median;
                        std::mem::swap(&mut current, &mut best_data);
                        best = Some(candidate);
                        debug!("MSAC iteration {iteration}: capped median {median}");
                    } else if count_improved {
                        current = MsacInliersData::new(total, keep_inliers);
                    }
                }

                iteration += 1;
                base.end_iteration(listener, iteration, iteration as f64 / budget as f64);
            }

            let model = best.ok_or_else(|| no_model_found(base))?;
            best_data.retain(keep_inliers, keep_residuals);
            Ok(EstimationResult {
                model,
                inliers: MsacReport {
                    best_median: best_data,
                    best_consensus,
                },
                iterations: iteration,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EstimatorListener, ListenerResult};

    /// Scalar samples with scripted candidates: iteration `i` proposes
    /// `script[i % script.len()]` regardless of the subset drawn.
    struct ScriptedListener {
        values: Vec<f64>,
        script: Vec<f64>,
        threshold: f64,
        next: usize,
    }

    impl ScriptedListener {
        fn new(values: Vec<f64>, script: Vec<f64>, threshold: f64) -> Self {
            Self {
                values,
                script,
                threshold,
                next: 0,
            }
        }
    }

    impl EstimatorListener for ScriptedListener {
        type Model = f64;

        fn total_samples(&self) -> usize {
            self.values.len()
        }

        fn subset_size(&self) -> usize {
            1
        }

        fn estimate_candidates(

            &mut self,

            _subset: &[usize],

            candidates: &mut Vec<f64>,

        ) -> ListenerResult<()> {
            candidates.push(self.script[self.next % self.script.len()]);
            self.next += 1;
            Ok(())
        }

        fn residual(&self, candidate: &f64, index: usize) -> f64 {
            (self.values[index] - candidate).abs()
        }
    }

    impl ThresholdListener for ScriptedListener {
        fn threshold(&self) -> f64 {
            self.threshold
        }
    }

    /// Six samples at zero, two near it and one far outlier.
    fn clustered() -> Vec<f64> {
        vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.4, 1.9, 30.0]
    }

    #[test]
    fn median_and_count_bests_can_diverge() {
        // Against 0.5: 7 inliers, capped median 0.5. Against 0: 6 inliers,
        // capped median 0. The median best and the count best differ.
        let listener = ScriptedListener::new(clustered(), vec![0.5, 0.0], 1.0);
        let mut msac = MsacEstimator::with_listener(listener);
        msac.set_max_iterations(2).unwrap();
        msac.set_keep_inliers(true).unwrap();

        let result = msac.estimate().unwrap();
        assert_eq!(result.iterations, 2);
        assert_eq!(result.model, 0.0);
        assert_eq!(result.inliers.num_inliers(), 6);
        assert_eq!(
            result.inliers.best_median.inliers_data().inlier_indices(),
            Some(vec![0, 1, 2, 3, 4, 5])
        );

        let consensus = result.inliers.best_consensus.unwrap();
        assert_eq!(consensus.model, 0.5);
        assert_eq!(consensus.num_inliers, 7);
    }

    #[test]
    fn capped_median_output_is_pinned() {
        // 0.5 improves both bests, 0.95 only the count (8 inliers, capped
        // median 0.95), 0 only the median.
        let listener = ScriptedListener::new(clustered(), vec![0.5, 0.95, 0.0], 1.0);
        let mut msac = MsacEstimator::with_listener(listener);
        msac.set_max_iterations(3).unwrap();
        msac.set_keep_residuals(true).unwrap();

        let result = msac.estimate().unwrap();
        assert_eq!(result.iterations, 3);
        assert_eq!(result.model, 0.0);
        assert_eq!(result.inliers.median_residual(), 0.0);
        assert_eq!(
            result.inliers.best_median.inliers_data().residuals(),
            Some(&[0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0][..])
        );
        assert!(result.inliers.best_median.inliers_data().inliers().is_none());

        let consensus = result.inliers.best_consensus.unwrap();
        assert_eq!(consensus.model, 0.95);
        assert_eq!(consensus.num_inliers, 8);
    }

    #[test]
    fn each_best_is_non_regressing() {
        let listener = ScriptedListener::new(clustered(), vec![0.5, 50.0, -20.0, 5.0], 1.0);
        let mut msac = MsacEstimator::with_listener(listener);
        msac.set_max_iterations(8).unwrap();

        let result = msac.estimate().unwrap();
        // 7 of 9 inliers gives a budget of 4 draws.
        assert_eq!(result.iterations, 4);
        assert_eq!(result.model, 0.5);
        assert_eq!(result.inliers.median_residual(), 0.5);
        let consensus = result.inliers.best_consensus.unwrap();
        assert_eq!(consensus.model, 0.5);
        assert_eq!(consensus.num_inliers, 7);
    }

    #[test]
    fn bests_only_improve_as_iterations_grow() {
        // Capped medians 1, 1, 0, 0.95 with 1, 2, 6, 8 inliers. Eight of
        // nine inliers need 3 draws, so a fifth is never made.
        let script = vec![30.0, 1.9, 0.0, 0.95, 0.5];
        let runs: Vec<(f64, usize)> = (1..=script.len())
            .map(|max_iterations| {
                let listener = ScriptedListener::new(clustered(), script.clone(), 1.0);
                let mut msac = MsacEstimator::with_listener(listener);
                msac.set_max_iterations(max_iterations).unwrap();
                let report = msac.estimate().unwrap().inliers;
                let consensus = report.best_consensus.as_ref().map_or(0, |c| c.num_inliers);
                (report.median_residual(), consensus)
            })
            .collect();

        assert!(runs.windows(2).all(|w| w[1].0 <= w[0].0), "{runs:?}");
        assert!(runs.windows(2).all(|w| w[1].1 >= w[0].1), "{runs:?}");
        assert_eq!(runs, vec![(1.0, 1), (1.0, 2), (0.0, 6), (0.0, 8), (0.0, 8)]);
    }

    #[test]
    fn negative_threshold_fails() {
        let listener = ScriptedListener::new(clustered(), vec![0.0], -0.5);
        let mut msac = MsacEstimator::with_listener(listener);
        let err = msac.estimate().unwrap_err();
        assert!(err.is_estimation_failure());
        assert!(!msac.is_locked());
    }
}
