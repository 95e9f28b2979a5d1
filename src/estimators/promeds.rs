//! Progressive median policy: quality-guided sampling with a threshold
//! derived from the median residual.

use log::{debug, trace};

use crate::core::{
    estimate_candidates, listener_ready, no_model_found, run_estimation, EstimationResult,
    EstimatorBase, QualityListener, RobustEstimator, RobustMethod,
};
use crate::error::{Error, Result};
use crate::samplers::ProgressiveWindow;
use crate::scoring::PromedsInliersData;
use crate::settings::{
    check_non_negative, check_positive, check_unit_interval, EstimatorSettings, MedianSettings,
    ProgressiveSettings, PromedsSettings,
};
use crate::termination::{worst_case_iterations, TerminationLength};

/// PROMedS estimator.
///
/// Draws subsets like PROSAC and keeps the candidate with the smallest
/// median residual like LMedS. When the listener also supplies a fixed
/// inlier threshold, samples are classified under both thresholds and the
/// classification with fewer inliers is kept.
#[derive(Debug, Clone)]
pub struct PromedsEstimator<L> {
    base: EstimatorBase,
    listener: Option<L>,
    median: MedianSettings,
    progressive: ProgressiveSettings,
    promeds: PromedsSettings,
}

impl<L: QualityListener> Default for PromedsEstimator<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: QualityListener> PromedsEstimator<L> {
    pub fn new() -> Self {
        Self {
            base: EstimatorBase::new(RobustMethod::Promeds),
            listener: None,
            median: MedianSettings::default(),
            progressive: ProgressiveSettings::default(),
            promeds: PromedsSettings::default(),
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
        progressive: ProgressiveSettings,
        promeds: PromedsSettings,
        listener: Option<L>,
    ) -> Result<Self> {
        median.validate()?;
        progressive.validate()?;
        Ok(Self {
            base: EstimatorBase::with_settings(RobustMethod::Promeds, settings)?,
            listener,
            median,
            progressive,
            promeds,
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

    pub fn median_settings(&self) -> MedianSettings {
        self.median
    }

    pub fn progressive_settings(&self) -> ProgressiveSettings {
        self.progressive
    }

    pub fn promeds_settings(&self) -> PromedsSettings {
        self.promeds
    }

    pub fn set_stop_threshold(&mut self, stop_threshold: f64) -> Result<()> {
        self.base.check_unlocked()?;
        check_non_negative("stop_threshold", stop_threshold)?;
        self.median.stop_threshold = stop_threshold;
        Ok(())
    }

    pub fn set_inlier_factor(&mut self, inlier_factor: f64) -> Result<()> {
        self.base.check_unlocked()?;
        check_positive("inlier_factor", inlier_factor)?;
        self.median.inlier_factor = inlier_factor;
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

    /// Disable to keep iterating after the derived threshold falls below the
    /// stop threshold.
    pub fn set_stop_threshold_enabled(&mut self, enabled: bool) -> Result<()> {
        self.base.check_unlocked()?;
        self.promeds.stop_threshold_enabled = enabled;
        Ok(())
    }

    /// Whether the listener's fixed inlier threshold takes part in
    /// classification.
    pub fn set_use_inlier_thresholds(&mut self, enabled: bool) -> Result<()> {
        self.base.check_unlocked()?;
        self.promeds.use_inlier_thresholds = enabled;
        Ok(())
    }
}

impl<L: QualityListener> RobustEstimator for PromedsEstimator<L> {
    type Model = L::Model;
    type InliersData = PromedsInliersData;

    fn base(&self) -> &EstimatorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut EstimatorBase {
        &mut self.base
    }

    fn is_ready(&self) -> bool {
        listener_ready(self.listener.as_ref())
    }

    fn estimate(&mut self) -> Result<EstimationResult<L::Model, PromedsInliersData>> {
        let MedianSettings {
            stop_threshold,
            inlier_factor,
        } = self.median;
        let ProgressiveSettings {
            eta0,
            beta,
            max_outliers_proportion,
        } = self.progressive;
        let PromedsSettings {
            stop_threshold_enabled,
            use_inlier_thresholds,
        } = self.promeds;

        run_estimation(&mut self.base, self.listener.as_mut(), |base, listener| {
            let total = listener.total_samples();
            let subset_size = listener.subset_size();
            let scores = listener.quality_scores();
            if scores.len() != total {
                return Err(Error::failure(format!(
                    "{} quality scores for {total} samples",
                    scores.len()
                )));
            }
            let fixed_threshold = if use_inlier_thresholds {
                listener.inlier_threshold()
            } else {
                None
            };
            if let Some(threshold) = fixed_threshold {
                if threshold.is_nan() || threshold < 0.0 {
                    return Err(Error::failure(format!("invalid threshold {threshold}")));
                }
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
            let mut scratch = Vec::with_capacity(total);

            let mut current = PromedsInliersData::new(total);
            let mut best: Option<(L::Model, PromedsInliersData)> = None;
            let mut best_median = f64::INFINITY;
            let mut best_inliers = 0usize;
            let mut budget = global;
            let mut t = 0usize;
            let mut stop = false;

            while !stop
                && !length.is_satisfied(best_inliers, t)
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
                    let median = current.score(total, &mut scratch, |i| {
                        listener.residual(&candidate, i)
                    });
                    if median >= best_median || median.is_nan() {
                        continue;
                    }

                    best_median = median;
                    let count =
                        current.classify(inlier_factor, fixed_threshold, total, subset_size);
                    // `current` stays the scratch snapshot for the termination
                    // length search and later candidates, so the best is a copy.
                    best = Some((candidate, current.clone()));
                    let source = if current.is_median_threshold_used() {
                        "median"
                    } else {
                        "fixed"
                    };
                    debug!("PROMedS iteration {t}: median {median}, {count} inliers");
                    trace!("{source} threshold {} adopted", current.threshold_used());

                    if count > best_inliers {
                        best_inliers = count;
                        if let Some(flags) = current.inliers_data().inliers() {
                            if length.update(window.sorted_indices(), flags, count) {
                                budget = length.k_n_star().min(global);
                                base.set_budget(budget);
                                debug!(
                                    "PROMedS iteration {t}: n* = {}, {} inliers, k(n*) = {}",
                                    length.n_star(),
                                    length.inliers_n_star(),
                                    length.k_n_star()
                                );
                            }
                        }
                    }

                    if stop_threshold_enabled && current.estimated_threshold() <= stop_threshold {
                        debug!("PROMedS stopping early: threshold below {stop_threshold}");
                        stop = true;
                        break;
                    }
                }

                base.end_iteration(listener, t, t as f64 / budget as f64);
            }

            let (model, inliers) = best.ok_or_else(|| no_model_found(base))?;
            Ok(EstimationResult {
                model,
                inliers,
                iterations: t,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EstimatorListener, ListenerResult};

    /// Scalar samples ranked by index; each candidate is the value of its
    /// one-sample subset and residuals are squared differences.
    struct RankedListener {
        values: Vec<f64>,
        scores: Vec<f64>,
        fixed: Option<f64>,
        calls: usize,
    }

    impl RankedListener {
        /// 30 inliers cycling through 4.000, 4.001 and 4.002, then 8 outliers.
        fn new(fixed: Option<f64>) -> Self {
            let mut values: Vec<f64> = (0..30).map(|i| 4.0 + 0.001 * (i % 3) as f64).collect();
            values.extend((0..8).map(|j| 50.0 + 7.0 * j as f64));
            let scores = (0..values.len()).map(|i| 100.0 - i as f64).collect();
            Self {
                values,
                scores,
                fixed,
                calls: 0,
            }
        }

        /// 30 inliers cycling through 4.0, 4.25 and 4.5, ranked below 8
        /// outliers.
        fn outliers_first(fixed: Option<f64>) -> Self {
            let mut values: Vec<f64> = (0..30).map(|i| 4.0 + 0.25 * (i % 3) as f64).collect();
            values.extend((0..8).map(|j| 50.0 + 7.0 * j as f64));
            let scores = (0..values.len())
                .map(|i| if i < 30 { 50.0 - i as f64 } else { 130.0 - i as f64 })
                .collect();
            Self {
                values,
                scores,
                fixed,
                calls: 0,
            }
        }
    }

    impl EstimatorListener for RankedListener {
        type Model = f64;

        fn total_samples(&self) -> usize {
            self.values.len()
        }

        fn subset_size(&self) -> usize {
            1
        }

        fn estimate_candidates(

            &mut self,

            subset: &[usize],

            candidates: &mut Vec<f64>,

        ) -> ListenerResult<()> {
            self.calls += 1;
            candidates.push(self.values[subset[0]]);
            Ok(())
        }

        fn residual(&self, candidate: &f64, index: usize) -> f64 {
            let d = self.values[index] - candidate;
            d * d
        }
    }

    impl QualityListener for RankedListener {
        fn quality_scores(&self) -> &[f64] {
            &self.scores
        }

        fn inlier_threshold(&self) -> Option<f64> {
            self.fixed
        }
    }

    #[test]
    fn median_threshold_classifies_and_stops_early() {
        let mut promeds = PromedsEstimator::with_listener(RankedListener::new(Some(2e-6)));
        promeds.base_mut().set_seed(Some(8)).unwrap();

        let result = promeds.estimate().unwrap();
        // The top-ranked sample is drawn first and its median is tiny.
        assert_eq!(result.iterations, 1);
        assert_eq!(result.model, 4.0);
        assert!(result.inliers.is_median_threshold_used());
        assert_eq!(result.inliers.num_inliers(), 20);
        assert_eq!(result.inliers.threshold_used(), result.inliers.estimated_threshold());
        assert!(result.inliers.standard_deviation().is_finite());
    }

    #[test]
    fn stricter_fixed_threshold_is_adopted() {
        let mut promeds = PromedsEstimator::with_listener(RankedListener::new(Some(0.0)));
        promeds.base_mut().set_seed(Some(8)).unwrap();

        let result = promeds.estimate().unwrap();
        assert!(!result.inliers.is_median_threshold_used());
        assert_eq!(result.inliers.threshold_used(), 0.0);
        assert_eq!(result.inliers.num_inliers(), 10);
        assert_eq!(
            result.inliers.inliers_data().inlier_indices(),
            Some((0..30).step_by(3).collect())
        );
    }

    #[test]
    fn fixed_threshold_can_be_ignored() {
        let mut promeds = PromedsEstimator::with_listener(RankedListener::new(Some(0.0)));
        promeds.base_mut().set_seed(Some(8)).unwrap();
        promeds.set_use_inlier_thresholds(false).unwrap();

        let result = promeds.estimate().unwrap();
        assert!(result.inliers.is_median_threshold_used());
        assert_eq!(result.inliers.num_inliers(), 20);
    }

    #[test]
    fn disabled_stop_threshold_runs_until_termination_length() {
        // One-sample subsets before the crossover always take the last rank,
        // so iteration t proposes rank t - 1: eight outliers, then 4.0, 4.25.
        let run = |stop_enabled: bool| {
            let listener = RankedListener::outliers_first(Some(0.0));
            let mut promeds = PromedsEstimator::with_listener(listener);
            promeds.base_mut().set_seed(Some(3)).unwrap();
            promeds.set_stop_threshold(1.0).unwrap();
            promeds.set_stop_threshold_enabled(stop_enabled).unwrap();
            let result = promeds.estimate().unwrap();
            (promeds, result)
        };

        // 4.0 has median 0.0625, under the stop threshold.
        let (_, stopped) = run(true);
        assert_eq!(stopped.iterations, 9);
        assert_eq!(stopped.model, 4.0);

        // The fixed threshold keeps the 10 exact matches of 4.0, which
        // gives n* = 36 and k(n*) = 10. The tenth draw, 4.25, only ties
        // the median.
        let (promeds, result) = run(false);
        assert_eq!(result.iterations, 10);
        assert_eq!(result.model, 4.0);
        assert_eq!(result.inliers.median_residual(), 0.0625);
        assert!(!result.inliers.is_median_threshold_used());
        assert_eq!(
            result.inliers.inliers_data().inlier_indices(),
            Some((0..30).step_by(3).collect())
        );

        // The kept snapshot still describes 4.0 after 4.25 was scored.
        let listener = promeds.listener().unwrap();
        let residuals = result.inliers.inliers_data().residuals().unwrap();
        assert_eq!(residuals.len(), 38);
        for (i, &r) in residuals.iter().enumerate() {
            assert_eq!(r, listener.residual(&result.model, i));
        }
    }

    #[test]
    fn median_threshold_alone_can_accept_top_ranked_outliers() {
        // Without a fixed threshold at least half the samples are inliers, so
        // the seven outliers within the median of 50 form a pure top window
        // and k(n*) = 1.
        let mut promeds = PromedsEstimator::with_listener(RankedListener::outliers_first(None));
        promeds.base_mut().set_seed(Some(3)).unwrap();

        let result = promeds.estimate().unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.model, 50.0);
        assert!(result.inliers.is_median_threshold_used());
        assert_eq!(result.inliers.num_inliers(), 27);
    }

    #[test]
    fn negative_fixed_threshold_fails() {
        let mut promeds = PromedsEstimator::with_listener(RankedListener::new(Some(-1.0)));
        let err = promeds.estimate().unwrap_err();
        assert!(err.is_estimation_failure());
        assert_eq!(promeds.listener().map(|l| l.calls), Some(0));
    }

    #[test]
    fn quality_length_mismatch_fails_before_sampling() {
        let mut listener = RankedListener::new(None);
        listener.scores.push(0.0);
        let mut promeds = PromedsEstimator::with_listener(listener);

        let err = promeds.estimate().unwrap_err();
        assert!(err.is_estimation_failure());
        assert_eq!(promeds.listener().map(|l| l.calls), Some(0));
        assert!(!promeds.is_locked());
    }

    #[test]
    fn setters_are_range_checked() {
        let mut promeds: PromedsEstimator<RankedListener> = PromedsEstimator::new();
        assert!(promeds.set_inlier_factor(-2.0).is_err());
        assert!(promeds.set_max_outliers_proportion(1.1).is_err());
        promeds.set_stop_threshold_enabled(false).unwrap();
        assert!(!promeds.promeds_settings().stop_threshold_enabled);
        assert_eq!(promeds.median_settings().inlier_factor, 1.0);
    }
}
