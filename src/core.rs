//! Core traits and the estimator lifecycle shared by every policy.
//!
//! The caller describes the problem through an [`EstimatorListener`]: how
//! many samples exist, how many a minimal subset needs, how to fit candidate
//! models from a subset and how to measure the residual of a sample against
//! a candidate. Policies that need a fixed inlier threshold or per-sample
//! quality scores bound their listener on [`ThresholdListener`] or
//! [`QualityListener`] as well.
//!
//! [`EstimatorBase`] owns what every policy shares: configuration, the
//! running flag and the progress throttle. The running flag is a plain
//! advisory guard. An estimator instance (and its scratch buffers) must only
//! serve one estimation at a time; concurrent runs need their own instances.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, warn};

use crate::error::{BoxError, Error, Result};
use crate::samplers::SubsetSelector;
use crate::settings::{check_iterations, check_unit_interval, EstimatorSettings};

/// Result type returned by listener callbacks that can fail.
pub type ListenerResult<T> = std::result::Result<T, BoxError>;

/// Robust estimation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RobustMethod {
    /// Maximise the inlier count under a fixed threshold.
    Ransac,
    /// Minimise the median residual.
    Lmeds,
    /// Minimise the median of threshold-capped residuals.
    Msac,
    /// Quality-guided progressive consensus.
    Prosac,
    /// Quality-guided progressive median.
    Promeds,
}

impl fmt::Display for RobustMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RobustMethod::Ransac => "RANSAC",
            RobustMethod::Lmeds => "LMedS",
            RobustMethod::Msac => "MSAC",
            RobustMethod::Prosac => "PROSAC",
            RobustMethod::Promeds => "PROMedS",
        };
        f.write_str(name)
    }
}

/// Problem description and lifecycle hooks supplied by the caller.
pub trait EstimatorListener {
    /// Candidate model type. The engine never looks inside it.
    type Model: Clone;

    /// Number of samples `N`.
    fn total_samples(&self) -> usize;

    /// Number of samples needed to fit a candidate.
    fn subset_size(&self) -> usize;

    /// Whether enough data is available to start an estimation.
    fn is_ready(&self) -> bool {
        let subset_size = self.subset_size();
        subset_size > 0 && self.total_samples() >= subset_size
    }

    /// Fit zero or more candidates from the samples in `subset` into
    /// `candidates`. The engine clears `candidates` before every call.
    fn estimate_candidates(
        &mut self,
        subset: &[usize],
        candidates: &mut Vec<Self::Model>,
    ) -> ListenerResult<()>;

    /// Non-negative residual of sample `index` against `candidate`.
    fn residual(&self, candidate: &Self::Model, index: usize) -> f64;

    fn on_estimate_start(&mut self, _estimator: &EstimatorBase) {}

    fn on_estimate_end(&mut self, _estimator: &EstimatorBase) {}

    fn on_estimate_next_iteration(&mut self, _estimator: &EstimatorBase, _iteration: usize) {}

    /// Called when progress in \[0, 1\] moved by more than the configured delta.
    fn on_estimate_progress_change(&mut self, _estimator: &EstimatorBase, _progress: f64) {}
}

/// Listener providing a fixed inlier threshold.
pub trait ThresholdListener: EstimatorListener {
    /// Residual threshold separating inliers from outliers. Must be
    /// non-negative.
    fn threshold(&self) -> f64;
}

/// Listener providing per-sample quality scores for progressive sampling.
pub trait QualityListener: EstimatorListener {
    /// One score per sample; higher scores are sampled first.
    fn quality_scores(&self) -> &[f64];

    /// Optional fixed threshold the progressive median policy classifies
    /// with in addition to its median-derived one.
    ///
    /// This is the only threshold PROMedS reads; it never calls
    /// [`ThresholdListener::threshold`]. A listener serving both the
    /// consensus and the progressive median policies forwards one to the
    /// other:
    ///
    /// ```
    /// use robust_fit::{EstimatorListener, ListenerResult, QualityListener, ThresholdListener};
    ///
    /// struct Points {
    ///     values: Vec<f64>,
    ///     scores: Vec<f64>,
    /// }
    ///
    /// impl EstimatorListener for Points {
    ///     type Model = f64;
    ///
    ///     fn total_samples(&self) -> usize {
    ///         self.values.len()
    ///     }
    ///
    ///     fn subset_size(&self) -> usize {
    ///         1
    ///     }
    ///
    ///     fn estimate_candidates(
    ///         &mut self,
    ///         subset: &[usize],
    ///         candidates: &mut Vec<f64>,
    ///     ) -> ListenerResult<()> {
    ///         candidates.push(self.values[subset[0]]);
    ///         Ok(())
    ///     }
    ///
    ///     fn residual(&self, candidate: &f64, index: usize) -> f64 {
    ///         (self.values[index] - candidate).abs()
    ///     }
    /// }
    ///
    /// impl ThresholdListener for Points {
    ///     fn threshold(&self) -> f64 {
    ///         0.25
    ///     }
    /// }
    ///
    /// impl QualityListener for Points {
    ///     fn quality_scores(&self) -> &[f64] {
    ///         &self.scores
    ///     }
    ///
    ///     fn inlier_threshold(&self) -> Option<f64> {
    ///         Some(self.threshold())
    ///     }
    /// }
    ///
    /// let points = Points { values: vec![1.0, 1.1, 9.0], scores: vec![0.9, 0.8, 0.1] };
    /// assert_eq!(points.inlier_threshold(), Some(points.threshold()));
    /// ```
    fn inlier_threshold(&self) -> Option<f64> {
        None
    }
}

/// Shared cancellation flag checked at the top of every iteration.
///
/// Cancelling stops sampling like a termination condition: the best model
/// found so far is returned, or the run fails if there is none.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Best model of a run with its snapshot and the iterations performed.
#[derive(Debug, Clone)]
pub struct EstimationResult<M, D> {
    /// The estimated model.
    pub model: M,
    /// Snapshot of the model's residuals, inliers and policy statistics.
    pub inliers: D,
    /// Number of iterations performed.
    pub iterations: usize,
}

/// Configuration, running flag and progress state shared by every policy.
#[derive(Debug, Clone)]
pub struct EstimatorBase {
    method: RobustMethod,
    settings: EstimatorSettings,
    locked: bool,
    iterations: usize,
    budget: usize,
    last_progress: f64,
    cancellation: Option<CancellationToken>,
}

impl EstimatorBase {
    /// Base with default settings.
    pub fn new(method: RobustMethod) -> Self {
        let settings = EstimatorSettings::default();
        Self {
            method,
            budget: settings.max_iterations,
            settings,
            locked: false,
            iterations: 0,
            last_progress: 0.0,
            cancellation: None,
        }
    }

    /// Base with validated settings.
    pub fn with_settings(method: RobustMethod, settings: EstimatorSettings) -> Result<Self> {
        settings.validate()?;
        let mut base = Self::new(method);
        base.budget = settings.max_iterations;
        base.settings = settings;
        Ok(base)
    }

    pub fn method(&self) -> RobustMethod {
        self.method
    }

    pub fn settings(&self) -> &EstimatorSettings {
        &self.settings
    }

    pub fn confidence(&self) -> f64 {
        self.settings.confidence
    }

    pub fn max_iterations(&self) -> usize {
        self.settings.max_iterations
    }

    pub fn progress_delta(&self) -> f64 {
        self.settings.progress_delta
    }

    /// Whether an estimation is running on this instance.
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Iterations completed by the current or last run.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Iteration budget adaptively required by the current or last run.
    pub fn iteration_budget(&self) -> usize {
        self.budget
    }

    pub fn set_confidence(&mut self, confidence: f64) -> Result<()> {
        self.check_unlocked()?;
        check_unit_interval("confidence", confidence)?;
        self.settings.confidence = confidence;
        Ok(())
    }

    pub fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        self.check_unlocked()?;
        check_iterations(max_iterations)?;
        self.settings.max_iterations = max_iterations;
        Ok(())
    }

    pub fn set_progress_delta(&mut self, progress_delta: f64) -> Result<()> {
        self.check_unlocked()?;
        check_unit_interval("progress_delta", progress_delta)?;
        self.settings.progress_delta = progress_delta;
        Ok(())
    }

    pub fn set_seed(&mut self, seed: Option<u64>) -> Result<()> {
        self.check_unlocked()?;
        self.settings.seed = seed;
        Ok(())
    }

    pub fn set_cancellation_token(&mut self, token: Option<CancellationToken>) -> Result<()> {
        self.check_unlocked()?;
        self.cancellation = token;
        Ok(())
    }

    pub(crate) fn check_unlocked(&self) -> Result<()> {
        if self.locked {
            Err(Error::Locked)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    /// Subset selector over `total` samples honouring the configured seed.
    pub(crate) fn subset_selector(&self, total: usize) -> SubsetSelector {
        match self.settings.seed {
            Some(seed) => SubsetSelector::from_seed(total, seed),
            None => SubsetSelector::new(total),
        }
    }

    pub(crate) fn set_budget(&mut self, budget: usize) {
        self.budget = budget;
    }

    /// Record a finished iteration and notify the listener, throttling
    /// progress notifications to changes larger than the progress delta.
    pub(crate) fn end_iteration<L: EstimatorListener>(
        &mut self,
        listener: &mut L,
        iteration: usize,
        progress: f64,
    ) {
        self.iterations = iteration;
        listener.on_estimate_next_iteration(self, iteration);

        let progress = progress.clamp(0.0, 1.0);
        if progress - self.last_progress > self.settings.progress_delta {
            self.last_progress = progress;
            listener.on_estimate_progress_change(self, progress);
        }
    }

    fn begin(&mut self) -> Result<()> {
        self.check_unlocked()?;
        self.locked = true;
        self.iterations = 0;
        self.budget = self.settings.max_iterations;
        self.last_progress = 0.0;
        Ok(())
    }
}

/// Common interface of the five policies.
pub trait RobustEstimator {
    type Model;
    /// Policy-specific snapshot returned with the best model.
    type InliersData;

    fn base(&self) -> &EstimatorBase;

    fn base_mut(&mut self) -> &mut EstimatorBase;

    /// Whether a listener is attached and reports it is ready.
    fn is_ready(&self) -> bool;

    /// Run the estimation and return the best model found.
    fn estimate(&mut self) -> Result<EstimationResult<Self::Model, Self::InliersData>>;

    fn method(&self) -> RobustMethod {
        self.base().method()
    }

    fn is_locked(&self) -> bool {
        self.base().is_locked()
    }

    fn set_confidence(&mut self, confidence: f64) -> Result<()> {
        self.base_mut().set_confidence(confidence)
    }

    fn set_max_iterations(&mut self, max_iterations: usize) -> Result<()> {
        self.base_mut().set_max_iterations(max_iterations)
    }

    fn set_progress_delta(&mut self, progress_delta: f64) -> Result<()> {
        self.base_mut().set_progress_delta(progress_delta)
    }
}

pub(crate) fn listener_ready<L: EstimatorListener>(listener: Option<&L>) -> bool {
    listener.is_some_and(|l| l.is_ready())
}

/// Ask the listener for candidates fitted from `subset`.
pub(crate) fn estimate_candidates<L: EstimatorListener>(
    listener: &mut L,
    subset: &[usize],
    candidates: &mut Vec<L::Model>,
) -> Result<()> {
    candidates.clear();
    listener
        .estimate_candidates(subset, candidates)
        .map_err(|source| Error::EstimationFailure {
            reason: "listener failed to estimate candidates".to_string(),
            source: Some(source),
        })
}

/// Shared lifecycle of an estimation: readiness and lock checks, start and
/// end callbacks, error wrapping, and releasing the lock on every path.
pub(crate) fn run_estimation<L, T>(
    base: &mut EstimatorBase,
    listener: Option<&mut L>,
    body: impl FnOnce(&mut EstimatorBase, &mut L) -> Result<T>,
) -> Result<T>
where
    L: EstimatorListener,
{
    base.check_unlocked()?;
    let listener = match listener {
        Some(listener) if listener.is_ready() => listener,
        _ => return Err(Error::NotReady),
    };

    base.begin()?;
    debug!(
        "{} estimation started: {} samples, subset size {}, confidence {}, max iterations {}",
        base.method,
        listener.total_samples(),
        listener.subset_size(),
        base.settings.confidence,
        base.settings.max_iterations
    );
    listener.on_estimate_start(base);

    let result = body(&mut *base, &mut *listener).map_err(Error::into_failure);

    listener.on_estimate_end(base);
    base.locked = false;

    match &result {
        Ok(_) => debug!(
            "{} estimation finished after {} iterations",
            base.method, base.iterations
        ),
        Err(err) => warn!(
            "{} estimation failed after {} iterations: {}",
            base.method, base.iterations, err
        ),
    }
    result
}

/// Failure reported when a run ends without any best candidate.
pub(crate) fn no_model_found(base: &EstimatorBase) -> Error {
    if base.is_cancelled() {
        Error::failure("estimation cancelled before any model was found")
    } else {
        Error::failure(format!(
            "no model found after {} iterations",
            base.iterations
        ))
    }
}
