//! # robust_fit - generic robust model fitting
//!
//! `robust_fit` fits a model to data contaminated by outliers. The crate knows
//! nothing about the model itself: the caller implements a listener that fits
//! candidate models from minimal subsets of sample indices and measures the
//! residual of any sample against a candidate. The estimators decide which
//! subsets to draw, how to score candidates and when to stop.
//!
//! Five policies are provided:
//!
//! - [`RansacEstimator`]: maximise the inlier count under a fixed threshold
//! - [`LmedsEstimator`]: minimise the median residual, no threshold needed
//! - [`MsacEstimator`]: minimise the median of residuals capped at a threshold
//! - [`ProsacEstimator`]: RANSAC with quality-guided sampling
//! - [`PromedsEstimator`]: LMedS with quality-guided sampling
//!
//! ## Quick Start
//!
//! ```rust
//! use robust_fit::{
//!     EstimatorListener, ListenerResult, RansacEstimator, RobustEstimator, ThresholdListener,
//! };
//!
//! /// Estimate a constant from scalar measurements.
//! struct Mean {
//!     values: Vec<f64>,
//! }
//!
//! impl EstimatorListener for Mean {
//!     type Model = f64;
//!
//!     fn total_samples(&self) -> usize {
//!         self.values.len()
//!     }
//!
//!     fn subset_size(&self) -> usize {
//!         1
//!     }
//!
//!     fn estimate_candidates(
//!         &mut self,
//!         subset: &[usize],
//!         candidates: &mut Vec<f64>,
//!     ) -> ListenerResult<()> {
//!         candidates.push(self.values[subset[0]]);
//!         Ok(())
//!     }
//!
//!     fn residual(&self, candidate: &f64, index: usize) -> f64 {
//!         (self.values[index] - candidate).abs()
//!     }
//! }
//!
//! impl ThresholdListener for Mean {
//!     fn threshold(&self) -> f64 {
//!         0.5
//!     }
//! }
//!
//! let values = vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 40.0, -7.0];
//! let mut ransac = RansacEstimator::with_listener(Mean { values });
//! ransac.base_mut().set_seed(Some(7)).unwrap();
//!
//! let result = ransac.estimate().unwrap();
//! assert_eq!(result.model, 1.0);
//! assert_eq!(result.inliers.num_inliers(), 6);
//! ```
//!
//! ## Modules
//!
//! - **[`core`](core)**: listener traits, shared estimator state and lifecycle
//! - **[`estimators`](estimators)**: the five policies
//! - **[`samplers`](samplers)**: uniform and progressive subset selection
//! - **[`scoring`](scoring)**: inlier snapshots and per-policy scoring
//! - **[`termination`](termination)**: adaptive iteration budgets
//! - **[`settings`](settings)**: configuration types and defaults

pub mod core;
pub mod error;
pub mod estimators;
pub mod samplers;
pub mod scoring;
pub mod settings;
pub mod termination;
pub mod utils;

pub use crate::core::{
    CancellationToken, EstimationResult, EstimatorBase, EstimatorListener, ListenerResult,
    QualityListener, RobustEstimator, RobustMethod, ThresholdListener,
};
pub use crate::error::{Error, Result};
pub use crate::estimators::{
    ConsensusRecord, LmedsEstimator, MsacEstimator, MsacReport, PromedsEstimator,
    ProsacEstimator, RansacEstimator,
};
pub use crate::samplers::{ProgressiveWindow, SubsetSelector};
pub use crate::scoring::{InliersData, LmedsInliersData, MsacInliersData, PromedsInliersData};
pub use crate::settings::{
    ConsensusSettings, EstimatorSettings, MedianSettings, ProgressiveSettings, PromedsSettings,
};
pub use crate::termination::required_iterations;
