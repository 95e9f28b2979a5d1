//! Configuration types for the robust estimators.
//!
//! Each struct is plain data with a `Default` matching the documented
//! defaults, plus a `validate` method used by the estimator constructors.
//! Individual setters on the estimators go through the same range checks,
//! so an out-of-range value is rejected before anything is stored.

use crate::error::{Error, Result};

/// Default confidence of finding an all-inlier subset.
pub const DEFAULT_CONFIDENCE: f64 = 0.99;
/// Default iteration cap.
pub const DEFAULT_MAX_ITERATIONS: usize = 5000;
/// Default minimum progress change between two progress notifications.
pub const DEFAULT_PROGRESS_DELTA: f64 = 0.05;
/// Default threshold below which median-based policies stop early.
pub const DEFAULT_STOP_THRESHOLD: f64 = 1e-3;
/// Default factor applied to the median residual to derive the inlier threshold.
pub const DEFAULT_INLIER_FACTOR: f64 = 1.0;
/// Default probability of rejecting a good model in the progressive policies.
pub const DEFAULT_ETA0: f64 = 0.05;
/// Default probability that an incorrect model is supported by a random sample.
pub const DEFAULT_BETA: f64 = 0.01;
/// Default worst-case outlier proportion bounding the progressive policies.
pub const DEFAULT_MAX_OUTLIERS_PROPORTION: f64 = 0.8;

/// Robust scale constant relating the median absolute deviation to a
/// standard deviation under Gaussian noise.
pub const STD_CONSTANT: f64 = 1.4826;
/// Chi-squared value with one degree of freedom for a 10% tail.
pub const CHI_SQUARED: f64 = 2.706;

pub(crate) fn check_unit_interval(name: &'static str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::configuration(name, value))
    }
}

pub(crate) fn check_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value >= 0.0 {
        Ok(())
    } else {
        Err(Error::configuration(name, value))
    }
}

pub(crate) fn check_positive(name: &'static str, value: f64) -> Result<()> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(Error::configuration(name, value))
    }
}

pub(crate) fn check_iterations(value: usize) -> Result<()> {
    if value >= 1 {
        Ok(())
    } else {
        Err(Error::configuration("max_iterations", value))
    }
}

/// Settings shared by every estimator.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EstimatorSettings {
    /// Desired confidence in \[0, 1\].
    pub confidence: f64,
    /// Maximum number of iterations, at least 1.
    pub max_iterations: usize,
    /// Progress change in \[0, 1\] required before notifying the listener again.
    pub progress_delta: f64,
    /// Fixed RNG seed for reproducible sampling.
    pub seed: Option<u64>,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            confidence: DEFAULT_CONFIDENCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            progress_delta: DEFAULT_PROGRESS_DELTA,
            seed: None,
        }
    }
}

impl EstimatorSettings {
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("confidence", self.confidence)?;
        check_iterations(self.max_iterations)?;
        check_unit_interval("progress_delta", self.progress_delta)
    }
}

/// Which parts of the best snapshot a consensus-style result keeps.
///
/// Large sample sets can skip the per-sample vectors when only the model
/// and the inlier count are needed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsensusSettings {
    pub keep_inliers: bool,
    pub keep_residuals: bool,
}

/// Settings of the median-based policies.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MedianSettings {
    /// Derived threshold at or below which the run stops early.
    pub stop_threshold: f64,
    /// Factor applied to the median residual to obtain the inlier threshold.
    pub inlier_factor: f64,
}

impl Default for MedianSettings {
    fn default() -> Self {
        Self {
            stop_threshold: DEFAULT_STOP_THRESHOLD,
            inlier_factor: DEFAULT_INLIER_FACTOR,
        }
    }
}

impl MedianSettings {
    pub fn validate(&self) -> Result<()> {
        check_non_negative("stop_threshold", self.stop_threshold)?;
        check_positive("inlier_factor", self.inlier_factor)
    }
}

/// Settings of the quality-guided progressive policies.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProgressiveSettings {
    /// Probability of missing a better termination length.
    pub eta0: f64,
    /// Probability that an incorrect model scores a sample as inlier.
    pub beta: f64,
    /// Worst-case outlier proportion used for the global iteration budget.
    pub max_outliers_proportion: f64,
}

impl Default for ProgressiveSettings {
    fn default() -> Self {
        Self {
            eta0: DEFAULT_ETA0,
            beta: DEFAULT_BETA,
            max_outliers_proportion: DEFAULT_MAX_OUTLIERS_PROPORTION,
        }
    }
}

impl ProgressiveSettings {
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("eta0", self.eta0)?;
        check_unit_interval("beta", self.beta)?;
        check_unit_interval("max_outliers_proportion", self.max_outliers_proportion)
    }
}

/// Extra switches of the progressive median policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PromedsSettings {
    /// Stop as soon as the derived threshold drops to the stop threshold.
    pub stop_threshold_enabled: bool,
    /// Also classify with the listener's fixed threshold when one is given.
    pub use_inlier_thresholds: bool,
}

impl Default for PromedsSettings {
    fn default() -> Self {
        Self {
            stop_threshold_enabled: true,
            use_inlier_thresholds: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(EstimatorSettings::default().validate().is_ok());
        assert!(MedianSettings::default().validate().is_ok());
        assert!(ProgressiveSettings::default().validate().is_ok());

        let cfg = EstimatorSettings::default();
        assert_eq!(cfg.max_iterations, 5000);
        assert!((cfg.confidence - 0.99).abs() < 1e-12);
        assert!((cfg.progress_delta - 0.05).abs() < 1e-12);
        assert_eq!(cfg.seed, None);

        let promeds = PromedsSettings::default();
        assert!(promeds.stop_threshold_enabled);
        assert!(promeds.use_inlier_thresholds);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cfg = EstimatorSettings {
            confidence: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(Error::Configuration { name: "confidence", .. })
        ));

        let cfg = EstimatorSettings {
            max_iterations: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let median = MedianSettings {
            inlier_factor: 0.0,
            ..Default::default()
        };
        assert!(median.validate().is_err());

        let progressive = ProgressiveSettings {
            beta: -0.1,
            ..Default::default()
        };
        assert!(progressive.validate().is_err());
    }
}
