//! Robust estimation policies.
//!
//! Each policy drives a listener through the same draw, fit and score loop
//! and differs in how candidates are scored and when the loop stops:
//! - RANSAC: inlier count under a fixed threshold
//! - LMedS: median residual, threshold derived from it
//! - MSAC: median of residuals capped at a fixed threshold
//! - PROSAC: inlier count with quality-guided sampling
//! - PROMedS: median residual with quality-guided sampling

pub mod lmeds;
pub mod msac;
pub mod promeds;
pub mod prosac;
pub mod ransac;

pub use lmeds::LmedsEstimator;
pub use msac::{ConsensusRecord, MsacEstimator, MsacReport};
pub use promeds::PromedsEstimator;
pub use prosac::ProsacEstimator;
pub use ransac::RansacEstimator;
