//! Sampling strategies for the robust estimators.
//!
//! `SubsetSelector` draws uniform minimal subsets and is used by every
//! policy. `ProgressiveWindow` layers the quality-guided growth function of
//! the progressive policies on top of it.

pub mod progressive;
pub mod subset;

pub use progressive::ProgressiveWindow;
pub use subset::SubsetSelector;
