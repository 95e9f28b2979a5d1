//! Error types for robust estimation.

/// Boxed error type used to carry a cause inside [`Error::EstimationFailure`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Robust estimation error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration value outside of its declared range
    #[error("Invalid configuration: {name} = {value}")]
    Configuration {
        /// Name of the rejected parameter
        name: &'static str,
        /// Rejected value, rendered for display
        value: String,
    },

    /// No listener attached, or the listener reports missing data
    #[error("Estimator is not ready")]
    NotReady,

    /// An estimation is currently running on this instance
    #[error("Estimator is locked while an estimation is running")]
    Locked,

    /// Not enough samples to draw a subset of the requested size
    #[error("Insufficient samples: need {required}, have {available}")]
    InsufficientSamples {
        /// Number of samples the request needs
        required: usize,
        /// Number of samples available to the selector
        available: usize,
    },

    /// Requested subset size is zero or does not fit the output buffer / range
    #[error("Invalid subset size {size} (capacity {capacity})")]
    InvalidSize {
        /// Requested subset size
        size: usize,
        /// Capacity available for it
        capacity: usize,
    },

    /// Empty or inverted sampling range
    #[error("Invalid sample range [{lo}, {hi})")]
    InvalidRange {
        /// Lower (inclusive) bound
        lo: usize,
        /// Upper (exclusive) bound
        hi: usize,
    },

    /// The run could not produce a model
    #[error("Estimation failed: {reason}")]
    EstimationFailure {
        /// Human readable reason
        reason: String,
        /// Original cause, when the failure wraps another error
        #[source]
        source: Option<BoxError>,
    },
}

impl Error {
    pub(crate) fn configuration(name: &'static str, value: impl ToString) -> Self {
        Error::Configuration {
            name,
            value: value.to_string(),
        }
    }

    pub(crate) fn failure(reason: impl Into<String>) -> Self {
        Error::EstimationFailure {
            reason: reason.into(),
            source: None,
        }
    }

    /// Wrap an error raised inside the run loop into an `EstimationFailure`,
    /// leaving errors that already are failures untouched.
    pub(crate) fn into_failure(self) -> Self {
        match self {
            err @ Error::EstimationFailure { .. } => err,
            other => Error::EstimationFailure {
                reason: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Whether this is an `EstimationFailure`.
    pub fn is_estimation_failure(&self) -> bool {
        matches!(self, Error::EstimationFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn selector_errors_are_wrapped_with_cause() {
        let err = Error::InsufficientSamples {
            required: 4,
            available: 2,
        }
        .into_failure();

        assert!(err.is_estimation_failure());
        let source = err.source().expect("wrapped error keeps its cause");
        assert!(source.to_string().contains("need 4"));
    }

    #[test]
    fn failures_are_not_double_wrapped() {
        let err = Error::failure("no candidate").into_failure();
        match err {
            Error::EstimationFailure { reason, source } => {
                assert_eq!(reason, "no candidate");
                assert!(source.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
