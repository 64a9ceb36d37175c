//! Error types for the caching layer
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for cache construction and cache operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// A configuration value or operation argument was rejected
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An object graph could not be sized.
    ///
    /// Never escapes `SizeEstimator::sizeof`, which logs it and substitutes
    /// the configured header constant.
    #[error("Size estimation failed: {0}")]
    EstimationFailure(String),

    /// Malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CacheError {
    /// Shorthand for building an [`CacheError::InvalidArgument`].
    pub fn invalid(msg: impl Into<String>) -> Self {
        CacheError::InvalidArgument(msg.into())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the caching layer.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CacheError::invalid("maximum size must be >= 0");
        assert_eq!(
            err.to_string(),
            "Invalid argument: maximum size must be >= 0"
        );

        let err = CacheError::EstimationFailure("depth limit".to_string());
        assert_eq!(err.to_string(), "Size estimation failed: depth limit");
    }
}
