//! Error types for the ban engine.

use proxy_jail_geo::GeoError;
use thiserror::Error;

/// Errors that can occur while building or feeding the ban engine.
#[derive(Debug, Error)]
pub enum JailError {
    /// A whitelist rule could not be parsed.
    #[error("Invalid whitelist rule {rule:?}: {reason}")]
    InvalidRule {
        /// The rule as configured.
        rule: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A whitelist rule is not IPv4.
    #[error("Whitelist rule {0:?} is not IPv4")]
    UnsupportedFamily(String),

    /// No ban logger was supplied.
    #[error("A ban logger is required")]
    MissingLogger,

    /// The dispatcher's consumer is no longer running.
    #[error("Dispatcher is no longer accepting events")]
    DispatcherClosed,

    /// Geo database error.
    #[error(transparent)]
    Geo(#[from] GeoError),
}

/// Result type for ban engine operations.
pub type JailResult<T> = Result<T, JailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_rule() {
        let err = JailError::InvalidRule {
            rule: "10.0.0.0/33".into(),
            reason: "invalid prefix length".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("10.0.0.0/33"));
        assert!(msg.contains("invalid prefix length"));
    }

    #[test]
    fn test_error_display_family() {
        let err = JailError::UnsupportedFamily("::1".into());
        assert!(err.to_string().contains("not IPv4"));
    }

    #[test]
    fn test_error_display_missing_logger() {
        assert!(JailError::MissingLogger.to_string().contains("logger"));
    }

    #[test]
    fn test_geo_error_converts() {
        let err: JailError = GeoError::NotRegularFile("/tmp/x".into()).into();
        assert!(matches!(err, JailError::Geo(_)));
        assert!(err.to_string().contains("/tmp/x"));
    }
}
