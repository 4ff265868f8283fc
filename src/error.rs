//! Error types for credit metering and background removal operations

use thiserror::Error;

/// Result type alias for credit and removal operations
pub type Result<T> = std::result::Result<T, CreditsError>;

/// Error types for credit metering and background removal operations
#[derive(Error, Debug)]
pub enum CreditsError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Account or history record could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Image decoding errors while inspecting an upload
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Remote credit store errors
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Upload rejected before any credit check (wrong type, too large)
    #[error("{0}")]
    Validation(String),

    /// Not enough credits left for the requested operation
    #[error("Insufficient credits: {requested} requested, {available} available")]
    InsufficientCredits {
        /// Credits the operation needed
        requested: u32,
        /// Credits left in the account
        available: u32,
    },

    /// Failure reported by the background removal engine
    #[error("{0}")]
    Engine(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CreditsError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new engine error
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        Self::Engine(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create network error with operation context
    pub fn network_error<E: std::fmt::Display>(operation: &str, error: E) -> Self {
        Self::Network(format!("{}: {}", operation, error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create engine error with the command or stage that failed
    pub fn engine_failure(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Engine(format!(
            "Background removal failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }

    /// Whether the error happened before any credit was spent
    #[must_use]
    pub fn is_pre_debit(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::InsufficientCredits { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = CreditsError::invalid_config("test config error");
        assert!(matches!(err, CreditsError::InvalidConfig(_)));

        let err = CreditsError::validation("Invalid file type. Please upload an image.");
        assert!(matches!(err, CreditsError::Validation(_)));
        assert!(err.is_pre_debit());

        let err = CreditsError::engine("model crashed");
        assert!(!err.is_pre_debit());
    }

    #[test]
    fn test_error_display() {
        let err = CreditsError::invalid_config("Invalid storage directory");
        assert_eq!(err.to_string(), "Invalid configuration: Invalid storage directory");

        let err = CreditsError::InsufficientCredits {
            requested: 1,
            available: 0,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits: 1 requested, 0 available"
        );

        // Validation and engine messages are user-facing and pass through unchanged
        let err = CreditsError::validation("File size exceeds the 5MB limit.");
        assert_eq!(err.to_string(), "File size exceeds the 5MB limit.");
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = CreditsError::file_io_error(
            "write credits record",
            Path::new("/data/userCredits.json"),
            &io_error,
        );
        let error_string = err.to_string();
        assert!(error_string.contains("write credits record"));
        assert!(error_string.contains("/data/userCredits.json"));

        let err = CreditsError::config_value_error("HTTP timeout", 0, "1-300 seconds", Some(30));
        let error_string = err.to_string();
        assert!(error_string.contains("HTTP timeout"));
        assert!(error_string.contains("1-300 seconds"));
        assert!(error_string.contains("Recommended: 30"));

        let err = CreditsError::engine_failure("spawn", "binary not found", Some("cat.png"));
        let error_string = err.to_string();
        assert!(error_string.contains("spawn"));
        assert!(error_string.contains("cat.png"));

        let err = CreditsError::network_error("GET /credits", "connection refused");
        assert_eq!(err.to_string(), "Network error: GET /credits: connection refused");
    }
}
