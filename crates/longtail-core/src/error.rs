//! Error types for the longtail-core crate.
//!
//! Every configuration problem is fatal and reported before any computation
//! starts. Messages always carry the offending value.

use std::path::PathBuf;

use thiserror::Error;

/// Configuration error raised at construction time or at the start of `fit`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A name-selected component (encoder, optimizer, loss, ...) is unknown.
    #[error("Unknown {field} `{value}`")]
    UnknownVariant {
        /// The configuration field being parsed.
        field: &'static str,
        /// The value that did not match any known variant.
        value: String,
    },

    /// A numeric or structural value is out of its valid range.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// The configuration field being validated.
        field: &'static str,
        /// Description including the offending value.
        message: String,
    },

    /// A required data split is empty after preprocessing.
    #[error("Empty {split} split after preprocessing, check the dataset configuration")]
    EmptySplit {
        /// Name of the empty split.
        split: String,
    },

    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for [`crate::TrainerConfig`].
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Path of the configuration file.
        path: PathBuf,
        /// Underlying serde error, which names unknown variants.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }

    /// Shorthand for [`ConfigError::UnknownVariant`].
    pub fn unknown(field: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownVariant {
            field,
            value: value.into(),
        }
    }
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_offending_value() {
        let err = ConfigError::unknown("optimizer", "rmsprop");
        assert_eq!(err.to_string(), "Unknown optimizer `rmsprop`");

        let err = ConfigError::invalid("batch_size", "must be at least 2, got 1");
        assert!(err.to_string().contains("got 1"));

        let err = ConfigError::EmptySplit {
            split: "valid".to_string(),
        };
        assert!(err.to_string().contains("valid"));
    }
}
