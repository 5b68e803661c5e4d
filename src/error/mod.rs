//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error types for the vital-sign relay core
//!
//! This module provides structured error types with optional sources and
//! retryability classification for all components of the relay.

use std::error::Error as StdError;
use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// Main error type for the relay
#[derive(Error, Debug)]
pub enum RelayError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Report validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Forwarding errors (collector rejected or misbehaved)
    #[error("Forwarding error: {message}")]
    Forwarding {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Network and communication errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl RelayError {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        RelayError::Configuration {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source
    pub fn configuration_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        RelayError::Configuration {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        RelayError::Validation {
            message: message.into(),
            source: None,
        }
    }

    /// Create a validation error with source
    pub fn validation_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        RelayError::Validation {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a forwarding error
    pub fn forwarding(message: impl Into<String>) -> Self {
        RelayError::Forwarding {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        RelayError::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        RelayError::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a timeout error
    pub fn timeout(message: impl Into<String>) -> Self {
        RelayError::Timeout {
            message: message.into(),
            source: None,
        }
    }

    /// Create a serialization error with source
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        RelayError::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        RelayError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RelayError::Network { .. } | RelayError::Timeout { .. } | RelayError::Forwarding { .. }
        )
    }

    /// Check if the error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, RelayError::Network { .. } | RelayError::Timeout { .. })
    }

    /// Check if the error is permanent
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RelayError::Configuration { .. } | RelayError::Validation { .. }
        )
    }

    /// Get the error type as a string
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Configuration { .. } => "Configuration",
            RelayError::Validation { .. } => "Validation",
            RelayError::Forwarding { .. } => "Forwarding",
            RelayError::Network { .. } => "Network",
            RelayError::Timeout { .. } => "Timeout",
            RelayError::Serialization { .. } => "Serialization",
            RelayError::Internal { .. } => "Internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let config_err = RelayError::configuration("Invalid config");
        assert!(matches!(config_err, RelayError::Configuration { .. }));
        assert!(!config_err.is_retryable());
        assert!(config_err.is_permanent());

        let network_err = RelayError::network("Connection failed");
        assert!(matches!(network_err, RelayError::Network { .. }));
        assert!(network_err.is_retryable());
        assert!(network_err.is_transient());
    }

    #[test]
    fn test_error_classification() {
        let err = RelayError::timeout("Collector timed out");
        assert_eq!(err.error_type(), "Timeout");
        assert!(err.is_retryable());
        assert!(err.is_transient());
        assert!(!err.is_permanent());

        let err = RelayError::forwarding("Collector responded 503");
        assert!(err.is_retryable());
        assert!(!err.is_transient());
    }
}
