//! Error types for ActiveModel operations.
//!
//! This module provides the `ActiveModelError` enum for handling errors
//! that occur while reading, binding or persisting model attributes.

/// Error type for ActiveModel operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveModelError {
    /// Posted value could not be bound onto the attribute
    InvalidValueType {
        attribute: String,
        expected: String,
        actual: String,
    },
    /// Attribute not found on the model
    AttributeNotFound(String),
    /// Primary key required but not set
    PrimaryKeyRequired,
    /// Model could not be converted to or from its JSON representation
    Serialization(String),
    /// Other error
    Other(String),
}

impl std::fmt::Display for ActiveModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveModelError::InvalidValueType {
                attribute,
                expected,
                actual,
            } => write!(
                f,
                "Invalid value for attribute {}: expected {}, got {}",
                attribute, expected, actual
            ),
            ActiveModelError::AttributeNotFound(attribute) => {
                write!(f, "Attribute not found: {}", attribute)
            }
            ActiveModelError::PrimaryKeyRequired => {
                write!(f, "Primary key is required for this operation")
            }
            ActiveModelError::Serialization(msg) => {
                write!(f, "Serialization error: {}", msg)
            }
            ActiveModelError::Other(msg) => write!(f, "ActiveModel error: {}", msg),
        }
    }
}

impl std::error::Error for ActiveModelError {}

impl From<serde_json::Error> for ActiveModelError {
    fn from(err: serde_json::Error) -> Self {
        ActiveModelError::Serialization(err.to_string())
    }
}
