//! Error types for the sift library.
//!
//! All fallible operations return [`SiftError`] through the [`Result`] alias.
//! The variants follow the failure classes of the library: field preparation
//! and conversion errors are loud and reach the caller, attribute errors come
//! from the dotted-path resolver and identity parsing, and backend errors are
//! produced by [`SearchBackend`](crate::backend::SearchBackend) implementations
//! but never escape [`GuardedBackend`](crate::backend::GuardedBackend).
//!
//! # Examples
//!
//! ```
//! use sift::error::{Result, SiftError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(SiftError::attribute("no attribute 'y0_0_0d'"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for sift operations.
#[derive(Error, Debug)]
pub enum SiftError {
    /// A field descriptor could not resolve its configured path.
    #[error("Field resolution error: {0}")]
    FieldResolution(String),

    /// A value could not be coerced into the field's semantic type.
    #[error("Field conversion error: {0}")]
    FieldConversion(String),

    /// An attribute path or identity string could not be resolved.
    #[error("Attribute error: {0}")]
    Attribute(String),

    /// The search backend failed.
    #[error("Backend error: {0}")]
    Backend(String),

    /// A model type has no registered index.
    #[error("Not registered: {0}")]
    NotRegistered(String),

    /// A model type was registered twice.
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// The operation is not supported in the current state.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// A backend query string could not be parsed.
    #[error("Query error: {0}")]
    Query(String),

    /// Template rendering failed.
    #[error("Template error: {0}")]
    Template(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors (config files, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Result type alias for operations that may fail with SiftError.
pub type Result<T> = std::result::Result<T, SiftError>;

impl SiftError {
    /// Create a new field resolution error.
    pub fn field<S: Into<String>>(msg: S) -> Self {
        SiftError::FieldResolution(msg.into())
    }

    /// Create a new field conversion error.
    pub fn conversion<S: Into<String>>(msg: S) -> Self {
        SiftError::FieldConversion(msg.into())
    }

    /// Create a new attribute error.
    pub fn attribute<S: Into<String>>(msg: S) -> Self {
        SiftError::Attribute(msg.into())
    }

    /// Create a new backend error.
    pub fn backend<S: Into<String>>(msg: S) -> Self {
        SiftError::Backend(msg.into())
    }

    /// Create a new not-registered error.
    pub fn not_registered<S: Into<String>>(msg: S) -> Self {
        SiftError::NotRegistered(msg.into())
    }

    /// Create a new unsupported operation error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        SiftError::Unsupported(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        SiftError::Query(msg.into())
    }

    /// Create a new parse error.
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        SiftError::Query(msg.into()) // Parse errors are treated as query errors
    }

    /// Create a new template error.
    pub fn template<S: Into<String>>(msg: S) -> Self {
        SiftError::Template(msg.into())
    }

    /// Create a new serialization error.
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        SiftError::Serialization(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        SiftError::Other(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        SiftError::Other(format!("Invalid configuration: {}", msg.into()))
    }

    /// Whether this error came from the search backend.
    pub fn is_backend(&self) -> bool {
        matches!(self, SiftError::Backend(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = SiftError::field("The model has no model_attr 'foo'");
        assert_eq!(
            error.to_string(),
            "Field resolution error: The model has no model_attr 'foo'"
        );

        let error = SiftError::attribute("'Result' object has no attribute 'y0_0_0d'");
        assert_eq!(
            error.to_string(),
            "Attribute error: 'Result' object has no attribute 'y0_0_0d'"
        );

        let error = SiftError::unsupported("Not supported");
        assert_eq!(error.to_string(), "Unsupported operation: Not supported");
        assert!(SiftError::backend("down").is_backend());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let sift_error = SiftError::from(io_error);

        match sift_error {
            SiftError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
