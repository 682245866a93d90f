//! Error types for BioGraph.
//!
//! Every fallible operation in the crate returns [`BioGraphError`]. The variants
//! group into a small number of categories (see [`ErrorKind`]) so callers can
//! react to "not found" differently from "the store is down".

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the BioGraph library.
#[derive(Debug, Error)]
pub enum BioGraphError {
    // Lookup errors
    #[error("Model not found: {tag}")]
    ModelNotFound { tag: String },

    #[error("No model description available for {tag}")]
    SourceNotFound { tag: String },

    #[error("Mapping schema not found: {0}")]
    SchemaNotFound(PathBuf),

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Mapping errors
    #[error("Failed to map description for {tag}: {message}")]
    Mapping { tag: String, message: String },

    // Store errors
    #[error("Graph store error: {message}")]
    Store {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for BioGraph operations.
pub type Result<T> = std::result::Result<T, BioGraphError>;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Mapping,
    Store,
    Cancelled,
    Internal,
}

impl From<std::io::Error> for BioGraphError {
    fn from(err: std::io::Error) -> Self {
        BioGraphError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BioGraphError {
    fn from(err: serde_json::Error) -> Self {
        BioGraphError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for BioGraphError {
    fn from(err: rusqlite::Error) -> Self {
        BioGraphError::Store {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BioGraphError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BioGraphError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BioGraphError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a mapping error for a tag.
    pub fn mapping(tag: impl Into<String>, message: impl Into<String>) -> Self {
        BioGraphError::Mapping {
            tag: tag.into(),
            message: message.into(),
        }
    }

    /// Create a store error that has no underlying driver error.
    pub fn store(message: impl Into<String>) -> Self {
        BioGraphError::Store {
            message: message.into(),
            source: None,
        }
    }

    /// The category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            BioGraphError::ModelNotFound { .. }
            | BioGraphError::SourceNotFound { .. }
            | BioGraphError::SchemaNotFound(_) => ErrorKind::NotFound,

            BioGraphError::Validation { .. } => ErrorKind::Validation,

            BioGraphError::Mapping { .. } => ErrorKind::Mapping,

            BioGraphError::Store { .. } => ErrorKind::Store,

            BioGraphError::Cancelled => ErrorKind::Cancelled,

            BioGraphError::Io { .. } | BioGraphError::Json { .. } | BioGraphError::Other(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Process exit code used by the command-line front end.
    ///
    /// - 2: not found
    /// - 3: validation
    /// - 4: mapping
    /// - 5: store
    /// - 130: cancelled
    /// - 1: anything else
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::NotFound => 2,
            ErrorKind::Validation => 3,
            ErrorKind::Mapping => 4,
            ErrorKind::Store => 5,
            ErrorKind::Cancelled => 130,
            ErrorKind::Internal => 1,
        }
    }

    /// Check if this error is a "not found" condition.
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BioGraphError::ModelNotFound {
            tag: "BIOMD0000000001".into(),
        };
        assert_eq!(err.to_string(), "Model not found: BIOMD0000000001");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            BioGraphError::SourceNotFound { tag: "x".into() }.kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            BioGraphError::validation("schema", "bad extension").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            BioGraphError::mapping("x", "no model element").kind(),
            ErrorKind::Mapping
        );
        assert_eq!(BioGraphError::store("locked").kind(), ErrorKind::Store);
        assert_eq!(BioGraphError::Cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            BioGraphError::ModelNotFound { tag: "x".into() }.exit_code(),
            2
        );
        assert_eq!(BioGraphError::Cancelled.exit_code(), 130);
        assert_eq!(BioGraphError::Other("boom".into()).exit_code(), 1);
    }

    #[test]
    fn test_rusqlite_conversion() {
        let err: BioGraphError = rusqlite::Error::InvalidQuery.into();
        assert_eq!(err.kind(), ErrorKind::Store);
    }
}
