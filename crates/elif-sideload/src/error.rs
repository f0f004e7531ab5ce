//! Error types for sideloading
//!
//! Configuration problems (a bad schema declaration, two prefetches fighting
//! over one attachment point) are programming mistakes and surface as
//! server errors. Request validation problems carry field-keyed messages and
//! surface as 400 responses.

use thiserror::Error;

use crate::validation::{ValidationError, ValidationErrors};

/// Result type alias for sideloading operations
pub type SideloadResult<T> = Result<T, SideloadError>;

/// Result type alias for collaborator (ORM) operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Errors raised while resolving a sideloaded response
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SideloadError {
    /// Malformed relation schema declaration
    #[error("Schema configuration error: {message}")]
    Schema { message: String },

    /// Two prefetch directives compete for one attachment point
    #[error("Prefetch collision on '{attachment_key}': {message}")]
    PrefetchCollision {
        attachment_key: String,
        message: String,
    },

    /// Internal consistency assertion failed
    #[error("Internal sideloading error: {message}")]
    Internal { message: String },

    /// The request's query parameters are invalid
    #[error("{0}")]
    Validation(ValidationErrors),

    /// The ORM collaborator failed
    #[error(transparent)]
    Orm(#[from] OrmError),
}

impl SideloadError {
    /// Create a schema configuration error
    pub fn schema<T: Into<String>>(message: T) -> Self {
        SideloadError::Schema {
            message: message.into(),
        }
    }

    /// Create a prefetch collision error
    pub fn collision<K: Into<String>, T: Into<String>>(attachment_key: K, message: T) -> Self {
        SideloadError::PrefetchCollision {
            attachment_key: attachment_key.into(),
            message: message.into(),
        }
    }

    /// Create an internal consistency error
    pub fn internal<T: Into<String>>(message: T) -> Self {
        SideloadError::Internal {
            message: message.into(),
        }
    }

    /// Create a validation error for a single query parameter
    pub fn validation<F: Into<String>, T: Into<String>>(field: F, message: T) -> Self {
        SideloadError::Validation(ValidationError::new(field, message).into())
    }

    /// Whether the error is caused by client input rather than deployment
    pub fn is_client_error(&self) -> bool {
        matches!(self, SideloadError::Validation(_))
    }

    /// Get error code for consistent API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            SideloadError::Schema { .. } => "SIDELOAD_SCHEMA_ERROR",
            SideloadError::PrefetchCollision { .. } => "SIDELOAD_PREFETCH_COLLISION",
            SideloadError::Internal { .. } => "SIDELOAD_INTERNAL_ERROR",
            SideloadError::Validation(_) => "VALIDATION_ERROR",
            SideloadError::Orm(_) => "DATABASE_ERROR",
        }
    }
}

impl From<ValidationError> for SideloadError {
    fn from(error: ValidationError) -> Self {
        SideloadError::Validation(error.into())
    }
}

impl From<ValidationErrors> for SideloadError {
    fn from(errors: ValidationErrors) -> Self {
        SideloadError::Validation(errors)
    }
}

/// Errors reported by the ORM collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Database connection or query error
    #[error("Database error: {0}")]
    Database(String),

    /// Record not found
    #[error("Record not found in table '{0}'")]
    NotFound(String),

    /// Query building error
    #[error("Query error: {0}")]
    Query(String),

    /// Relationship traversal failed
    #[error("Relationship error: {0}")]
    Relationship(String),
}
