//! HTTP error types for sideloadable views
//!
//! Request validation failures answer 400 with the field-keyed body
//! `{"<param>": ["<message>"]}`. Schema and prefetch configuration mistakes
//! answer 500, since they are deployment bugs rather than bad input.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use elif_sideload::{ConfigError, OrmError, SideloadError, ValidationErrors};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Result type for HTTP operations
pub type HttpResult<T> = Result<T, HttpError>;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("{0}")]
    Validation(ValidationErrors),

    #[error("Invalid request: {message}")]
    BadRequest { message: String },

    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Database error: {message}")]
    DatabaseError { message: String },

    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

impl HttpError {
    /// Create a bad request error
    pub fn bad_request<T: Into<String>>(message: T) -> Self {
        HttpError::BadRequest {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<T: Into<String>>(resource: T) -> Self {
        HttpError::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(message: T) -> Self {
        HttpError::ConfigError {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(message: T) -> Self {
        HttpError::InternalError {
            message: message.into(),
        }
    }

    /// Get the appropriate HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            HttpError::Validation(_) => StatusCode::BAD_REQUEST,
            HttpError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            HttpError::NotFound { .. } => StatusCode::NOT_FOUND,
            HttpError::ConfigError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::DatabaseError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            HttpError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get error code for consistent API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            HttpError::Validation(_) => "VALIDATION_ERROR",
            HttpError::BadRequest { .. } => "BAD_REQUEST",
            HttpError::NotFound { .. } => "NOT_FOUND",
            HttpError::ConfigError { .. } => "CONFIG_ERROR",
            HttpError::DatabaseError { .. } => "DATABASE_ERROR",
            HttpError::InternalError { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<SideloadError> for HttpError {
    fn from(err: SideloadError) -> Self {
        match err {
            SideloadError::Validation(errors) => HttpError::Validation(errors),
            SideloadError::Orm(OrmError::NotFound(resource)) => HttpError::NotFound { resource },
            SideloadError::Orm(orm) => HttpError::DatabaseError {
                message: orm.to_string(),
            },
            SideloadError::Schema { .. } | SideloadError::PrefetchCollision { .. } => {
                HttpError::config(err.to_string())
            }
            SideloadError::Internal { .. } => HttpError::internal(err.to_string()),
        }
    }
}

impl From<OrmError> for HttpError {
    fn from(err: OrmError) -> Self {
        SideloadError::from(err).into()
    }
}

impl From<ConfigError> for HttpError {
    fn from(err: ConfigError) -> Self {
        HttpError::config(err.to_string())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(target: "elif::sideload::http", code = self.error_code(), error = %self, "request failed");
        }

        let body = match &self {
            HttpError::Validation(errors) => errors.to_json(),
            _ => json!({
                "error": {
                    "code": self.error_code(),
                    "message": self.to_string(),
                }
            }),
        };
        (status, Json(body)).into_response()
    }
}
