use std::fmt;

use crate::application::ports::remote_store::{RemoteError, RemoteErrorKind};

#[derive(Debug)]
pub enum AppError {
    Database(String),
    Network(String),
    Timeout(String),
    PermissionDenied(String),
    NotFound(String),
    Conflict(String),
    InsufficientStock(String),
    InvalidTransition(String),
    ValidationError(String),
    Unauthorized(String),
    SerializationError(String),
    ConfigurationError(String),
    Internal(String),
}

impl AppError {
    /// Whether a failed write may degrade into a queued operation.
    /// Connectivity failures always qualify; permission failures qualify
    /// because credentials may change before the next drain. Business-rule
    /// failures never do.
    pub fn fallback_eligible(&self) -> bool {
        matches!(
            self,
            AppError::Network(_) | AppError::Timeout(_) | AppError::PermissionDenied(_)
        )
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::Network(msg) => write!(f, "Network error: {}", msg),
            AppError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            AppError::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::InsufficientStock(msg) => write!(f, "Insufficient stock: {}", msg),
            AppError::InvalidTransition(msg) => write!(f, "Invalid transition: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            AppError::ConfigurationError(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::SerializationError(err.to_string())
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        let message = err.to_string();
        match err.kind {
            RemoteErrorKind::Unavailable => AppError::Network(message),
            RemoteErrorKind::DeadlineExceeded => AppError::Timeout(message),
            RemoteErrorKind::PermissionDenied => AppError::PermissionDenied(message),
            RemoteErrorKind::NotFound => AppError::NotFound(message),
            RemoteErrorKind::FailedPrecondition => AppError::Conflict(message),
            RemoteErrorKind::Other => AppError::Internal(message),
        }
    }
}

impl From<String> for AppError {
    fn from(err: String) -> Self {
        AppError::Internal(err)
    }
}

impl From<&str> for AppError {
    fn from(err: &str) -> Self {
        AppError::Internal(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
