//! Centralized error handling for the fraud and dispute services
//!
//! Every mutating operation fails fast with one of these variants before any
//! state is written. Each variant carries a stable machine-readable code for
//! the collaborators that surface it.

use thiserror::Error;
use uuid::Uuid;

use crate::dispute::DisputeStatus;
use crate::signal_store::SignalStoreError;

/// Service error type shared by the fraud and dispute services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition {
        from: DisputeStatus,
        to: DisputeStatus,
    },

    #[error("Dispute {id} is {status} and no longer accepts evidence")]
    DisputeClosed { id: Uuid, status: DisputeStatus },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Signal store unavailable: {0}")]
    SignalStoreUnavailable(String),
}

impl ServiceError {
    /// Get the error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::IllegalTransition { .. } => "ILLEGAL_TRANSITION",
            ServiceError::DisputeClosed { .. } => "DISPUTE_CLOSED",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::Database(_) => "DATABASE_ERROR",
            ServiceError::SignalStoreUnavailable(_) => "SIGNAL_STORE_UNAVAILABLE",
        }
    }

    /// Whether the caller sent something wrong, as opposed to an infrastructure failure
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            ServiceError::Database(_) | ServiceError::SignalStoreUnavailable(_)
        )
    }
}

// Convenience conversions from common error types

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ServiceError::NotFound("Resource not found".to_string()),
            _ => ServiceError::Database(err.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::Validation(err.to_string())
    }
}

impl From<SignalStoreError> for ServiceError {
    fn from(err: SignalStoreError) -> Self {
        ServiceError::SignalStoreUnavailable(err.to_string())
    }
}

/// Result type alias using ServiceError
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            ServiceError::NotFound("test".to_string()).error_code(),
            "NOT_FOUND"
        );
        assert_eq!(
            ServiceError::Validation("test".to_string()).error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            ServiceError::IllegalTransition {
                from: DisputeStatus::Resolved,
                to: DisputeStatus::Open,
            }
            .error_code(),
            "ILLEGAL_TRANSITION"
        );
        assert_eq!(
            ServiceError::Forbidden("test".to_string()).error_code(),
            "FORBIDDEN"
        );
    }

    #[test]
    fn test_illegal_transition_message() {
        let err = ServiceError::IllegalTransition {
            from: DisputeStatus::Escalated,
            to: DisputeStatus::AutoResolved,
        };
        assert_eq!(
            err.to_string(),
            "Illegal status transition: ESCALATED -> AUTO_RESOLVED"
        );
    }

    #[test]
    fn test_client_vs_server_errors() {
        assert!(ServiceError::Conflict("x".to_string()).is_client_error());
        assert!(!ServiceError::Database("x".to_string()).is_client_error());
        assert!(!ServiceError::from(SignalStoreError::Unavailable("down".to_string()))
            .is_client_error());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = ServiceError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
