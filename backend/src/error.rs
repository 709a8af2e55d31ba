//! Error handling for the Storefront Fulfillment Engine
//!
//! Every failure reaches the caller as a typed kind so reviewers can tell
//! "fix your allocation" from "try again" from "already resolved".

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::{AllocationError, TransitionError};
use thiserror::Error;
use uuid::Uuid;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Validation error: {0}")]
    ValidationError(String),

    // State machine errors
    #[error("Invalid transition: {0}")]
    InvalidTransition(#[from] TransitionError),

    // Allocation errors
    #[error("Incomplete batch assignment for item {item_id}: requested {requested}, assigned {assigned}")]
    Incomplete {
        item_id: Uuid,
        requested: i64,
        assigned: i64,
    },

    #[error("Overallocated batch {batch_id}: assigned {assigned}, available {available}")]
    Overallocated {
        batch_id: Uuid,
        assigned: i64,
        available: i64,
    },

    #[error("InsufficientStock on batch {batch_id}: requested {requested}, available {available}")]
    InsufficientStock {
        batch_id: Uuid,
        requested: i64,
        available: i64,
    },

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

/// Machine-checkable error kind carried in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    NotFound,
    ValidationError,
    InvalidTransition,
    Incomplete,
    Overallocated,
    InsufficientStock,
    Internal,
}

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound(_) => ErrorKind::NotFound,
            AppError::Validation { .. } | AppError::ValidationError(_) => ErrorKind::ValidationError,
            AppError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            AppError::Incomplete { .. } => ErrorKind::Incomplete,
            AppError::Overallocated { .. } => ErrorKind::Overallocated,
            AppError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            AppError::DatabaseError(_) | AppError::Internal(_) | AppError::InternalError(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ValidationError => StatusCode::BAD_REQUEST,
            ErrorKind::InvalidTransition
            | ErrorKind::Incomplete
            | ErrorKind::Overallocated => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::InsufficientStock => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Validation { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidTransition(_) => "INVALID_TRANSITION",
            AppError::Incomplete { .. } => "INCOMPLETE",
            AppError::Overallocated { .. } => "OVERALLOCATED",
            AppError::InsufficientStock { .. } => "INSUFFICIENT_STOCK",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::Internal(_) | AppError::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    fn detail(&self) -> ErrorDetail {
        let (message, field) = match self {
            AppError::NotFound(resource) => (format!("{} not found", resource), None),
            AppError::Validation { field, message } => (message.clone(), Some(field.clone())),
            AppError::DatabaseError(_) => ("A database error occurred".to_string(), None),
            AppError::InternalError(_) => ("An internal server error occurred".to_string(), None),
            other => (other.to_string(), None),
        };

        ErrorDetail {
            code: self.code().to_string(),
            kind: self.kind(),
            message,
            field,
        }
    }
}

impl From<AllocationError> for AppError {
    fn from(err: AllocationError) -> Self {
        match err {
            AllocationError::Incomplete {
                item_id,
                requested,
                assigned,
            } => AppError::Incomplete {
                item_id,
                requested,
                assigned,
            },
            AllocationError::Overallocated {
                batch_id,
                assigned,
                available,
            } => AppError::Overallocated {
                batch_id,
                assigned,
                available,
            },
            AllocationError::InsufficientStock {
                batch_id,
                requested,
                available,
            } => AppError::InsufficientStock {
                batch_id,
                requested,
                available,
            },
            AllocationError::InvalidAssignment(message) => AppError::Validation {
                field: "batches".to_string(),
                message,
            },
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|f| f.to_string())
            .unwrap_or_default();
        AppError::Validation {
            field,
            message: errors.to_string(),
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("Error: {:?}", self);
        } else {
            tracing::debug!(kind = ?self.kind(), "Request rejected: {}", self);
        }

        (status, Json(ErrorResponse { error: self.detail() })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;
