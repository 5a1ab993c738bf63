use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Team not found")]
    TeamNotFound,
    #[error("Link not found")]
    LinkNotFound,
    #[error("No links for this team")]
    NoLinksForTeam,
    #[error("Authentication required")]
    Unauthorized,
    #[error("Insufficient permissions")]
    Forbidden,
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage unavailable")]
    StorageUnavailable,
    #[error("{context}: {detail}")]
    StorageFailure {
        /// Shown to the caller.
        context: &'static str,
        /// Logged only.
        detail: String,
    },
}

pub const RESOLVE_FAILED: &str = "Failed to resolve link";
const CONFLICT_MESSAGE: &str = "Link already exists";

impl ResolveError {
    /// Returns (error_code, status_code) for this error.
    fn error_metadata(&self) -> (&'static str, StatusCode) {
        match self {
            ResolveError::InvalidRequest(_) => ("invalid_request", StatusCode::BAD_REQUEST),
            ResolveError::TeamNotFound => ("team_not_found", StatusCode::NOT_FOUND),
            ResolveError::LinkNotFound => ("link_not_found", StatusCode::NOT_FOUND),
            ResolveError::NoLinksForTeam => ("no_links_for_team", StatusCode::NOT_FOUND),
            ResolveError::Unauthorized => ("unauthorized", StatusCode::UNAUTHORIZED),
            ResolveError::Forbidden => ("forbidden", StatusCode::FORBIDDEN),
            ResolveError::Conflict(_) => ("conflict", StatusCode::CONFLICT),
            ResolveError::StorageUnavailable => {
                ("storage_unavailable", StatusCode::SERVICE_UNAVAILABLE)
            }
            ResolveError::StorageFailure { .. } => {
                ("storage_failure", StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        self.error_metadata().0
    }

    pub fn status_code(&self) -> StatusCode {
        self.error_metadata().1
    }

    /// The text shown to callers. Storage details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            ResolveError::InvalidRequest(msg) | ResolveError::Conflict(msg) => msg.clone(),
            ResolveError::StorageUnavailable => {
                "Database not configured or unreachable".to_string()
            }
            ResolveError::StorageFailure { context, .. } => context.to_string(),
            other => other.to_string(),
        }
    }

    /// Replaces the caller-facing message of a storage failure with one
    /// naming the operation that failed. Other errors pass through.
    pub fn with_context(self, context: &'static str) -> Self {
        match self {
            ResolveError::StorageFailure { detail, .. } => {
                ResolveError::StorageFailure { context, detail }
            }
            other => other,
        }
    }
}

impl From<StoreError> for ResolveError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(_) => ResolveError::StorageUnavailable,
            StoreError::UniqueViolation(detail) => {
                tracing::warn!(detail = %detail, "Unique constraint violated");
                ResolveError::Conflict(CONFLICT_MESSAGE.to_string())
            }
            StoreError::Database(e) => ResolveError::StorageFailure {
                context: RESOLVE_FAILED,
                detail: e.to_string(),
            },
            StoreError::Internal(detail) => ResolveError::StorageFailure {
                context: RESOLVE_FAILED,
                detail,
            },
        }
    }
}

impl IntoResponse for ResolveError {
    fn into_response(self) -> Response {
        let (code, status) = self.error_metadata();
        if status.is_server_error() {
            tracing::error!(error = %self, code, "request failed");
        }

        let body = ErrorResponse {
            error: code,
            message: self.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
