use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::{repository::RepositoryError, token::TokenError};

/// Result alias used by every service and handler.
pub type AppResult<T> = Result<T, AppError>;

/// AppError
///
/// The domain error taxonomy. Every variant maps to exactly one HTTP status and a
/// client-safe message; internal detail only ever reaches the server log.
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing, malformed, forged or expired bearer token, or the token's user is gone.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// A permission check ran without an authenticated identity attached to the request.
    #[error("no authenticated user")]
    Unauthorized,

    #[error("user has no role assigned")]
    NoRoleAssigned,

    #[error("permission denied")]
    PermissionDenied,

    /// `{0}` names the missing entity ("User", "Role").
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("role name already taken")]
    DuplicateName,

    #[error("email already registered")]
    DuplicateEmail,

    #[error("role is assigned to users")]
    RoleInUse,

    /// Login failure. Identical for unknown email and wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("current password is incorrect")]
    IncorrectPassword,

    #[error("no default role configured")]
    NoDefaultRole,

    #[error("invalid or expired reset token")]
    InvalidOrExpiredToken,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Error payload returned to clients.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) | Self::Unauthorized | Self::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            Self::NoRoleAssigned | Self::PermissionDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::DuplicateName
            | Self::DuplicateEmail
            | Self::RoleInUse
            | Self::IncorrectPassword
            | Self::InvalidOrExpiredToken
            | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Repository(RepositoryError::Conflict(constraint)) => {
                conflict_error(constraint).status()
            }
            Self::NoDefaultRole | Self::Repository(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The message shown to clients. Internal failures collapse to a generic text.
    pub fn client_message(&self) -> String {
        match self {
            Self::Unauthenticated(reason) => reason.clone(),
            Self::Unauthorized => "Authentication required".to_string(),
            Self::NoRoleAssigned => "No role assigned to user".to_string(),
            Self::PermissionDenied => "Permission denied".to_string(),
            Self::NotFound(entity) => format!("{entity} not found"),
            Self::DuplicateName => "Role with this name already exists".to_string(),
            Self::DuplicateEmail => "User already exists".to_string(),
            Self::RoleInUse => "Cannot delete role that is assigned to users".to_string(),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::IncorrectPassword => "Current password is incorrect".to_string(),
            Self::NoDefaultRole => "No default role found".to_string(),
            Self::InvalidOrExpiredToken => "Invalid or expired reset token".to_string(),
            Self::Validation(message) => message.clone(),
            Self::Repository(RepositoryError::Conflict(constraint)) => {
                conflict_error(constraint).client_message()
            }
            Self::Repository(_) | Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

/// Maps a unique-constraint race caught by the database to the domain error the
/// pre-check would have produced.
fn conflict_error(constraint: &str) -> AppError {
    if constraint.contains("email") {
        AppError::DuplicateEmail
    } else if constraint.contains("name") {
        AppError::DuplicateName
    } else {
        AppError::internal(format!("unexpected unique violation on {constraint}"))
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(detail) => AppError::Internal(detail),
            TokenError::Expired => AppError::Unauthenticated("Token expired".to_string()),
            TokenError::Invalid | TokenError::Malformed => {
                AppError::Unauthenticated("Invalid token".to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = ?self, "request failed with internal error");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        let body = ErrorBody {
            message: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}
