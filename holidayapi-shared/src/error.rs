/// Error taxonomy for the identity and access-control core
///
/// Every public operation in this crate fails with [`AuthError`]. Variants are
/// coarse: the specific cause of a credential or token failure is
/// logged (and written to the audit trail where relevant) and then discarded
/// before the error crosses the component boundary, so callers cannot tell
/// "no such user" from "wrong password" or "expired" from "malformed".
///
/// # Example
///
/// ```
/// use holidayapi_shared::error::AuthError;
///
/// let err = AuthError::InvalidCredentials;
/// assert_eq!(err.to_string(), "Invalid credentials");
/// assert!(err.is_unauthorized());
/// ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::password::PasswordError;

/// Result alias used across the core
pub type AuthResult<T> = Result<T, AuthError>;

/// Error type for identity, token, throttling and audit operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// Login failed; which credential was wrong is never revealed
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The account exists but has been deactivated
    #[error("Account is deactivated")]
    AccountDeactivated,

    /// Token failed any validation step (signature, expiry, issuer, type, shape)
    #[error("Invalid or expired token")]
    InvalidToken,

    /// Authenticated, but the role is not allowed on this operation
    #[error("Insufficient permissions")]
    InsufficientPermissions,

    /// The caller exhausted its request budget
    #[error("Too many requests, please try again later")]
    RateLimited,

    /// Input rejected by a business rule (password policy, duplicate account)
    #[error("{0}")]
    ValidationFailed(String),

    /// Unknown subject on profile, update or delete paths
    #[error("User not found")]
    NotFound,

    /// Storage or hashing failure; detail is for logs only
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this error maps to an authentication failure (401)
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            AuthError::InvalidCredentials | AuthError::AccountDeactivated | AuthError::InvalidToken
        )
    }
}

/// Error body shared by every rejection: `{success: false, message, error}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub success: bool,
    pub message: String,
    pub error: String,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: error.into(),
        }
    }
}

impl AuthError {
    /// HTTP status this error maps to
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::InvalidCredentials | AuthError::AccountDeactivated | AuthError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AuthError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope for this error; internal detail is replaced by a generic message
    pub fn envelope(&self) -> ErrorEnvelope {
        match self {
            AuthError::InvalidCredentials | AuthError::AccountDeactivated | AuthError::InvalidToken => {
                ErrorEnvelope::new("Unauthorized", self.to_string())
            }
            AuthError::InsufficientPermissions => ErrorEnvelope::new("Forbidden", self.to_string()),
            AuthError::RateLimited => ErrorEnvelope::new("Rate limit exceeded", self.to_string()),
            AuthError::ValidationFailed(_) => ErrorEnvelope::new("Validation failed", self.to_string()),
            AuthError::NotFound => ErrorEnvelope::new("Not found", self.to_string()),
            AuthError::Internal(_) => {
                ErrorEnvelope::new("Internal server error", "An unexpected error occurred")
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Internal error");
        }

        (self.status_code(), Json(self.envelope())).into_response()
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AuthError::NotFound,
            sqlx::Error::Database(db_err) => {
                if let Some(constraint) = db_err.constraint() {
                    if constraint.contains("username") {
                        return AuthError::ValidationFailed("username already exists".to_string());
                    }
                    if constraint.contains("email") {
                        return AuthError::ValidationFailed("email already exists".to_string());
                    }
                }
                AuthError::Internal(format!("Database error: {}", db_err))
            }
            other => AuthError::Internal(format!("Database error: {}", other)),
        }
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(format!("Password operation failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_classification() {
        assert!(AuthError::InvalidCredentials.is_unauthorized());
        assert!(AuthError::AccountDeactivated.is_unauthorized());
        assert!(AuthError::InvalidToken.is_unauthorized());
        assert!(!AuthError::InsufficientPermissions.is_unauthorized());
        assert!(!AuthError::RateLimited.is_unauthorized());
        assert!(!AuthError::NotFound.is_unauthorized());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        assert_eq!(AuthError::from(sqlx::Error::RowNotFound), AuthError::NotFound);
    }

    #[test]
    fn test_password_error_is_internal() {
        let err: AuthError = PasswordError::HashError("rng".to_string()).into();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::AccountDeactivated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::InsufficientPermissions.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::RateLimited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AuthError::ValidationFailed("x".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let envelope = AuthError::Internal("relation \"users\" does not exist".to_string()).envelope();
        assert!(!envelope.success);
        assert!(!envelope.error.contains("users"));
        assert!(!envelope.message.contains("users"));
    }

    #[test]
    fn test_validation_message_is_passed_through() {
        let err = AuthError::ValidationFailed("email already exists".to_string());
        assert_eq!(err.to_string(), "email already exists");
    }
}
