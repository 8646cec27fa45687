/// Error handling for the API server
///
/// Handlers return [`ApiResult`]. Core failures arrive as
/// [`AuthError`] and keep its status mapping and envelope; request-shape
/// problems the core never sees (bad JSON, a malformed path id, self-deletion)
/// are [`ApiError::BadRequest`].
///
/// Every error body has the same shape:
///
/// ```json
/// { "success": false, "message": "Unauthorized", "error": "Invalid credentials" }
/// ```
///
/// # Example
///
/// ```
/// use holidayapi_api::error::{ApiError, ApiResult};
/// use holidayapi_shared::error::AuthError;
///
/// fn handler(found: bool) -> ApiResult<()> {
///     if !found {
///         return Err(AuthError::NotFound.into());
///     }
///     Ok(())
/// }
///
/// assert!(matches!(handler(false), Err(ApiError::Auth(AuthError::NotFound))));
/// ```

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use holidayapi_shared::error::{AuthError, ErrorEnvelope};
use serde::{Deserialize, Serialize};

/// API result type alias
pub type ApiResult<T> = Result<T, ApiError>;

/// Unified API error type
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Failure from the identity core
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Malformed request (400)
    #[error("{message}: {error}")]
    BadRequest { message: String, error: String },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, error: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            error: error.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Auth(err) => err.into_response(),
            ApiError::BadRequest { message, error } => (
                StatusCode::BAD_REQUEST,
                Json(ErrorEnvelope::new(message, error)),
            )
                .into_response(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request("Invalid request body", rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError::bad_request("Invalid user ID", "ID must be a valid UUID")
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request("Invalid query parameters", rejection.body_text())
    }
}

/// Success body: `{success: true, message, data}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: Some(data),
        })
    }
}

impl ApiResponse<()> {
    /// Success with no payload
    pub fn message(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
            data: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::bad_request("Invalid user ID", "ID must be a valid UUID");
        assert_eq!(err.to_string(), "Invalid user ID: ID must be a valid UUID");

        let err: ApiError = AuthError::NotFound.into();
        assert_eq!(err.to_string(), "User not found");
    }

    #[tokio::test]
    async fn test_bad_request_envelope() {
        let response = ApiError::bad_request("Cannot delete your own account", "Self-deletion is not allowed")
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_of(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Cannot delete your own account");
        assert_eq!(body["error"], "Self-deletion is not allowed");
    }

    #[tokio::test]
    async fn test_auth_error_keeps_core_mapping() {
        let response = ApiError::from(AuthError::InsufficientPermissions).into_response();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let body = body_of(response).await;
        assert_eq!(body["message"], "Forbidden");
    }

    #[tokio::test]
    async fn test_internal_error_is_generic() {
        let response = ApiError::from(AuthError::Internal("pool timed out".to_string())).into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_of(response).await;
        assert!(!body.to_string().contains("pool timed out"));
    }

    #[test]
    fn test_success_envelope_omits_empty_data() {
        let Json(body) = ApiResponse::message("User logged out successfully");
        let value = serde_json::to_value(body).unwrap();

        assert_eq!(value["success"], true);
        assert!(value.get("data").is_none());
    }
}
