/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /api/v1/auth/login` - Login and get tokens
/// - `POST /api/v1/auth/refresh` - Exchange a refresh token for a new pair
/// - `GET  /api/v1/auth/profile` - The caller's account
/// - `POST /api/v1/auth/change-password` - Change the caller's password
/// - `POST /api/v1/auth/logout` - Record a logout
///
/// Login and refresh are throttled but unauthenticated; the rest need an
/// access token with the `admin` or `super_admin` role.

use axum::{extract::rejection::JsonRejection, extract::State, Extension, Json};
use holidayapi_shared::{
    access::{AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest},
    auth::middleware::AuthContext,
    models::user::UserProfile,
};

use crate::{
    app::AppState,
    error::{ApiResponse, ApiResult},
};

/// Login with username and password
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/login
/// Content-Type: application/json
///
/// { "username": "root", "password": "Sup3r$ecret" }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "success": true,
///   "message": "Login successful",
///   "data": {
///     "user": { "id": "uuid", "username": "root", "role": "super_admin", ... },
///     "access_token": "eyJ...",
///     "refresh_token": "eyJ...",
///     "expires_in": 900,
///     "token_type": "Bearer"
///   }
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: malformed body or empty fields
/// - `401 Unauthorized`: unknown user, wrong password or inactive account
/// - `429 Too Many Requests`: throttled
pub async fn login(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    let Json(request) = payload?;

    let auth = state.access.login(request, &context.client).await?;

    Ok(ApiResponse::ok("Login successful", auth))
}

/// Refresh tokens
///
/// The new pair reflects the account's current role. The presented refresh
/// token is not revoked.
///
/// # Errors
///
/// - `401 Unauthorized`: invalid or expired refresh token, or inactive account
pub async fn refresh(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<AuthResponse>>> {
    let Json(request) = payload?;

    let auth = state.access.refresh(request, &context.client).await?;

    Ok(ApiResponse::ok("Token refreshed successfully", auth))
}

/// The caller's profile
pub async fn profile(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<UserProfile>>> {
    let actor = context.actor()?;

    let profile = state.access.profile(actor.id).await?;

    Ok(ApiResponse::ok("Profile retrieved successfully", profile))
}

/// Change the caller's password
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/change-password
/// Authorization: Bearer <access token>
///
/// { "current_password": "...", "new_password": "..." }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: new password fails the strength policy
/// - `401 Unauthorized`: current password is wrong
pub async fn change_password(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let Json(request) = payload?;
    let actor = context.actor()?;

    state
        .access
        .change_password(actor.id, request, &context.client)
        .await?;

    Ok(ApiResponse::message("Password changed successfully"))
}

/// Record a logout; the client discards its tokens
pub async fn logout(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let actor = context.actor()?;

    state.access.logout(actor, &context.client).await;

    Ok(ApiResponse::message("Logged out successfully"))
}
