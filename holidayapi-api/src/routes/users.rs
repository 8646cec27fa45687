/// Account administration endpoints
///
/// # Endpoints
///
/// - `GET    /api/v1/auth/users` - Active accounts (admin, super_admin)
/// - `POST   /api/v1/auth/register` - Create an account (super_admin)
/// - `PUT    /api/v1/auth/users/:id` - Change email, role or active flag (super_admin)
/// - `DELETE /api/v1/auth/users/:id` - Deactivate an account (super_admin)

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    Extension, Json,
};
use holidayapi_shared::{
    access::RegisterRequest,
    auth::middleware::AuthContext,
    models::user::{UpdateUser, UserProfile},
};
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiError, ApiResponse, ApiResult},
};

/// List active accounts, newest first
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<Vec<UserProfile>>>> {
    let users = state.access.list_users().await?;

    Ok(ApiResponse::ok("Users retrieved successfully", users))
}

/// Create an account
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/register
/// Authorization: Bearer <super_admin access token>
///
/// {
///   "username": "alice",
///   "email": "alice@example.com",
///   "password": "Holiday#2024",
///   "role": "admin"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: invalid input, weak password, or username/email taken
/// - `403 Forbidden`: caller is not a super admin
pub async fn register(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<UserProfile>>)> {
    let Json(request) = payload?;
    let actor = context.actor()?;

    let profile = state.access.register(request, actor, &context.client).await?;

    Ok((
        StatusCode::CREATED,
        ApiResponse::ok("User registered successfully", profile),
    ))
}

/// Update an account
///
/// `is_active: false` deactivates the account exactly like `DELETE`.
///
/// # Errors
///
/// - `400 Bad Request`: the caller targeted their own role or active flag
/// - `404 Not Found`: unknown or inactive account
pub async fn update_user(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUser>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<UserProfile>>> {
    let Path(user_id) = path?;
    let Json(changes) = payload?;
    let actor = context.actor()?;

    if actor.id == user_id && (changes.role.is_some() || changes.is_active.is_some()) {
        return Err(ApiError::bad_request(
            "Cannot change your own role or status",
            "Self-modification of role or active status is not allowed",
        ));
    }

    let profile = state
        .access
        .update_user(user_id, changes, actor, &context.client)
        .await?;

    Ok(ApiResponse::ok("User updated successfully", profile))
}

/// Deactivate an account
///
/// # Errors
///
/// - `400 Bad Request`: the caller targeted their own account
/// - `404 Not Found`: unknown or already inactive account
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ApiResponse<()>>> {
    let Path(user_id) = path?;
    let actor = context.actor()?;

    if actor.id == user_id {
        return Err(ApiError::bad_request(
            "Cannot delete your own account",
            "Self-deletion is not allowed",
        ));
    }

    state
        .access
        .delete_user(user_id, actor, &context.client)
        .await?;

    Ok(ApiResponse::message("User deleted successfully"))
}
