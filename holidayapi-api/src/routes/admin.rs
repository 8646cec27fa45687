/// Legacy maintenance endpoints
///
/// Guarded by the static `X-API-Key` rather than a bearer token, so these
/// requests carry no actor. Cleanup is attributed to `system` in the audit
/// trail.
///
/// # Endpoints
///
/// - `DELETE /api/v1/admin/maintenance/audit-logs?days=90` - Apply audit retention now

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};
use holidayapi_shared::{
    auth::middleware::AuthContext,
    models::audit::{AuditAction, AuditResource, NewAuditRecord},
};
use serde::{Deserialize, Serialize};

use crate::{
    app::AppState,
    error::{ApiResponse, ApiResult},
};

/// Query string for [`cleanup_audit_logs`]
#[derive(Debug, Default, Deserialize)]
pub struct CleanupQuery {
    /// Days to keep; missing or non-positive uses the configured retention
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CleanupResponse {
    pub deleted: u64,
    pub days_to_keep: i64,
}

/// Delete audit records older than `days`
pub async fn cleanup_audit_logs(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    query: Result<Query<CleanupQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<CleanupResponse>>> {
    let Query(query) = query?;
    let days_to_keep = match query.days {
        Some(days) if days > 0 => days,
        _ => state.config.audit.retention_days,
    };

    let deleted = state.audit.cleanup(days_to_keep).await?;

    state
        .audit
        .record(
            NewAuditRecord::new(AuditAction::SystemAccess, AuditResource::System, true)
                .username("system")
                .details(format!(
                    "Deleted {} audit records older than {} days",
                    deleted, days_to_keep
                ))
                .client(context.client.ip_address.as_str(), context.client.user_agent.as_str()),
        )
        .await;

    Ok(ApiResponse::ok(
        "Audit logs cleaned up successfully",
        CleanupResponse {
            deleted,
            days_to_keep,
        },
    ))
}
