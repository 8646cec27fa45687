/// Audit trail endpoints
///
/// # Endpoints
///
/// - `GET /api/v1/admin/audit-logs` - Filtered, paginated query
/// - `GET /api/v1/admin/audit-logs/user/:id` - Records about one account
/// - `GET /api/v1/auth/audit-logs` - Records about the caller
///
/// # Query Parameters
///
/// `user_id`, `action` (e.g. `LOGIN_FAILED`), `resource` (e.g. `auth`),
/// `success`, `start_date` and `end_date` (`YYYY-MM-DD`, end date inclusive),
/// `limit` (default 50, max 100) and `offset`. The per-user endpoints accept
/// only `limit` and `offset`.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use holidayapi_shared::{
    auth::middleware::AuthContext,
    models::audit::{AuditAction, AuditFilter, AuditPage, AuditRecord, AuditResource},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    app::AppState,
    error::{ApiResponse, ApiResult},
};

/// Query string for [`list_audit_logs`]
#[derive(Debug, Default, Deserialize)]
pub struct AuditLogQuery {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource: Option<AuditResource>,
    pub success: Option<bool>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl AuditLogQuery {
    /// Converts to a store filter; dates cover whole UTC days
    pub fn into_filter(self) -> AuditFilter {
        AuditFilter {
            user_id: self.user_id,
            action: self.action,
            resource: self.resource,
            success: self.success,
            start_date: self.start_date.map(day_start),
            end_date: self.end_date.map(day_end),
            limit: self.limit.unwrap_or_default(),
            offset: self.offset.unwrap_or_default(),
        }
    }
}

/// Pagination for the per-user endpoints
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn day_end(date: NaiveDate) -> DateTime<Utc> {
    let end_of_day = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    date.and_time(end_of_day).and_utc()
}

/// Filtered audit query
pub async fn list_audit_logs(
    State(state): State<AppState>,
    query: Result<Query<AuditLogQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<AuditPage>>> {
    let Query(query) = query?;

    let page = state.audit.query(query.into_filter()).await?;

    Ok(ApiResponse::ok("Audit logs retrieved successfully", page))
}

/// Records about one account
pub async fn user_audit_logs(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<AuditRecord>>>> {
    let Path(user_id) = path?;
    let Query(page) = query?;

    let records = state
        .audit
        .user_records(
            user_id,
            page.limit.unwrap_or_default(),
            page.offset.unwrap_or_default(),
        )
        .await?;

    Ok(ApiResponse::ok("User audit logs retrieved successfully", records))
}

/// Records about the caller
pub async fn my_audit_logs(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Vec<AuditRecord>>>> {
    let Query(page) = query?;
    let actor = context.actor()?;

    let records = state
        .audit
        .user_records(
            actor.id,
            page.limit.unwrap_or_default(),
            page.offset.unwrap_or_default(),
        )
        .await?;

    Ok(ApiResponse::ok("Audit logs retrieved successfully", records))
}
