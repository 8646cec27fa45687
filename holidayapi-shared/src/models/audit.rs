/// Audit records and their storage
///
/// Records are append-only. Nothing in this module updates a record; the only
/// removal path is [`AuditRepository::delete_older_than`], used by the
/// retention sweep.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE audit_logs (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID,
///     username TEXT NOT NULL DEFAULT '',
///     action VARCHAR(50) NOT NULL,
///     resource VARCHAR(50) NOT NULL,
///     resource_id VARCHAR(100),
///     details TEXT NOT NULL DEFAULT '',
///     ip_address TEXT NOT NULL DEFAULT '',
///     user_agent TEXT NOT NULL DEFAULT '',
///     success BOOLEAN NOT NULL,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// Kind of security-relevant event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Login,
    Logout,
    LoginFailed,
    TokenRefresh,
    UserCreate,
    UserUpdate,
    UserDelete,
    PasswordChange,
    HolidayCreate,
    HolidayUpdate,
    HolidayDelete,
    HolidayView,
    SystemAccess,
    ConfigChange,
}

impl AuditAction {
    pub const ALL: [AuditAction; 14] = [
        AuditAction::Login,
        AuditAction::Logout,
        AuditAction::LoginFailed,
        AuditAction::TokenRefresh,
        AuditAction::UserCreate,
        AuditAction::UserUpdate,
        AuditAction::UserDelete,
        AuditAction::PasswordChange,
        AuditAction::HolidayCreate,
        AuditAction::HolidayUpdate,
        AuditAction::HolidayDelete,
        AuditAction::HolidayView,
        AuditAction::SystemAccess,
        AuditAction::ConfigChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Login => "LOGIN",
            AuditAction::Logout => "LOGOUT",
            AuditAction::LoginFailed => "LOGIN_FAILED",
            AuditAction::TokenRefresh => "TOKEN_REFRESH",
            AuditAction::UserCreate => "USER_CREATE",
            AuditAction::UserUpdate => "USER_UPDATE",
            AuditAction::UserDelete => "USER_DELETE",
            AuditAction::PasswordChange => "PASSWORD_CHANGE",
            AuditAction::HolidayCreate => "HOLIDAY_CREATE",
            AuditAction::HolidayUpdate => "HOLIDAY_UPDATE",
            AuditAction::HolidayDelete => "HOLIDAY_DELETE",
            AuditAction::HolidayView => "HOLIDAY_VIEW",
            AuditAction::SystemAccess => "SYSTEM_ACCESS",
            AuditAction::ConfigChange => "CONFIG_CHANGE",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AuditAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AuthError::ValidationFailed(format!("unknown audit action: {}", s)))
    }
}

/// What an audited action was applied to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResource {
    Auth,
    User,
    Holiday,
    System,
}

impl AuditResource {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResource::Auth => "auth",
            AuditResource::User => "user",
            AuditResource::Holiday => "holiday",
            AuditResource::System => "system",
        }
    }
}

impl fmt::Display for AuditResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditResource {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(AuditResource::Auth),
            "user" => Ok(AuditResource::User),
            "holiday" => Ok(AuditResource::Holiday),
            "system" => Ok(AuditResource::System),
            other => Err(AuthError::ValidationFailed(format!("unknown audit resource: {}", other))),
        }
    }
}

/// Stored audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: Uuid,

    /// Absent for failed logins naming an unknown user
    pub user_id: Option<Uuid>,

    pub username: String,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,

    /// Operator-facing detail; may name the specific failure cause
    pub details: String,

    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,

    /// Assigned by the store at write time
    pub created_at: DateTime<Utc>,
}

/// Audit record before it is written
///
/// # Example
///
/// ```
/// use holidayapi_shared::models::audit::{AuditAction, AuditResource, NewAuditRecord};
///
/// let record = NewAuditRecord::new(AuditAction::LoginFailed, AuditResource::Auth, false)
///     .username("alice")
///     .details("Invalid password")
///     .client("203.0.113.7", "curl/8.0");
///
/// assert!(record.user_id.is_none());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    pub user_id: Option<Uuid>,
    pub username: String,
    pub action: AuditAction,
    pub resource: AuditResource,
    pub resource_id: Option<String>,
    pub details: String,
    pub ip_address: String,
    pub user_agent: String,
    pub success: bool,
}

impl NewAuditRecord {
    pub fn new(action: AuditAction, resource: AuditResource, success: bool) -> Self {
        Self {
            user_id: None,
            username: String::new(),
            action,
            resource,
            resource_id: None,
            details: String::new(),
            ip_address: String::new(),
            user_agent: String::new(),
            success,
        }
    }

    pub fn user_id(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn resource_id(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn client(mut self, ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self.user_agent = user_agent.into();
        self
    }

    fn into_record(self, created_at: DateTime<Utc>) -> AuditRecord {
        AuditRecord {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            username: self.username,
            action: self.action,
            resource: self.resource,
            resource_id: self.resource_id,
            details: self.details,
            ip_address: self.ip_address,
            user_agent: self.user_agent,
            success: self.success,
            created_at,
        }
    }
}

/// Filter for audit queries
///
/// Every `Some` field narrows the result. `limit` and `offset` are passed to
/// the store as given; the audit service normalizes them first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditFilter {
    pub user_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub resource: Option<AuditResource>,
    pub success: Option<bool>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl AuditFilter {
    fn matches(&self, record: &AuditRecord) -> bool {
        self.user_id.map_or(true, |id| record.user_id == Some(id))
            && self.action.map_or(true, |a| record.action == a)
            && self.resource.map_or(true, |r| record.resource == r)
            && self.success.map_or(true, |s| record.success == s)
            && self.start_date.map_or(true, |start| record.created_at >= start)
            && self.end_date.map_or(true, |end| record.created_at <= end)
    }
}

/// One page of audit records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditPage {
    pub data: Vec<AuditRecord>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Audit storage
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn insert(&self, record: NewAuditRecord) -> AuthResult<AuditRecord>;

    /// Matching records newest first, plus the total match count
    async fn query(&self, filter: &AuditFilter) -> AuthResult<(Vec<AuditRecord>, i64)>;

    /// Removes records created before `cutoff`; returns how many
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AuthResult<u64>;
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    user_id: Option<Uuid>,
    username: String,
    action: String,
    resource: String,
    resource_id: Option<String>,
    details: String,
    ip_address: String,
    user_agent: String,
    success: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditRecord {
    type Error = AuthError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let action = row
            .action
            .parse()
            .map_err(|_| AuthError::Internal(format!("stored action '{}' is invalid", row.action)))?;
        let resource = row
            .resource
            .parse()
            .map_err(|_| AuthError::Internal(format!("stored resource '{}' is invalid", row.resource)))?;

        Ok(AuditRecord {
            id: row.id,
            user_id: row.user_id,
            username: row.username,
            action,
            resource,
            resource_id: row.resource_id,
            details: row.details,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            success: row.success,
            created_at: row.created_at,
        })
    }
}

const AUDIT_COLUMNS: &str = "id, user_id, username, action, resource, resource_id, details, \
                             ip_address, user_agent, success, created_at";

/// PostgreSQL-backed audit storage
#[derive(Debug, Clone)]
pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn push_filter(builder: &mut QueryBuilder<'_, Postgres>, filter: &AuditFilter) {
    builder.push(" WHERE 1=1");

    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(action) = filter.action {
        builder.push(" AND action = ").push_bind(action.as_str());
    }
    if let Some(resource) = filter.resource {
        builder.push(" AND resource = ").push_bind(resource.as_str());
    }
    if let Some(success) = filter.success {
        builder.push(" AND success = ").push_bind(success);
    }
    if let Some(start) = filter.start_date {
        builder.push(" AND created_at >= ").push_bind(start);
    }
    if let Some(end) = filter.end_date {
        builder.push(" AND created_at <= ").push_bind(end);
    }
}

#[async_trait]
impl AuditRepository for PgAuditRepository {
    async fn insert(&self, record: NewAuditRecord) -> AuthResult<AuditRecord> {
        let query = format!(
            "INSERT INTO audit_logs (user_id, username, action, resource, resource_id, details, \
             ip_address, user_agent, success) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING {}",
            AUDIT_COLUMNS
        );
        let row = sqlx::query_as::<_, AuditRow>(&query)
            .bind(record.user_id)
            .bind(record.username)
            .bind(record.action.as_str())
            .bind(record.resource.as_str())
            .bind(record.resource_id)
            .bind(record.details)
            .bind(record.ip_address)
            .bind(record.user_agent)
            .bind(record.success)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn query(&self, filter: &AuditFilter) -> AuthResult<(Vec<AuditRecord>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM audit_logs");
        push_filter(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new("SELECT ");
        select.push(AUDIT_COLUMNS).push(" FROM audit_logs");
        push_filter(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(filter.limit)
            .push(" OFFSET ")
            .push_bind(filter.offset);

        let rows = select
            .build_query_as::<AuditRow>()
            .fetch_all(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .map(AuditRecord::try_from)
            .collect::<AuthResult<Vec<_>>>()?;

        Ok((records, total))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Process-local audit storage
///
/// Records are kept in insertion order, which is also `created_at` order.
#[derive(Debug, Default)]
pub struct InMemoryAuditRepository {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record with an explicit timestamp
    ///
    /// Lets tests age records without waiting.
    pub fn insert_at(&self, record: NewAuditRecord, created_at: DateTime<Utc>) -> AuditRecord {
        let record = record.into_record(created_at);
        let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
        let position = records.partition_point(|r| r.created_at <= created_at);
        records.insert(position, record.clone());
        record
    }

    /// Number of stored records
    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn insert(&self, record: NewAuditRecord) -> AuthResult<AuditRecord> {
        Ok(self.insert_at(record, Utc::now()))
    }

    async fn query(&self, filter: &AuditFilter) -> AuthResult<(Vec<AuditRecord>, i64)> {
        let records = self.records.read().unwrap_or_else(|p| p.into_inner());
        let matching: Vec<&AuditRecord> = records.iter().rev().filter(|r| filter.matches(r)).collect();
        let total = matching.len() as i64;

        let page = matching
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .cloned()
            .collect();

        Ok((page, total))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> AuthResult<u64> {
        let mut records = self.records.write().unwrap_or_else(|p| p.into_inner());
        let before = records.len();
        records.retain(|r| r.created_at >= cutoff);
        Ok((before - records.len()) as u64)
    }
}
