/// User accounts and their storage
///
/// A user is an operator of the admin surface. Accounts are never erased:
/// deletion clears `is_active`, and every lookup here returns inactive
/// accounts too so callers can tell "deactivated" from "unknown".
///
/// # Schema
///
/// ```sql
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     username VARCHAR(50) NOT NULL UNIQUE,
///     email VARCHAR(255) NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     role VARCHAR(20) NOT NULL,
///     is_active BOOLEAN NOT NULL DEFAULT TRUE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     last_login_at TIMESTAMPTZ
/// );
/// ```
///
/// # Example
///
/// ```
/// use holidayapi_shared::models::user::{InMemoryUserRepository, NewUser, Role, UserRepository};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let users = InMemoryUserRepository::new();
///
/// let user = users
///     .create(NewUser {
///         username: "alice".to_string(),
///         email: "alice@example.com".to_string(),
///         password_hash: "$argon2id$...".to_string(),
///         role: Role::Admin,
///     })
///     .await?;
///
/// let found = users.find_by_username("alice").await?;
/// assert_eq!(found.map(|u| u.id), Some(user.id));
/// # Ok(())
/// # }
/// ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AuthError, AuthResult};

/// Role of an account
///
/// The hierarchy is flat: `SuperAdmin` is required (and `Admin` never
/// sufficient) for destructive identity operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular administrator
    Admin,

    /// Administrator allowed to manage other accounts
    SuperAdmin,
}

impl Role {
    /// Gets role as its stored string
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(AuthError::ValidationFailed(format!("unknown role: {}", other))),
        }
    }
}

/// Stored account
///
/// The password hash is never serialized; API responses use [`UserProfile`].
#[derive(Debug, Clone, Serialize)]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Login name, unique across all accounts
    pub username: String,

    /// Email address, unique across all accounts
    pub email: String,

    /// Argon2id PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    /// Account role
    pub role: Role,

    /// False once the account has been deleted
    pub is_active: bool,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last modified
    pub updated_at: DateTime<Utc>,

    /// Last successful login (None if never logged in)
    pub last_login_at: Option<DateTime<Utc>>,
}

impl User {
    /// Public projection without credential material
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            role: self.role,
            is_active: self.is_active,
            created_at: self.created_at,
            last_login_at: self.last_login_at,
        }
    }
}

/// Account as returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Input for creating an account
///
/// `password_hash` must already be hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update of an account
///
/// Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateUser {
    #[validate(
        email(message = "Invalid email address"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

/// Account storage
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts an account; a duplicate username or email is `ValidationFailed`
    async fn create(&self, new_user: NewUser) -> AuthResult<User>;

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>>;

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>>;

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Applies a partial update; `None` if no such account
    async fn update(&self, id: Uuid, changes: UpdateUser) -> AuthResult<Option<User>>;

    /// Replaces the stored hash; false if no such account
    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool>;

    async fn update_last_login(&self, id: Uuid) -> AuthResult<()>;

    /// Soft delete; false if the account is unknown or already inactive
    async fn deactivate(&self, id: Uuid) -> AuthResult<bool>;

    /// Active accounts, newest first
    async fn list_active(&self) -> AuthResult<Vec<User>>;
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_login_at: Option<DateTime<Utc>>,
}

impl TryFrom<UserRow> for User {
    type Error = AuthError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse()
            .map_err(|_| AuthError::Internal(format!("stored role '{}' is invalid", row.role)))?;

        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_login_at: row.last_login_at,
        })
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at, last_login_at";

/// PostgreSQL-backed account storage
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_by(&self, column: &str, value: &str) -> AuthResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE {} = $1", USER_COLUMNS, column);
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, new_user: NewUser) -> AuthResult<User> {
        let query = format!(
            "INSERT INTO users (username, email, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING {}",
            USER_COLUMNS
        );
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(new_user.username)
            .bind(new_user.email)
            .bind(new_user.password_hash)
            .bind(new_user.role.as_str())
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        let query = format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS);
        let row = sqlx::query_as::<_, UserRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        self.fetch_one_by("username", username).await
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        self.fetch_one_by("email", email).await
    }

    async fn update(&self, id: Uuid, changes: UpdateUser) -> AuthResult<Option<User>> {
        let mut builder = sqlx::QueryBuilder::<sqlx::Postgres>::new("UPDATE users SET updated_at = NOW()");

        if let Some(email) = changes.email {
            builder.push(", email = ").push_bind(email);
        }
        if let Some(role) = changes.role {
            builder.push(", role = ").push_bind(role.as_str());
        }
        if let Some(is_active) = changes.is_active {
            builder.push(", is_active = ").push_bind(is_active);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(USER_COLUMNS);

        let row = builder
            .build_query_as::<UserRow>()
            .fetch_optional(&self.pool)
            .await?;

        row.map(User::try_from).transpose()
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_last_login(&self, id: Uuid) -> AuthResult<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> AuthResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1 AND is_active = TRUE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self) -> AuthResult<Vec<User>> {
        let query = format!(
            "SELECT {} FROM users WHERE is_active = TRUE ORDER BY created_at DESC",
            USER_COLUMNS
        );
        let rows = sqlx::query_as::<_, UserRow>(&query)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(User::try_from).collect()
    }
}

/// Process-local account storage
///
/// Uniqueness is checked and the insert applied under one write lock, so two
/// concurrent registrations of the same username cannot both succeed.
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Uuid, User>> {
        self.users.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Uuid, User>> {
        self.users.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, new_user: NewUser) -> AuthResult<User> {
        let mut users = self.write();

        if users.values().any(|u| u.username == new_user.username) {
            return Err(AuthError::ValidationFailed("username already exists".to_string()));
        }
        if users.values().any(|u| u.email == new_user.email) {
            return Err(AuthError::ValidationFailed("email already exists".to_string()));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            password_hash: new_user.password_hash,
            role: new_user.role,
            is_active: true,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };
        users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> AuthResult<Option<User>> {
        Ok(self.read().get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        Ok(self.read().values().find(|u| u.username == username).cloned())
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self.read().values().find(|u| u.email == email).cloned())
    }

    async fn update(&self, id: Uuid, changes: UpdateUser) -> AuthResult<Option<User>> {
        let mut users = self.write();

        if let Some(email) = &changes.email {
            if users.values().any(|u| u.id != id && &u.email == email) {
                return Err(AuthError::ValidationFailed("email already exists".to_string()));
            }
        }

        let Some(user) = users.get_mut(&id) else {
            return Ok(None);
        };

        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        user.updated_at = Utc::now();

        Ok(Some(user.clone()))
    }

    async fn update_password_hash(&self, id: Uuid, password_hash: &str) -> AuthResult<bool> {
        let mut users = self.write();
        match users.get_mut(&id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn update_last_login(&self, id: Uuid) -> AuthResult<()> {
        if let Some(user) = self.write().get_mut(&id) {
            user.last_login_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn deactivate(&self, id: Uuid) -> AuthResult<bool> {
        let mut users = self.write();
        match users.get_mut(&id) {
            Some(user) if user.is_active => {
                user.is_active = false;
                user.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_active(&self) -> AuthResult<Vec<User>> {
        let mut users: Vec<User> = self.read().values().filter(|u| u.is_active).cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: "$argon2id$v=19$placeholder".to_string(),
            role: Role::Admin,
        }
    }

    #[test]
    fn test_role_round_trips_through_str() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("super_admin".parse::<Role>().unwrap(), Role::SuperAdmin);
        assert_eq!(Role::SuperAdmin.to_string(), "super_admin");
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_role_serde_is_snake_case() {
        assert_eq!(serde_json::to_string(&Role::SuperAdmin).unwrap(), "\"super_admin\"");
    }

    #[tokio::test]
    async fn test_user_json_never_contains_hash() {
        let users = InMemoryUserRepository::new();
        let user = users.create(new_user("alice", "alice@example.com")).await.unwrap();

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2"));
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email_rejected() {
        let users = InMemoryUserRepository::new();
        users.create(new_user("alice", "alice@example.com")).await.unwrap();

        let err = users.create(new_user("alice", "other@example.com")).await.unwrap_err();
        assert_eq!(err, AuthError::ValidationFailed("username already exists".to_string()));

        let err = users.create(new_user("bob", "alice@example.com")).await.unwrap_err();
        assert_eq!(err, AuthError::ValidationFailed("email already exists".to_string()));

        assert_eq!(users.list_active().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_is_soft() {
        let users = InMemoryUserRepository::new();
        let user = users.create(new_user("alice", "alice@example.com")).await.unwrap();

        assert!(users.deactivate(user.id).await.unwrap());
        assert!(!users.deactivate(user.id).await.unwrap());

        let stored = users.find_by_id(user.id).await.unwrap().unwrap();
        assert!(!stored.is_active);
        assert!(users.list_active().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let users = InMemoryUserRepository::new();
        let user = users.create(new_user("alice", "alice@example.com")).await.unwrap();

        let updated = users
            .update(
                user.id,
                UpdateUser {
                    role: Some(Role::SuperAdmin),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.role, Role::SuperAdmin);
        assert_eq!(updated.email, "alice@example.com");
        assert!(users.update(Uuid::new_v4(), UpdateUser::default()).await.unwrap().is_none());
    }
}
