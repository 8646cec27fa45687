/// Account lifecycle and credential operations
///
/// [`AccessControlService`] composes the user store, [`PasswordHasher`],
/// [`TokenService`] and [`AuditTrail`]. Each operation writes its audit
/// record before returning.
///
/// # Login failures
///
/// An unknown username, a wrong password and a deactivated account all end
/// in the same `InvalidCredentials` error. The specific cause is kept in the
/// `LOGIN_FAILED` record's details, and the subject id is recorded only when
/// the account exists.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chrono::Duration;
/// use holidayapi_shared::access::{AccessControlService, LoginRequest};
/// use holidayapi_shared::audit::AuditTrail;
/// use holidayapi_shared::auth::jwt::TokenService;
/// use holidayapi_shared::auth::middleware::ClientInfo;
/// use holidayapi_shared::auth::password::PasswordHasher;
/// use holidayapi_shared::models::audit::InMemoryAuditRepository;
/// use holidayapi_shared::models::user::InMemoryUserRepository;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let service = AccessControlService::new(
///     Arc::new(InMemoryUserRepository::new()),
///     Arc::new(TokenService::new("test-secret-key-at-least-32-bytes-long", Duration::minutes(15), Duration::days(7))?),
///     PasswordHasher::with_cost(1024, 1, 1)?,
///     AuditTrail::new(Arc::new(InMemoryAuditRepository::new())),
/// );
///
/// service.bootstrap_super_admin("root", "root@example.com", "Sup3r$ecret").await?;
///
/// let client = ClientInfo::new("203.0.113.7", "curl/8.0");
/// let auth = service
///     .login(LoginRequest { username: "root".into(), password: "Sup3r$ecret".into() }, &client)
///     .await?;
/// assert_eq!(auth.tokens.token_type, "Bearer");
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::audit::AuditTrail;
use crate::auth::authorization::Actor;
use crate::auth::jwt::{TokenPair, TokenService};
use crate::auth::middleware::ClientInfo;
use crate::auth::password::{validate_password_strength, PasswordHasher};
use crate::error::{AuthError, AuthResult};
use crate::models::audit::{AuditAction, AuditResource, NewAuditRecord};
use crate::models::user::{NewUser, Role, UpdateUser, User, UserProfile, UserRepository};

/// Login input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Account creation input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be between 3 and 50 characters"))]
    pub username: String,

    #[validate(
        email(message = "Invalid email address"),
        length(max = 255, message = "Email must be at most 255 characters")
    )]
    pub email: String,

    pub password: String,

    pub role: Role,
}

/// Password change input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,

    pub new_password: String,
}

/// Token refresh input
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Successful login or refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserProfile,

    #[serde(flatten)]
    pub tokens: TokenPair,
}

fn validate_request<T: Validate>(request: &T) -> AuthResult<()> {
    request
        .validate()
        .map_err(|e| AuthError::ValidationFailed(e.to_string()))
}

/// Login, registration, refresh, password and account management
#[derive(Clone)]
pub struct AccessControlService {
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    hasher: PasswordHasher,
    audit: AuditTrail,
}

impl std::fmt::Debug for AccessControlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlService")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

impl AccessControlService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        hasher: PasswordHasher,
        audit: AuditTrail,
    ) -> Self {
        Self {
            users,
            tokens,
            hasher,
            audit,
        }
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    // Argon2 runs on the blocking pool
    async fn hash_password(&self, password: String) -> AuthResult<String> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| AuthError::Internal(format!("Password hashing task failed: {}", e)))?
            .map_err(AuthError::from)
    }

    async fn verify_password(&self, hash: Option<String>, password: String) -> AuthResult<bool> {
        let hasher = self.hasher.clone();
        tokio::task::spawn_blocking(move || match hash {
            Some(hash) => hasher.verify(&hash, &password),
            None => {
                hasher.verify_dummy(&password);
                false
            }
        })
        .await
        .map_err(|e| AuthError::Internal(format!("Password verification task failed: {}", e)))
    }

    async fn active_user(&self, id: Uuid) -> AuthResult<User> {
        match self.users.find_by_id(id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AuthError::NotFound),
        }
    }

    /// Authenticates a username and password
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidCredentials` for an unknown user, wrong password or inactive account
    /// - `AuthError::ValidationFailed` for an empty username or password
    pub async fn login(&self, request: LoginRequest, client: &ClientInfo) -> AuthResult<AuthResponse> {
        validate_request(&request)?;

        let user = self.users.find_by_username(&request.username).await?;
        let verified = self
            .verify_password(user.as_ref().map(|u| u.password_hash.clone()), request.password)
            .await?;

        let failure = match &user {
            None => Some("Login failed: user not found"),
            Some(_) if !verified => Some("Login failed: invalid password"),
            Some(u) if !u.is_active => Some("Login failed: account deactivated"),
            Some(_) => None,
        };

        if let Some(reason) = failure {
            let mut record = NewAuditRecord::new(AuditAction::LoginFailed, AuditResource::Auth, false)
                .username(request.username.as_str())
                .details(reason)
                .client(client.ip_address.as_str(), client.user_agent.as_str());
            if let Some(user) = &user {
                record = record.user_id(user.id);
            }
            self.audit.record(record).await;

            tracing::info!(username = %request.username, ip = %client.ip_address, reason, "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let Some(mut user) = user else {
            return Err(AuthError::InvalidCredentials);
        };

        let tokens = match self.tokens.issue_pair(&user) {
            Ok(tokens) => tokens,
            Err(e) => {
                self.audit
                    .record(
                        NewAuditRecord::new(AuditAction::LoginFailed, AuditResource::Auth, false)
                            .user_id(user.id)
                            .username(user.username.as_str())
                            .details("Login failed: token generation error")
                            .client(client.ip_address.as_str(), client.user_agent.as_str()),
                    )
                    .await;
                return Err(e);
            }
        };

        match self.users.update_last_login(user.id).await {
            Ok(()) => user.last_login_at = Some(chrono::Utc::now()),
            Err(e) => tracing::warn!(error = %e, user_id = %user.id, "Failed to update last login"),
        }

        self.audit
            .record(
                NewAuditRecord::new(AuditAction::Login, AuditResource::Auth, true)
                    .user_id(user.id)
                    .username(user.username.as_str())
                    .details("User logged in successfully")
                    .client(client.ip_address.as_str(), client.user_agent.as_str()),
            )
            .await;

        tracing::info!(user_id = %user.id, username = %user.username, "User logged in");

        Ok(AuthResponse {
            user: user.profile(),
            tokens,
        })
    }

    /// Creates an account on behalf of `actor`
    ///
    /// # Errors
    ///
    /// `AuthError::ValidationFailed` for malformed input, a weak password, or
    /// a username or email already in use. Nothing is written in that case.
    pub async fn register(
        &self,
        request: RegisterRequest,
        actor: &Actor,
        client: &ClientInfo,
    ) -> AuthResult<UserProfile> {
        validate_request(&request)?;
        validate_password_strength(&request.password).map_err(AuthError::ValidationFailed)?;

        if self.users.find_by_username(&request.username).await?.is_some() {
            return Err(AuthError::ValidationFailed("username already exists".to_string()));
        }
        if self.users.find_by_email(&request.email).await?.is_some() {
            return Err(AuthError::ValidationFailed("email already exists".to_string()));
        }

        let password_hash = self.hash_password(request.password).await?;

        // The store re-checks uniqueness atomically
        let user = self
            .users
            .create(NewUser {
                username: request.username,
                email: request.email,
                password_hash,
                role: request.role,
            })
            .await?;

        self.audit
            .record(
                NewAuditRecord::new(AuditAction::UserCreate, AuditResource::User, true)
                    .user_id(actor.id)
                    .username(actor.username.as_str())
                    .resource_id(user.id)
                    .details(format!("Created new user: {} (role: {})", user.username, user.role))
                    .client(client.ip_address.as_str(), client.user_agent.as_str()),
            )
            .await;

        tracing::info!(user_id = %user.id, created_by = %actor.id, "User registered");

        Ok(user.profile())
    }

    /// Creates the first super admin if no account has that username
    ///
    /// Returns `None` when the account already exists.
    pub async fn bootstrap_super_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> AuthResult<Option<UserProfile>> {
        if self.users.find_by_username(username).await?.is_some() {
            return Ok(None);
        }

        validate_password_strength(password).map_err(AuthError::ValidationFailed)?;
        let password_hash = self.hash_password(password.to_string()).await?;

        let user = self
            .users
            .create(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                role: Role::SuperAdmin,
            })
            .await?;

        self.audit
            .record(
                NewAuditRecord::new(AuditAction::UserCreate, AuditResource::User, true)
                    .username("system")
                    .resource_id(user.id)
                    .details(format!("Bootstrapped super admin: {}", user.username)),
            )
            .await;

        tracing::info!(user_id = %user.id, username = %user.username, "Bootstrapped super admin");

        Ok(Some(user.profile()))
    }

    /// Exchanges a refresh token for a new pair
    ///
    /// The presented refresh token stays valid until it expires.
    pub async fn refresh(&self, request: RefreshRequest, client: &ClientInfo) -> AuthResult<AuthResponse> {
        validate_request(&request)?;

        let (tokens, user) = self.tokens.refresh(&request.refresh_token, self.users.as_ref()).await?;

        self.audit
            .record(
                NewAuditRecord::new(AuditAction::TokenRefresh, AuditResource::Auth, true)
                    .user_id(user.id)
                    .username(user.username.as_str())
                    .details("Token refreshed successfully")
                    .client(client.ip_address.as_str(), client.user_agent.as_str()),
            )
            .await;

        Ok(AuthResponse {
            user: user.profile(),
            tokens,
        })
    }

    /// Changes the caller's password after re-verifying the current one
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidCredentials` if `current_password` is wrong
    /// - `AuthError::ValidationFailed` if the new password is too weak
    /// - `AuthError::NotFound` if the account no longer exists
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
        client: &ClientInfo,
    ) -> AuthResult<()> {
        validate_request(&request)?;
        let user = self.active_user(user_id).await?;

        let record = |success: bool, details: &str| {
            NewAuditRecord::new(AuditAction::PasswordChange, AuditResource::User, success)
                .user_id(user.id)
                .username(user.username.as_str())
                .details(details)
                .client(client.ip_address.as_str(), client.user_agent.as_str())
        };

        if !self
            .verify_password(Some(user.password_hash.clone()), request.current_password)
            .await?
        {
            self.audit
                .record(record(false, "Password change failed: invalid current password"))
                .await;
            return Err(AuthError::InvalidCredentials);
        }

        if let Err(reason) = validate_password_strength(&request.new_password) {
            self.audit
                .record(record(false, "Password change failed: new password too weak"))
                .await;
            return Err(AuthError::ValidationFailed(reason));
        }

        let password_hash = self.hash_password(request.new_password).await?;

        match self.users.update_password_hash(user.id, &password_hash).await {
            Ok(true) => {}
            Ok(false) => return Err(AuthError::NotFound),
            Err(e) => {
                self.audit
                    .record(record(false, "Password change failed: database error"))
                    .await;
                return Err(e);
            }
        }

        self.audit.record(record(true, "Password changed successfully")).await;
        tracing::info!(user_id = %user.id, "Password changed");

        Ok(())
    }

    /// Profile of an active account
    pub async fn profile(&self, user_id: Uuid) -> AuthResult<UserProfile> {
        Ok(self.active_user(user_id).await?.profile())
    }

    /// All active accounts
    pub async fn list_users(&self) -> AuthResult<Vec<UserProfile>> {
        let users = self.users.list_active().await?;
        Ok(users.iter().map(User::profile).collect())
    }

    /// Updates email, role or active flag of an account
    ///
    /// `is_active: Some(false)` goes through [`delete_user`](Self::delete_user)
    /// and is recorded as `USER_DELETE`; `Some(true)` is a no-op since only
    /// active accounts can be updated. Callers must reject changes to the
    /// actor's own role or active flag.
    pub async fn update_user(
        &self,
        user_id: Uuid,
        changes: UpdateUser,
        actor: &Actor,
        client: &ClientInfo,
    ) -> AuthResult<UserProfile> {
        validate_request(&changes)?;
        let mut target = self.active_user(user_id).await?;

        let deactivate = changes.is_active == Some(false);
        let changes = UpdateUser {
            is_active: None,
            ..changes
        };

        let mut summary = Vec::new();
        if let Some(email) = &changes.email {
            summary.push(format!("email={}", email));
        }
        if let Some(role) = changes.role {
            summary.push(format!("role={}", role));
        }

        if !summary.is_empty() {
            target = self
                .users
                .update(user_id, changes)
                .await?
                .ok_or(AuthError::NotFound)?;

            self.audit
                .record(
                    NewAuditRecord::new(AuditAction::UserUpdate, AuditResource::User, true)
                        .user_id(actor.id)
                        .username(actor.username.as_str())
                        .resource_id(target.id)
                        .details(format!("Updated user {}: {}", target.username, summary.join(", ")))
                        .client(client.ip_address.as_str(), client.user_agent.as_str()),
                )
                .await;
        }

        if deactivate {
            self.delete_user(user_id, actor, client).await?;
            target.is_active = false;
        }

        Ok(target.profile())
    }

    /// Soft-deletes an account
    ///
    /// Callers must reject `target_id == actor.id` before calling this.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` if the target is unknown or already inactive.
    pub async fn delete_user(&self, target_id: Uuid, actor: &Actor, client: &ClientInfo) -> AuthResult<()> {
        let target = self.active_user(target_id).await?;

        if !self.users.deactivate(target.id).await? {
            return Err(AuthError::NotFound);
        }

        self.audit
            .record(
                NewAuditRecord::new(AuditAction::UserDelete, AuditResource::User, true)
                    .user_id(actor.id)
                    .username(actor.username.as_str())
                    .resource_id(target.id)
                    .details(format!("Deleted user: {}", target.username))
                    .client(client.ip_address.as_str(), client.user_agent.as_str()),
            )
            .await;

        tracing::info!(user_id = %target.id, deleted_by = %actor.id, "User deactivated");

        Ok(())
    }

    /// Records a logout; the tokens themselves stay valid until expiry
    pub async fn logout(&self, actor: &Actor, client: &ClientInfo) {
        self.audit
            .record(
                NewAuditRecord::new(AuditAction::Logout, AuditResource::Auth, true)
                    .user_id(actor.id)
                    .username(actor.username.as_str())
                    .details("User logged out")
                    .client(client.ip_address.as_str(), client.user_agent.as_str()),
            )
            .await;
    }
}
