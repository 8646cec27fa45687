/// Token issuance and validation
///
/// Tokens are self-contained HS256 JWTs; nothing is stored server side, so a
/// token stays valid until its `exp` passes. Logout is therefore a
/// client-side discard.
///
/// # Validation
///
/// A token is accepted only if all of these hold:
/// - header `alg` is HS256 (any other algorithm is rejected outright)
/// - the signature verifies against the configured secret
/// - `exp` is in the future, with no leeway
/// - `iss` is `holidayapi`
/// - `type` matches the kind the caller asked for
///
/// Every failure is reported as [`AuthError::InvalidToken`]; the specific
/// cause only reaches the debug log.
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use holidayapi_shared::auth::jwt::{TokenService, TokenType};
/// use holidayapi_shared::models::user::{InMemoryUserRepository, NewUser, Role, UserRepository};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let tokens = TokenService::new(
///     "test-secret-key-at-least-32-bytes-long",
///     Duration::minutes(15),
///     Duration::days(7),
/// )?;
///
/// let users = InMemoryUserRepository::new();
/// let user = users
///     .create(NewUser {
///         username: "alice".to_string(),
///         email: "alice@example.com".to_string(),
///         password_hash: "$argon2id$...".to_string(),
///         role: Role::Admin,
///     })
///     .await?;
///
/// let pair = tokens.issue_pair(&user)?;
/// let claims = tokens.validate(&pair.access_token, TokenType::Access)?;
/// assert_eq!(claims.sub, user.id);
///
/// // A refresh token is never accepted as an access token
/// assert!(tokens.validate(&pair.refresh_token, TokenType::Access).is_err());
/// # Ok(())
/// # }
/// ```

use std::fmt;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::models::user::{Role, User, UserRepository};

/// Issuer tag stamped into and required of every token
pub const TOKEN_ISSUER: &str = "holidayapi";

/// Error type for token service construction and signing
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Rejected configuration
    #[error("Invalid token configuration: {0}")]
    InvalidConfig(String),

    /// Failed to create token
    #[error("Failed to create token: {0}")]
    CreateError(String),
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Token kind discriminator, carried in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived, presented on every protected request
    Access,

    /// Longer-lived, only exchanged for a new pair
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT claims
///
/// # Standard Claims
///
/// - `sub`: user ID
/// - `iss`: always `holidayapi`
/// - `iat`, `exp`: Unix timestamps
///
/// # Custom Claims
///
/// - `username`, `role`: identity at issuance time
/// - `type`: access or refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - User ID
    pub sub: Uuid,

    pub username: String,

    pub role: Role,

    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Issuer - Always "holidayapi"
    pub iss: String,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    fn for_user(user: &User, token_type: TokenType, ttl: Duration) -> Self {
        let now = Utc::now();

        Self {
            sub: user.id,
            username: user.username.clone(),
            role: user.role,
            token_type,
            iss: TOKEN_ISSUER.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        }
    }
}

/// Access and refresh token issued together
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,

    /// Access token lifetime in seconds
    pub expires_in: i64,

    /// Always "Bearer"
    pub token_type: String,
}

/// Issues and validates signed tokens
///
/// Immutable after construction; share it behind an `Arc`.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Creates a token service
    ///
    /// # Errors
    ///
    /// Returns `JwtError::InvalidConfig` if the secret is empty, the access
    /// lifetime is not positive, or the refresh lifetime does not exceed the
    /// access lifetime.
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::InvalidConfig("secret must not be empty".to_string()));
        }
        if access_ttl <= Duration::zero() {
            return Err(JwtError::InvalidConfig("access token lifetime must be positive".to_string()));
        }
        if refresh_ttl <= access_ttl {
            return Err(JwtError::InvalidConfig(
                "refresh token lifetime must exceed access token lifetime".to_string(),
            ));
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = vec![Algorithm::HS256];
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.set_required_spec_claims(&["exp", "iat", "iss", "sub"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            access_ttl,
            refresh_ttl,
        })
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::CreateError(format!("Token encoding failed: {}", e)))
    }

    /// Issues an access and refresh token for `user`
    ///
    /// Both tokens carry the same subject, username and role.
    pub fn issue_pair(&self, user: &User) -> AuthResult<TokenPair> {
        let access = Claims::for_user(user, TokenType::Access, self.access_ttl);
        let refresh = Claims::for_user(user, TokenType::Refresh, self.refresh_ttl);

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            expires_in: self.access_ttl.num_seconds(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Validates a token of the expected kind
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidToken` on any failure.
    pub fn validate(&self, token: &str, expected: TokenType) -> AuthResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, kind = expected.as_str(), "Token rejected");
                AuthError::InvalidToken
            })?
            .claims;

        // The library accepts exp == now when leeway is zero
        if claims.exp <= Utc::now().timestamp() {
            tracing::debug!(sub = %claims.sub, "Token rejected: expired");
            return Err(AuthError::InvalidToken);
        }

        if claims.token_type != expected {
            tracing::debug!(
                sub = %claims.sub,
                expected = expected.as_str(),
                actual = claims.token_type.as_str(),
                "Token rejected: wrong kind"
            );
            return Err(AuthError::InvalidToken);
        }

        Ok(claims)
    }

    /// Exchanges a refresh token for a new pair
    ///
    /// The subject is re-read from `users`, so a role change or deactivation
    /// since issuance takes effect here. The presented refresh token is not
    /// invalidated and remains usable until it expires.
    ///
    /// # Errors
    ///
    /// - `AuthError::InvalidToken` if the token is invalid or its subject no longer exists
    /// - `AuthError::AccountDeactivated` if the subject is inactive
    pub async fn refresh(
        &self,
        refresh_token: &str,
        users: &dyn UserRepository,
    ) -> AuthResult<(TokenPair, User)> {
        let claims = self.validate(refresh_token, TokenType::Refresh)?;

        let user = users.find_by_id(claims.sub).await?.ok_or_else(|| {
            tracing::debug!(sub = %claims.sub, "Refresh token subject no longer exists");
            AuthError::InvalidToken
        })?;

        if !user.is_active {
            return Err(AuthError::AccountDeactivated);
        }

        let pair = self.issue_pair(&user)?;
        Ok((pair, user))
    }
}
