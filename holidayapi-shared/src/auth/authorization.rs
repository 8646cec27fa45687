/// Role checks and static-key comparison
///
/// # Permission Model
///
/// Roles are flat. A route declares the set of roles it accepts and the
/// caller's role must be a member:
///
/// | Set | Accepts | Used for |
/// |---|---|---|
/// | [`RoleSet::ADMIN_OR_SUPER_ADMIN`] | admin, super_admin | profile, audit reads, user listing |
/// | [`RoleSet::SUPER_ADMIN_ONLY`] | super_admin | registration, user update and deletion |
///
/// `admin` never satisfies a super-admin-only route.
///
/// # Example
///
/// ```
/// use holidayapi_shared::auth::authorization::RoleSet;
/// use holidayapi_shared::models::user::Role;
///
/// assert!(RoleSet::ADMIN_OR_SUPER_ADMIN.require(Role::Admin).is_ok());
/// assert!(RoleSet::SUPER_ADMIN_ONLY.require(Role::Admin).is_err());
/// ```

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::jwt::Claims;
use crate::error::{AuthError, AuthResult};
use crate::models::user::{Role, User};

/// Roles accepted by a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleSet(&'static [Role]);

impl RoleSet {
    /// Destructive identity operations
    pub const SUPER_ADMIN_ONLY: RoleSet = RoleSet(&[Role::SuperAdmin]);

    /// Every authenticated operator
    pub const ADMIN_OR_SUPER_ADMIN: RoleSet = RoleSet(&[Role::Admin, Role::SuperAdmin]);

    pub const fn new(roles: &'static [Role]) -> Self {
        Self(roles)
    }

    pub fn allows(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    /// Fails with `InsufficientPermissions` unless `role` is in the set
    pub fn require(&self, role: Role) -> AuthResult<()> {
        if self.allows(role) {
            Ok(())
        } else {
            Err(AuthError::InsufficientPermissions)
        }
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Role::as_str).collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Authenticated caller of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub username: String,
    pub role: Role,
}

impl Actor {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            id: claims.sub,
            username: claims.username.clone(),
            role: claims.role,
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role,
        }
    }
}

/// Compares a presented static key with the configured one
///
/// Both sides are hashed first so the comparison always covers 32 bytes,
/// whatever the input lengths.
pub fn api_key_matches(provided: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }

    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());

    constant_time_compare(&a, &b)
}

/// Constant-time byte comparison
///
/// Always walks the full length; returns early only on a length mismatch.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
