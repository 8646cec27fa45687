/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id hashing and the password strength policy
/// - [`jwt`]: access/refresh token issuance and validation
/// - [`authorization`]: role sets, actors and API-key comparison
/// - [`middleware`]: the per-route admission, credential and role pipeline
///
/// # Example
///
/// ```
/// use holidayapi_shared::auth::password::PasswordHasher;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hasher = PasswordHasher::with_cost(1024, 1, 1)?;
/// let hash = hasher.hash("Winter2024!")?;
/// assert!(hasher.verify(&hash, "Winter2024!"));
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
