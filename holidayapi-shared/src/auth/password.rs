/// Password hashing and strength policy
///
/// Credentials are stored as Argon2id PHC strings. Verification recomputes the
/// digest with the parameters embedded in the stored hash and compares in
/// constant time, so the time taken does not depend on how much of the
/// password matched.
///
/// # Default Cost
///
/// - **Algorithm**: Argon2id, version 0x13
/// - **Memory**: 64 MiB (65536 KiB)
/// - **Iterations**: 3 passes
/// - **Parallelism**: 4 lanes
/// - **Output**: 32-byte hash, 16-byte random salt
///
/// # Example
///
/// ```
/// use holidayapi_shared::auth::password::PasswordHasher;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hasher = PasswordHasher::with_cost(1024, 1, 1)?;
/// let hash = hasher.hash("Sup3r$ecret")?;
///
/// assert!(hasher.verify(&hash, "Sup3r$ecret"));
/// assert!(!hasher.verify(&hash, "wrong"));
/// # Ok(())
/// # }
/// ```

use std::sync::OnceLock;

use argon2::{
    password_hash::{
        rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString,
    },
    Argon2, Params, ParamsBuilder, Version,
};

/// Symbols accepted by the strength policy
pub const PASSWORD_SYMBOLS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";

/// Minimum accepted password length
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Error type for password hashing operations
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    /// Failed to hash password
    #[error("Failed to hash password: {0}")]
    HashError(String),

    /// Cost parameters were rejected by argon2
    #[error("Invalid hashing parameters: {0}")]
    InvalidParams(String),
}

/// Argon2id hasher with a fixed cost
///
/// Cheap to clone; holds only the cost parameters.
#[derive(Debug, Clone)]
pub struct PasswordHasher {
    params: Params,
    dummy_hash: std::sync::Arc<OnceLock<String>>,
}

impl PasswordHasher {
    /// Creates a hasher with the production cost (64 MiB, t=3, p=4)
    pub fn new() -> Self {
        // Constant, known-valid parameters
        Self::with_cost(65536, 3, 4).unwrap_or_else(|_| Self::from_params(Params::default()))
    }

    /// Creates a hasher with a custom cost
    ///
    /// # Arguments
    ///
    /// * `m_cost` - Memory in KiB (at least `8 * p_cost`)
    /// * `t_cost` - Number of passes
    /// * `p_cost` - Degree of parallelism
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::InvalidParams` if argon2 rejects the combination.
    pub fn with_cost(m_cost: u32, t_cost: u32, p_cost: u32) -> Result<Self, PasswordError> {
        let params = ParamsBuilder::new()
            .m_cost(m_cost)
            .t_cost(t_cost)
            .p_cost(p_cost)
            .output_len(32)
            .build()
            .map_err(|e| PasswordError::InvalidParams(e.to_string()))?;

        Ok(Self::from_params(params))
    }

    fn from_params(params: Params) -> Self {
        Self {
            params,
            dummy_hash: std::sync::Arc::new(OnceLock::new()),
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a password into a PHC string
    ///
    /// Example output:
    /// ```text
    /// $argon2id$v=19$m=65536,t=3,p=4$c2FsdHNhbHRzYWx0$hash...
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `PasswordError::HashError` if salt generation or hashing fails.
    /// Neither is retryable.
    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| PasswordError::HashError(format!("Hash generation failed: {}", e)))?;

        Ok(password_hash.to_string())
    }

    /// Verifies a password against a stored hash
    ///
    /// Returns `false` for a wrong password and also for a stored hash that
    /// cannot be parsed; the latter is logged since it indicates corrupt data.
    pub fn verify(&self, hash: &str, password: &str) -> bool {
        let parsed_hash = match PasswordHash::new(hash) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is malformed");
                return false;
            }
        };

        // Parameters come from the stored hash
        match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
            Ok(()) => true,
            Err(argon2::password_hash::Error::Password) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Password verification failed unexpectedly");
                false
            }
        }
    }

    /// Burns one verification against a throwaway hash
    ///
    /// Used when a login names an unknown user so that path costs the same
    /// as a wrong password for a known one.
    pub fn verify_dummy(&self, password: &str) {
        let hash = self.dummy_hash.get_or_init(|| {
            self.hash("dummy-password-for-timing").unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to a fixed dummy hash");
                fixed_dummy_hash(&self.params)
            })
        });
        let _ = self.verify(hash, password);
    }
}

/// Well-formed PHC string at the hasher's cost that no password matches
fn fixed_dummy_hash(params: &Params) -> String {
    format!(
        "$argon2id$v=19$m={},t={},p={}$c29tZXNhbHRzb21lc2FsdA${}",
        params.m_cost(),
        params.t_cost(),
        params.p_cost(),
        "A".repeat(43)
    )
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Validates password strength
///
/// Requirements:
/// - At least 8 characters long
/// - At least one ASCII uppercase letter
/// - At least one ASCII lowercase letter
/// - At least one ASCII digit
/// - At least one symbol from [`PASSWORD_SYMBOLS`]
///
/// # Example
///
/// ```
/// use holidayapi_shared::auth::password::validate_password_strength;
///
/// assert!(validate_password_strength("MyP@ssw0rd!").is_ok());
/// assert!(validate_password_strength("Sh0rt!").is_err());
/// assert!(validate_password_strength("Password123").is_err());
/// ```
pub fn validate_password_strength(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err("Password must be at least 8 characters long".to_string());
    }

    let mut has_upper = false;
    let mut has_lower = false;
    let mut has_digit = false;
    let mut has_symbol = false;

    for c in password.chars() {
        match c {
            'A'..='Z' => has_upper = true,
            'a'..='z' => has_lower = true,
            '0'..='9' => has_digit = true,
            c if PASSWORD_SYMBOLS.contains(c) => has_symbol = true,
            _ => {}
        }
    }

    if !has_upper {
        return Err("Password must contain at least one uppercase letter".to_string());
    }

    if !has_lower {
        return Err("Password must contain at least one lowercase letter".to_string());
    }

    if !has_digit {
        return Err("Password must contain at least one digit".to_string());
    }

    if !has_symbol {
        return Err("Password must contain at least one special character".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_hasher() -> PasswordHasher {
        PasswordHasher::with_cost(1024, 1, 1).expect("valid params")
    }

    #[test]
    fn test_hash_uses_argon2id_with_configured_cost() {
        let hash = PasswordHasher::new().hash("test_password_123").expect("Hash should succeed");

        assert!(hash.starts_with("$argon2id$"));
        assert!(hash.contains("v=19"));
        assert!(hash.contains("m=65536"));
        assert!(hash.contains("t=3"));
        assert!(hash.contains("p=4"));
    }

    #[test]
    fn test_hash_produces_different_salts() {
        let hasher = fast_hasher();
        let hash1 = hasher.hash("same_password").unwrap();
        let hash2 = hasher.hash("same_password").unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_correct_and_incorrect() {
        let hasher = fast_hasher();
        let hash = hasher.hash("correct_password").unwrap();

        assert!(hasher.verify(&hash, "correct_password"));
        assert!(!hasher.verify(&hash, "wrong_password"));
        assert!(!hasher.verify(&hash, ""));
    }

    #[test]
    fn test_verify_malformed_hash_is_false() {
        let hasher = fast_hasher();
        assert!(!hasher.verify("invalid_hash", "password"));
        assert!(!hasher.verify("$argon2id$invalid", "password"));
    }

    #[test]
    fn test_verify_uses_params_from_stored_hash() {
        let cheap = fast_hasher();
        let other = PasswordHasher::with_cost(2048, 2, 1).unwrap();
        let hash = cheap.hash("Cr0ss!cost").unwrap();

        assert!(other.verify(&hash, "Cr0ss!cost"));
    }

    #[test]
    fn test_verify_dummy_does_not_panic() {
        let hasher = fast_hasher();
        hasher.verify_dummy("anything");
        hasher.verify_dummy("anything else");
    }

    #[test]
    fn test_fixed_dummy_hash_costs_a_full_verification() {
        let hasher = fast_hasher();
        let fallback = fixed_dummy_hash(&hasher.params);

        let parsed = PasswordHash::new(&fallback).expect("fallback must parse");
        assert_eq!(parsed.algorithm.as_str(), "argon2id");
        assert_eq!(Params::try_from(&parsed).unwrap().m_cost(), 1024);

        assert!(!hasher.verify(&fallback, "dummy-password-for-timing"));
        assert!(!hasher.verify(&fallback, ""));
    }

    #[test]
    fn test_invalid_params_rejected() {
        // m_cost must be at least 8 * p_cost
        assert!(PasswordHasher::with_cost(8, 1, 4).is_err());
    }

    #[test]
    fn test_validate_password_strength_valid() {
        for password in ["MyP@ssw0rd!", "Str0ng!Pass", "C0mpl3x#Pwd", "S3cur3$Password", "Aa1?aaaa"] {
            assert!(
                validate_password_strength(password).is_ok(),
                "Password '{}' should be valid",
                password
            );
        }
    }

    #[test]
    fn test_validate_password_strength_failures() {
        let cases = [
            ("Sh0rt!", "at least 8 characters"),
            ("lowercase1!", "uppercase letter"),
            ("UPPERCASE1!", "lowercase letter"),
            ("NoDigits!", "digit"),
            ("NoSpecial123", "special character"),
        ];

        for (password, expected) in cases {
            let err = validate_password_strength(password).unwrap_err();
            assert!(err.contains(expected), "'{}' -> '{}'", password, err);
        }
    }

    #[test]
    fn test_symbol_outside_allowed_set_does_not_count() {
        // '~' and '/' are not in the policy's symbol set
        assert!(validate_password_strength("Abcdefg1~").is_err());
        assert!(validate_password_strength("Abcdefg1/").is_err());
    }

    #[test]
    fn test_non_ascii_letters_do_not_satisfy_classes() {
        assert!(validate_password_strength("ÄÖÜäöü1!").is_err());
    }
}
