//! Password and client-secret hashing and verification.
//!
//! Stored credentials are either a PHC-formatted Argon2 hash (`$argon2...`),
//! a bcrypt hash (`$2a$`, `$2b$`, `$2y$`) or plain text. Plain-text secrets
//! are compared in constant time.
//!
//! # Example
//!
//! ```
//! use authd_core::secret::{hash_password, verify_password};
//!
//! let hash = hash_password("correct horse").unwrap();
//! assert!(hash.starts_with("$argon2id$"));
//! assert!(verify_password("correct horse", &hash));
//! assert!(!verify_password("battery staple", &hash));
//! ```

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use std::sync::OnceLock;

use subtle::ConstantTimeEq;

const ARGON2_PREFIX: &str = "$argon2";
const BCRYPT_PREFIX: &str = "$2";

/// Hash a password or client secret for storage using Argon2id.
///
/// # Errors
///
/// Returns `argon2::password_hash::Error` if hashing fails (rare).
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Returns `true` if `stored` carries a recognized adaptive-hash prefix.
pub fn is_hashed(stored: &str) -> bool {
    stored.starts_with(ARGON2_PREFIX) || stored.starts_with(BCRYPT_PREFIX)
}

/// Verifies a password against a stored Argon2 or bcrypt hash.
///
/// Malformed hashes never verify; the failure is logged.
pub fn verify_password(password: &str, stored: &str) -> bool {
    if stored.starts_with(ARGON2_PREFIX) {
        return match PasswordHash::new(stored) {
            Ok(parsed) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored Argon2 hash is malformed");
                false
            }
        };
    }
    if stored.starts_with(BCRYPT_PREFIX) {
        return match bcrypt::verify(password, stored) {
            Ok(valid) => valid,
            Err(e) => {
                tracing::warn!(error = %e, "Stored bcrypt hash is malformed");
                false
            }
        };
    }
    false
}

/// Runs a full Argon2 verification that never succeeds.
///
/// Called for unknown user ids so that the response time does not reveal
/// whether an id exists.
pub fn verify_password_unknown_user(password: &str) -> bool {
    static DUMMY_HASH: OnceLock<Option<String>> = OnceLock::new();
    let dummy = DUMMY_HASH.get_or_init(|| hash_password("authd-unknown-user").ok());
    if let Some(dummy) = dummy {
        let _ = verify_password(password, dummy);
    }
    false
}

/// Verifies a presented client secret against the stored one.
///
/// Hashed secrets go through [`verify_password`]; plain-text secrets are
/// compared in constant time.
pub fn verify_client_secret(presented: &str, stored: &str) -> bool {
    if is_hashed(stored) {
        verify_password(presented, stored)
    } else {
        constant_time_eq(presented, stored)
    }
}

/// Constant-time string equality.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
