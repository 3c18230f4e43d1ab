//! PKCE (Proof Key for Code Exchange), RFC 7636, `S256` method only.
//!
//! # Example
//!
//! ```
//! use authd_core::oauth::pkce;
//!
//! let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
//! let challenge = pkce::s256_challenge(verifier);
//! assert!(pkce::verify(&challenge, verifier));
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Errors raised while validating PKCE parameters of an authorization request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PkceError {
    /// Unsupported challenge method (only S256 is supported).
    #[error("Unsupported challenge method: {0}. Only S256 is supported.")]
    UnsupportedMethod(String),

    /// A challenge method was given without a challenge.
    #[error("code_challenge and code_challenge_method=S256 required for PKCE")]
    MissingChallenge,
}

/// PKCE challenge method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PkceChallengeMethod {
    /// SHA-256 hash (the only supported method).
    #[default]
    S256,
}

impl PkceChallengeMethod {
    /// Parse challenge method from string.
    ///
    /// # Errors
    ///
    /// Returns `PkceError::UnsupportedMethod` if the method is not "S256".
    pub fn parse(method: &str) -> Result<Self, PkceError> {
        match method {
            "S256" => Ok(Self::S256),
            other => Err(PkceError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Get the method as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S256 => "S256",
        }
    }
}

impl std::fmt::Display for PkceChallengeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Checks the challenge parameters of an authorization request.
///
/// Without a method no PKCE is requested and any challenge is passed through
/// as-is. With a method it must be `S256` and the challenge must be non-empty.
pub fn validate_request<'a>(
    challenge: Option<&'a str>,
    method: Option<&str>,
) -> Result<Option<&'a str>, PkceError> {
    let challenge = challenge.map(str::trim).filter(|c| !c.is_empty());
    let Some(method) = method.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(challenge);
    };
    PkceChallengeMethod::parse(method)?;
    challenge.map(Some).ok_or(PkceError::MissingChallenge)
}

/// `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Whether `verifier` hashes to `challenge`. Compared in constant time.
#[must_use]
pub fn verify(challenge: &str, verifier: &str) -> bool {
    let expected = s256_challenge(verifier);
    expected.as_bytes().ct_eq(challenge.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_rfc7636_appendix_b() {
        assert_eq!(s256_challenge(RFC_VERIFIER), RFC_CHALLENGE);
        assert!(verify(RFC_CHALLENGE, RFC_VERIFIER));
    }

    #[test]
    fn test_wrong_verifier_fails() {
        assert!(!verify(RFC_CHALLENGE, &format!("{RFC_VERIFIER}x")));
        assert!(!verify(RFC_CHALLENGE, ""));
        assert!(!verify("", RFC_VERIFIER));
    }

    /// Generates a random 43-character verifier from 32 bytes of entropy.
    fn generate_verifier() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    #[test]
    fn test_generated_verifier() {
        let v1 = generate_verifier();
        let v2 = generate_verifier();
        assert_eq!(v1.len(), 43);
        assert_ne!(v1, v2);
        assert!(verify(&s256_challenge(&v1), &v1));
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!(PkceChallengeMethod::parse("S256").unwrap(), PkceChallengeMethod::S256);
        assert_eq!(PkceChallengeMethod::S256.to_string(), "S256");
        assert!(matches!(
            PkceChallengeMethod::parse("plain"),
            Err(PkceError::UnsupportedMethod(m)) if m == "plain"
        ));
    }

    #[test]
    fn test_validate_request() {
        assert_eq!(validate_request(None, None).unwrap(), None);
        assert_eq!(validate_request(Some("abc"), None).unwrap(), Some("abc"));
        assert_eq!(
            validate_request(Some(RFC_CHALLENGE), Some("S256")).unwrap(),
            Some(RFC_CHALLENGE)
        );
        assert_eq!(
            validate_request(Some(" "), Some("S256")),
            Err(PkceError::MissingChallenge)
        );
        assert!(matches!(
            validate_request(Some("abc"), Some("plain")),
            Err(PkceError::UnsupportedMethod(_))
        ));
    }
}
