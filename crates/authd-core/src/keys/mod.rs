//! Key material: the signing key, public keys and their JWK form.
//!
//! - [`SigningKey`] - the single RSA key that signs every token
//! - [`PublicKey`] - RSA, P-256 or P-384 verification key
//! - [`Jwk`] / [`Jwks`] - RFC 7517 representation
//! - [`PemBlock`] - PEM envelope with `kid` header support

mod pem;
mod public;
mod signing;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use pem::{HEADER_KEY_ID, PemBlock};
pub use public::PublicKey;
pub use signing::{MIN_KEY_BITS, SigningKey};

/// Errors raised while loading, parsing or converting key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The PEM envelope could not be parsed.
    #[error("malformed PEM: {0}")]
    MalformedPem(String),

    /// The PEM label or JWK `kty`/`crv` is not supported.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),

    /// The key body could not be decoded.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// No usable signing key was configured.
    #[error("missing or malformed signing key")]
    MissingSigningKey,

    /// A key file could not be read.
    #[error("failed to read key file {path}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Key generation or serialization failed.
    #[error("key generation failed: {0}")]
    Generation(String),
}

impl KeyError {
    pub(crate) fn invalid(err: impl std::fmt::Display) -> Self {
        Self::InvalidKey(err.to_string())
    }
}

/// JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwks {
    /// The keys in this set.
    pub keys: Vec<Jwk>,
}

/// JSON Web Key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" or "EC").
    pub kty: String,

    /// Key ID.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub kid: String,

    /// Key use ("sig" for signing).
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Algorithm.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    // RSA-specific fields
    /// RSA modulus (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA exponent (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,

    // EC-specific fields
    /// EC curve name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url encoded).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwks_parses_minimal_keys() {
        let json = r#"{"keys":[{"kty":"RSA","kid":"a","n":"AQAB","e":"AQAB"},{"kty":"EC","crv":"P-256","x":"AA","y":"AA"}]}"#;
        let jwks: Jwks = serde_json::from_str(json).unwrap();
        assert_eq!(jwks.keys.len(), 2);
        assert_eq!(jwks.keys[0].kid, "a");
        assert!(jwks.keys[0].alg.is_none());
        assert_eq!(jwks.keys[1].kid, "");
    }

    #[test]
    fn test_jwk_serializes_use_field() {
        let jwk = Jwk {
            kty: "RSA".to_string(),
            kid: "k".to_string(),
            use_: Some("sig".to_string()),
            ..Jwk::default()
        };
        let value = serde_json::to_value(&jwk).unwrap();
        assert_eq!(value["use"], "sig");
        assert!(value.get("crv").is_none());
    }

    #[test]
    fn test_key_error_messages() {
        assert_eq!(
            KeyError::UnsupportedKeyType("DSA PRIVATE KEY".to_string()).to_string(),
            "unsupported key type: DSA PRIVATE KEY"
        );
        assert_eq!(
            KeyError::MissingSigningKey.to_string(),
            "missing or malformed signing key"
        );
    }
}
