//! JWT encoding and decoding with the active signing key.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, Header, TokenData, Validation, decode, encode};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::AuthError;
use crate::keys::{KeyError, SigningKey};

/// Errors that can occur during JWT operations.
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    /// Failed to encode a token.
    #[error("Failed to encode token: {message}")]
    EncodingError {
        /// Description of the encoding error.
        message: String,
    },

    /// Failed to decode a token.
    #[error("Failed to decode token: {message}")]
    DecodingError {
        /// Description of the decoding error.
        message: String,
    },

    /// The token has expired.
    #[error("Token expired")]
    Expired,

    /// The token signature is invalid.
    #[error("Invalid signature")]
    InvalidSignature,

    /// The token claims are invalid.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why claims are invalid.
        message: String,
    },

    /// The token header carries no key id.
    #[error("missing key id")]
    MissingKeyId,

    /// No key in the key set matches the header's key id.
    #[error("matching key not found")]
    KeyNotFound,

    /// Invalid key format or data.
    #[error("Invalid key: {message}")]
    InvalidKey {
        /// Description of why the key is invalid.
        message: String,
    },
}

impl JwtError {
    /// Creates a new `EncodingError`.
    #[must_use]
    pub fn encoding_error(message: impl Into<String>) -> Self {
        Self::EncodingError {
            message: message.into(),
        }
    }

    /// Creates a new `DecodingError`.
    #[must_use]
    pub fn decoding_error(message: impl Into<String>) -> Self {
        Self::DecodingError {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Returns `true` if the token itself was rejected, as opposed to a
    /// failure on the server side.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        !matches!(self, Self::EncodingError { .. } | Self::InvalidKey { .. })
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::ImmatureSignature
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidKeyFormat => {
                Self::InvalidKey {
                    message: err.to_string(),
                }
            }
            _ => Self::decoding_error(err.to_string()),
        }
    }
}

impl From<KeyError> for JwtError {
    fn from(err: KeyError) -> Self {
        Self::InvalidKey {
            message: err.to_string(),
        }
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        if err.is_validation_error() {
            AuthError::invalid_token(err.to_string())
        } else {
            AuthError::internal(err.to_string())
        }
    }
}

/// Encodes and decodes JWTs with the server's signing key.
///
/// Every token header carries the signing key's `kid`.
pub struct JwtService {
    signing_key: Arc<SigningKey>,
    decoding_key: DecodingKey,
    issuer: String,
    leeway: Duration,
}

impl JwtService {
    /// Creates a new JWT service.
    ///
    /// # Errors
    /// Returns an error if the public half of the key cannot be converted.
    pub fn new(
        signing_key: Arc<SigningKey>,
        issuer: impl Into<String>,
        leeway: Duration,
    ) -> Result<Self, JwtError> {
        let decoding_key = signing_key.public_key().decoding_key()?;
        Ok(Self {
            signing_key,
            decoding_key,
            issuer: issuer.into(),
            leeway,
        })
    }

    /// Encodes claims into a JWT string.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(self.signing_key.algorithm());
        header.kid = Some(self.signing_key.kid().to_string());

        encode(&header, claims, self.signing_key.encoding_key())
            .map_err(|e| JwtError::encoding_error(e.to_string()))
    }

    /// Decodes a JWT signed by this server and validates signature, issuer
    /// and expiry. Audiences are checked by the caller.
    ///
    /// # Errors
    /// Returns an error if decoding or validation fails.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(self.signing_key.algorithm());
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = self.leeway.as_secs();

        decode(token, &self.decoding_key, &validation).map_err(JwtError::from)
    }

    /// Key id of the signing key.
    #[must_use]
    pub fn kid(&self) -> &str {
        self.signing_key.kid()
    }

    /// Returns the issuer URL.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// The signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}
