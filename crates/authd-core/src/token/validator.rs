//! Access-token validation against the key set.
//!
//! Unlike [`TokenService::verify_access_token`](super::TokenService::verify_access_token),
//! which only trusts the active signing key, the validator selects the
//! verification key by the token's `kid` from a [`KeySetProvider`], so tokens
//! signed by rotated-out or federated keys verify too.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Validation, decode, decode_header};

use super::claims::Claims;
use super::jwt::JwtError;
use super::service::reject_non_access_token;
use crate::keyset::KeySetProvider;
use crate::{AuthError, AuthResult};

/// Validates bearer tokens with keys from a [`KeySetProvider`].
#[derive(Clone)]
pub struct AccessTokenValidator {
    keys: Arc<KeySetProvider>,
    issuers: Vec<String>,
    leeway: Duration,
}

impl AccessTokenValidator {
    /// Creates a validator that accepts any issuer.
    pub fn new(keys: Arc<KeySetProvider>) -> Self {
        Self {
            keys,
            issuers: Vec::new(),
            leeway: Duration::ZERO,
        }
    }

    /// Only accept tokens from `issuer`. May be called repeatedly.
    #[must_use]
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuers.push(issuer.into());
        self
    }

    /// Allowed clock skew.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// The key set the validator draws from.
    pub fn key_set(&self) -> &Arc<KeySetProvider> {
        &self.keys
    }

    /// Validates `token` and returns its claims.
    ///
    /// Every entry of `audiences` must be present in the token's `aud`.
    ///
    /// # Errors
    ///
    /// `InvalidToken` for any rejected token; `Internal` when the key set
    /// cannot be resolved.
    pub async fn validate(&self, token: &str, audiences: &[&str]) -> AuthResult<Claims> {
        let keys = self.keys.get().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to resolve key set");
            AuthError::internal(format!("key set unavailable: {e}"))
        })?;

        let header = decode_header(token).map_err(JwtError::from)?;
        let kid = header
            .kid
            .filter(|kid| !kid.is_empty())
            .ok_or(JwtError::MissingKeyId)?;
        let key = keys.get(&kid).ok_or(JwtError::KeyNotFound)?;
        if !key.algorithms().contains(&header.alg) {
            return Err(JwtError::decoding_error(format!(
                "algorithm {:?} does not match key {kid}",
                header.alg
            ))
            .into());
        }

        let mut validation = Validation::new(header.alg);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = self.leeway.as_secs();
        if !self.issuers.is_empty() {
            validation.set_issuer(&self.issuers);
        }

        let decoding_key = key.decoding_key().map_err(JwtError::from)?;
        let claims = decode::<Claims>(token, &decoding_key, &validation)
            .map_err(JwtError::from)?
            .claims;

        reject_non_access_token(&claims)?;
        if let Some(missing) = audiences.iter().find(|aud| !claims.aud.contains(aud)) {
            tracing::debug!(audience = %missing, "Token audience mismatch");
            return Err(JwtError::invalid_claims("invalid audience").into());
        }
        Ok(claims)
    }

    /// Validates `token` and returns its subject.
    pub async fn validate_subject(&self, token: &str, audiences: &[&str]) -> AuthResult<String> {
        self.validate(token, audiences).await.map(|claims| claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningKey;
    use crate::keyset::KeySetConfig;
    use crate::storage::User;
    use crate::token::{TokenConfig, TokenService};

    const ISSUER: &str = "https://login.example.com";

    fn setup() -> (TokenService, AccessTokenValidator) {
        let key = Arc::new(SigningKey::generate(2048, "Primary", false).unwrap());
        let pem = key.public_key_pem().unwrap();
        let service = TokenService::new(
            key,
            TokenConfig {
                issuer: ISSUER.to_string(),
                ..TokenConfig::default()
            },
        )
        .unwrap();
        let provider = KeySetProvider::new(&[pem], KeySetConfig::default()).unwrap();
        let validator = AccessTokenValidator::new(Arc::new(provider)).with_issuer(ISSUER);
        (service, validator)
    }

    #[tokio::test]
    async fn test_validates_token_from_signing_key() {
        let (service, validator) = setup();
        let token = service
            .generate_access_token(&User::default(), "alice", "app", "openid")
            .unwrap();

        let claims = validator.validate(&token, &["app"]).await.unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(
            validator.validate_subject(&token, &[]).await.unwrap(),
            "alice"
        );
    }

    #[tokio::test]
    async fn test_audience_must_match() {
        let (service, validator) = setup();
        let token = service
            .generate_access_token(&User::default(), "alice", "app", "openid")
            .unwrap();
        let err = validator.validate(&token, &["other"]).await.unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_token");
    }

    #[tokio::test]
    async fn test_rejects_codes() {
        let (service, validator) = setup();
        let code = service
            .generate_auth_code("alice", "app", "openid", None, None)
            .unwrap();
        assert!(validator.validate(&code, &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_kid() {
        let (_, validator) = setup();
        let other = TokenService::new(
            Arc::new(SigningKey::generate(2048, "other", false).unwrap()),
            TokenConfig {
                issuer: ISSUER.to_string(),
                ..TokenConfig::default()
            },
        )
        .unwrap();
        let token = other
            .generate_access_token(&User::default(), "alice", "app", "openid")
            .unwrap();

        let err = validator.validate(&token, &[]).await.unwrap_err();
        assert_eq!(err.public_description(), "matching key not found");
    }

    #[tokio::test]
    async fn test_missing_kid() {
        let (service, validator) = setup();
        let claims = serde_json::json!({
            "iss": ISSUER,
            "sub": "alice",
            "exp": time::OffsetDateTime::now_utc().unix_timestamp() + 60,
        });
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::RS256),
            &claims,
            service.signing_key().encoding_key(),
        )
        .unwrap();

        let err = validator.validate(&token, &[]).await.unwrap_err();
        assert_eq!(err.public_description(), "missing key id");
    }

    #[tokio::test]
    async fn test_issuer_is_checked() {
        let (_, validator) = setup();
        let key = Arc::new(SigningKey::generate(2048, "primary", false).unwrap());
        let foreign = TokenService::new(
            key,
            TokenConfig {
                issuer: "https://evil.example.com".to_string(),
                ..TokenConfig::default()
            },
        )
        .unwrap();
        let token = foreign
            .generate_access_token(&User::default(), "alice", "app", "openid")
            .unwrap();
        // same kid, different key and issuer
        assert!(validator.validate(&token, &[]).await.is_err());
    }
}
