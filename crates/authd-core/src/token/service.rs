//! Token Service: mints and verifies access tokens, authorization codes,
//! refresh tokens and ID tokens.
//!
//! The service holds no token table. A token is valid when its signature,
//! issuer, type tag and expiry check out, which makes every operation a pure
//! function of its inputs and the immutable signing key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Map;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::claims::{
    Audience, ClaimTemplate, Claims, TokenType, add_extra_claims, add_scoped_person_claims,
};
use super::jwt::{JwtError, JwtService};
use crate::config::AuthConfig;
use crate::keys::SigningKey;
use crate::roles::RoleMappings;
use crate::storage::User;

/// Lifetimes and claim configuration of issued tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub issuer: String,
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub id_token_ttl: Duration,
    pub auth_code_ttl: Duration,
    pub leeway: Duration,
    pub access_token_extra_claims: HashMap<String, ClaimTemplate>,
    pub id_token_extra_claims: HashMap<String, ClaimTemplate>,
    pub roles: RoleMappings,
}

impl TokenConfig {
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
            id_token_ttl: config.id_token_ttl,
            auth_code_ttl: config.auth_code_ttl,
            leeway: config.leeway,
            access_token_extra_claims: config.access_token_extra_claims.clone(),
            id_token_extra_claims: config.id_token_extra_claims.clone(),
            roles: config.roles.clone(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self::from_auth_config(&AuthConfig::default())
    }
}

/// Contents of a verified authorization code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthCodeGrant {
    pub subject: String,
    /// Client the code was issued to.
    pub client_id: String,
    pub scope: String,
    /// PKCE `S256` challenge, if one was presented at the authorization endpoint.
    pub challenge: Option<String>,
    pub nonce: Option<String>,
    /// Unique code id, used for single-use enforcement.
    pub jti: String,
    /// Expiry as a unix timestamp.
    pub expires_at: i64,
}

/// Contents of a verified refresh token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshGrant {
    pub subject: String,
    pub client_id: String,
    pub scope: String,
    pub nonce: Option<String>,
}

/// Issues and verifies the four token kinds.
///
/// Cheap to share behind an `Arc`; safe for unlimited concurrent use.
pub struct TokenService {
    jwt: JwtService,
    config: TokenConfig,
}

impl TokenService {
    /// Creates a token service signing with `signing_key`.
    ///
    /// # Errors
    /// Returns an error if the key's public half cannot be used for verification.
    pub fn new(signing_key: Arc<SigningKey>, config: TokenConfig) -> Result<Self, JwtError> {
        let jwt = JwtService::new(signing_key, config.issuer.clone(), config.leeway)?;
        Ok(Self { jwt, config })
    }

    /// Issuer placed in every token.
    pub fn issuer(&self) -> &str {
        self.jwt.issuer()
    }

    /// The signing key.
    pub fn signing_key(&self) -> &SigningKey {
        self.jwt.signing_key()
    }

    /// Lifetime of access tokens, reported as `expires_in`.
    pub fn access_token_ttl(&self) -> Duration {
        self.config.access_token_ttl
    }

    /// Roles derived for `user` from the configured rules.
    pub fn roles(&self, user: &User) -> Vec<String> {
        self.config.roles.roles(user)
    }

    fn base_claims(&self, subject: &str, audience: &str, ttl: Duration) -> Claims {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Claims {
            iss: self.jwt.issuer().to_string(),
            sub: subject.to_string(),
            aud: Audience::from(audience),
            iat: now,
            exp: now.saturating_add(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)),
            jti: Uuid::new_v4().to_string(),
            token_type: None,
            scope: None,
            code_challenge: None,
            nonce: None,
            at_hash: None,
            extra: Map::new(),
        }
    }

    /// Mints an access token for `subject` and `audience` (the client id).
    ///
    /// Extra claims configured for access tokens are rendered from `user`.
    pub fn generate_access_token(
        &self,
        user: &User,
        subject: &str,
        audience: &str,
        scope: &str,
    ) -> Result<String, JwtError> {
        let mut claims = self.base_claims(subject, audience, self.config.access_token_ttl);
        claims.token_type = Some(TokenType::AccessToken);
        claims.scope = Some(scope.to_string());
        let roles = self.roles(user);
        add_extra_claims(
            &mut claims.extra,
            &self.config.access_token_extra_claims,
            user,
            &roles,
            scope,
        );
        self.jwt.encode(&claims)
    }

    /// Mints an authorization code bound to `client_id`.
    pub fn generate_auth_code(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
        challenge: Option<&str>,
        nonce: Option<&str>,
    ) -> Result<String, JwtError> {
        let mut claims = self.base_claims(subject, client_id, self.config.auth_code_ttl);
        claims.token_type = Some(TokenType::AuthCode);
        claims.scope = Some(scope.to_string());
        claims.code_challenge = non_empty(challenge);
        claims.nonce = non_empty(nonce);
        self.jwt.encode(&claims)
    }

    /// Verifies an authorization code. Any failure yields `None`.
    pub fn verify_auth_code(&self, code: &str) -> Option<AuthCodeGrant> {
        let claims = self.verify_typed(code, TokenType::AuthCode)?;
        Some(AuthCodeGrant {
            client_id: first_audience(&claims.aud),
            subject: claims.sub,
            scope: claims.scope.unwrap_or_default(),
            challenge: claims.code_challenge,
            nonce: claims.nonce,
            jti: claims.jti,
            expires_at: claims.exp,
        })
    }

    /// Mints a refresh token carrying scope and nonce for later ID tokens.
    pub fn generate_refresh_token(
        &self,
        subject: &str,
        client_id: &str,
        scope: &str,
        nonce: Option<&str>,
    ) -> Result<String, JwtError> {
        let mut claims = self.base_claims(subject, client_id, self.config.refresh_token_ttl);
        claims.token_type = Some(TokenType::RefreshToken);
        claims.scope = Some(scope.to_string());
        claims.nonce = non_empty(nonce);
        self.jwt.encode(&claims)
    }

    /// Verifies a refresh token. Any failure yields `None`.
    pub fn verify_refresh_token(&self, token: &str) -> Option<RefreshGrant> {
        let claims = self.verify_typed(token, TokenType::RefreshToken)?;
        Some(RefreshGrant {
            client_id: first_audience(&claims.aud),
            subject: claims.sub,
            scope: claims.scope.unwrap_or_default(),
            nonce: claims.nonce,
        })
    }

    /// Mints an OIDC ID token for `user`.
    ///
    /// Profile, email, phone and address claims are included only when the
    /// matching scope token is granted.
    pub fn generate_id_token(
        &self,
        user: &User,
        client_id: &str,
        scope: &str,
        at_hash: &str,
        nonce: Option<&str>,
    ) -> Result<String, JwtError> {
        let mut claims = self.base_claims(&user.user_id, client_id, self.config.id_token_ttl);
        claims.nonce = non_empty(nonce);
        claims.at_hash = non_empty(Some(at_hash));
        add_scoped_person_claims(&mut claims.extra, &user.person, scope);
        let roles = self.roles(user);
        add_extra_claims(
            &mut claims.extra,
            &self.config.id_token_extra_claims,
            user,
            &roles,
            scope,
        );
        self.jwt.encode(&claims)
    }

    /// Claims returned by the userinfo endpoint for a token with `scope`.
    ///
    /// Every standard claim group is included; extra claims follow the
    /// ID token configuration.
    pub fn userinfo_claims(&self, user: &User, scope: &str) -> Map<String, serde_json::Value> {
        let mut claims = Map::new();
        claims.insert("sub".to_string(), user.user_id.clone().into());
        add_scoped_person_claims(&mut claims, &user.person, "profile email phone address");
        let roles = self.roles(user);
        add_extra_claims(
            &mut claims,
            &self.config.id_token_extra_claims,
            user,
            &roles,
            scope,
        );
        claims
    }

    /// Verifies a bearer token and returns its subject.
    ///
    /// Authorization codes and refresh tokens are rejected.
    pub fn verify_access_token(&self, token: &str) -> Result<String, JwtError> {
        self.verify_access_token_claims(token).map(|claims| claims.sub)
    }

    /// Like [`verify_access_token`](Self::verify_access_token), returning all claims.
    pub fn verify_access_token_claims(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.jwt.decode::<Claims>(token)?.claims;
        reject_non_access_token(&claims)?;
        Ok(claims)
    }

    fn verify_typed(&self, token: &str, expected: TokenType) -> Option<Claims> {
        match self.jwt.decode::<Claims>(token) {
            Ok(data) if data.claims.token_type == Some(expected) => Some(data.claims),
            Ok(data) => {
                tracing::debug!(
                    expected = ?expected,
                    actual = ?data.claims.token_type,
                    "Token type mismatch"
                );
                None
            }
            Err(e) => {
                tracing::debug!(error = %e, "Token verification failed");
                None
            }
        }
    }
}

/// Rejects codes and refresh tokens presented as bearer tokens.
pub(crate) fn reject_non_access_token(claims: &Claims) -> Result<(), JwtError> {
    match claims.token_type {
        Some(TokenType::AuthCode | TokenType::RefreshToken) => Err(JwtError::invalid_claims(
            "auth code or refresh token used as access token",
        )),
        _ => Ok(()),
    }
}

/// OIDC `at_hash`: base64url of the left half of SHA-256 over the access token.
pub fn at_hash(access_token: &str) -> String {
    let digest = Sha256::digest(access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(&digest[..16])
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn first_audience(aud: &Audience) -> String {
    match aud {
        Audience::One(aud) => aud.clone(),
        Audience::Many(auds) => auds.first().cloned().unwrap_or_default(),
    }
}
