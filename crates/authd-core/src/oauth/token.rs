//! Token endpoint: request types and the grant dispatcher.
//!
//! # Supported Grant Types
//!
//! - `authorization_code`: exchange a code (with PKCE verifier if one was
//!   bound) for an access token, plus a refresh token for `offline_access`
//!   and an ID token for `openid`
//! - `refresh_token`: new access token from a refresh token
//! - `password`: resource owner credentials, access token only
//! - `client_credentials`: access token for the client itself

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::client_auth::{ClientCredentials, authenticate_client};
use super::pkce;
use super::scope::{has_scope, intersect_scope};
use super::seen_code::SeenCodeCheck;
use crate::storage::{Client, ClientStore, IdentityStore, User};
use crate::token::{TokenService, at_hash};
use crate::{AuthError, AuthResult};

/// Scope token that grants a refresh token.
pub const SCOPE_OFFLINE_ACCESS: &str = "offline_access";
/// Scope token that grants an ID token.
pub const SCOPE_OPENID: &str = "openid";

/// Token request parameters (`application/x-www-form-urlencoded`).
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub code_verifier: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let masked = |value: &Option<String>| value.as_ref().map(|_| "***");
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &masked(&self.client_secret))
            .field("code", &masked(&self.code))
            .field("code_verifier", &masked(&self.code_verifier))
            .field("refresh_token", &masked(&self.refresh_token))
            .field("username", &self.username)
            .field("password", &masked(&self.password))
            .field("scope", &self.scope)
            .finish()
    }
}

fn trimmed(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

/// Successful token response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `Bearer`.
    pub token_type: String,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Grant types served by the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    Password,
    ClientCredentials,
}

impl GrantType {
    /// Parses a `grant_type` parameter, ignoring case and surrounding space.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "password" => Some(Self::Password),
            "client_credentials" => Some(Self::ClientCredentials),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::Password => "password",
            Self::ClientCredentials => "client_credentials",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authenticates the client and dispatches to the grant handler.
pub struct TokenEndpoint {
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityStore>,
    clients: Arc<dyn ClientStore>,
    scope: String,
    refresh_token_rotation: bool,
    seen_codes: Option<Arc<dyn SeenCodeCheck>>,
}

impl TokenEndpoint {
    /// `scope` is the server-configured scope that requested scopes are
    /// intersected with.
    pub fn new(
        tokens: Arc<TokenService>,
        identities: Arc<dyn IdentityStore>,
        clients: Arc<dyn ClientStore>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            identities,
            clients,
            scope: scope.into(),
            refresh_token_rotation: false,
            seen_codes: None,
        }
    }

    /// Issue a new refresh token on every `refresh_token` grant.
    #[must_use]
    pub fn with_refresh_token_rotation(mut self, enabled: bool) -> Self {
        self.refresh_token_rotation = enabled;
        self
    }

    /// Make authorization codes single-use.
    #[must_use]
    pub fn with_seen_code_check(mut self, check: Arc<dyn SeenCodeCheck>) -> Self {
        self.seen_codes = Some(check);
        self
    }

    /// Handles a token request.
    ///
    /// `authorization` is the raw `Authorization` header, if any.
    pub async fn exchange(
        &self,
        request: &TokenRequest,
        authorization: Option<&str>,
    ) -> AuthResult<TokenResponse> {
        let grant_type = GrantType::parse(&request.grant_type);
        let credentials = ClientCredentials::resolve(
            authorization,
            request.client_id.as_deref(),
            request.client_secret.as_deref(),
        );
        tracing::debug!(
            grant_type = %request.grant_type,
            client_id = %credentials.client_id,
            basic_auth = credentials.basic_auth,
            "Token request"
        );

        let client = authenticate_client(&credentials, grant_type, self.clients.as_ref()).await?;

        let response = match grant_type {
            Some(GrantType::Password) => self.password(&client, request).await,
            Some(GrantType::AuthorizationCode) => self.authorization_code(&client, request).await,
            Some(GrantType::RefreshToken) => self.refresh_token(&client, request).await,
            Some(GrantType::ClientCredentials) => self.client_credentials(&client, request),
            None => Err(AuthError::unsupported_grant_type(
                request.grant_type.trim().to_string(),
            )),
        }?;

        tracing::info!(
            client_id = %client.client_id,
            grant_type = %request.grant_type.trim(),
            refresh_token = response.refresh_token.is_some(),
            id_token = response.id_token.is_some(),
            "Tokens issued"
        );
        Ok(response)
    }

    async fn password(&self, client: &Client, request: &TokenRequest) -> AuthResult<TokenResponse> {
        let username = trimmed(&request.username);
        let password = trimmed(&request.password);
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::invalid_request(
                "client_id, username and password parameters are required",
            ));
        }

        let subject = self
            .identities
            .authenticate(username, password)
            .await?
            .ok_or_else(|| {
                tracing::info!(client_id = %client.client_id, "Password grant rejected");
                AuthError::invalid_grant("invalid username and password combination")
            })?;
        let user = self.lookup_user(&subject).await?;
        let scope = intersect_scope(&self.scope, trimmed(&request.scope));

        let access_token = self
            .tokens
            .generate_access_token(&user, &subject, &client.client_id, &scope)?;
        Ok(self.response(access_token, None, None))
    }

    async fn authorization_code(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let code = trimmed(&request.code);
        if code.is_empty() {
            return Err(AuthError::invalid_request(
                "client_id and code parameters are required",
            ));
        }
        let grant = self
            .tokens
            .verify_auth_code(code)
            .ok_or_else(|| AuthError::invalid_grant("invalid auth code"))?;
        if !grant.client_id.eq_ignore_ascii_case(&client.client_id) {
            tracing::warn!(
                client_id = %client.client_id,
                code_client_id = %grant.client_id,
                "Auth code presented by another client"
            );
            return Err(AuthError::invalid_grant("invalid auth code"));
        }

        if let Some(challenge) = grant.challenge.as_deref() {
            let verifier = trimmed(&request.code_verifier);
            if verifier.is_empty() {
                return Err(AuthError::invalid_request(
                    "client_id, code and code_verifier parameters are required",
                ));
            }
            if !pkce::verify(challenge, verifier) {
                return Err(AuthError::invalid_grant("invalid challenge"));
            }
        }

        if let Some(seen) = &self.seen_codes {
            let expires_at = OffsetDateTime::from_unix_timestamp(grant.expires_at)
                .map_err(|e| AuthError::internal(e.to_string()))?;
            if !seen.mark_used(&grant.jti, expires_at).await? {
                tracing::warn!(client_id = %client.client_id, "Auth code replayed");
                return Err(AuthError::invalid_grant("invalid auth code"));
            }
        }

        let user = self.lookup_user(&grant.subject).await?;
        let access_token = self.tokens.generate_access_token(
            &user,
            &grant.subject,
            &client.client_id,
            &grant.scope,
        )?;
        let refresh_token = if has_scope(&grant.scope, SCOPE_OFFLINE_ACCESS) {
            Some(self.tokens.generate_refresh_token(
                &grant.subject,
                &client.client_id,
                &grant.scope,
                grant.nonce.as_deref(),
            )?)
        } else {
            None
        };
        let id_token = self.id_token(
            &user,
            client,
            &grant.scope,
            &access_token,
            grant.nonce.as_deref(),
        )?;
        Ok(self.response(access_token, refresh_token, id_token))
    }

    async fn refresh_token(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let token = trimmed(&request.refresh_token);
        if token.is_empty() {
            return Err(AuthError::invalid_request(
                "client_id and refresh_token parameters are required",
            ));
        }
        let grant = self
            .tokens
            .verify_refresh_token(token)
            .ok_or_else(|| AuthError::invalid_grant("invalid refresh_token"))?;
        if !grant.client_id.eq_ignore_ascii_case(&client.client_id) {
            return Err(AuthError::invalid_grant("invalid refresh_token"));
        }

        let user = self.lookup_user(&grant.subject).await?;
        let access_token = self.tokens.generate_access_token(
            &user,
            &grant.subject,
            &client.client_id,
            &grant.scope,
        )?;

        let rotate = self.refresh_token_rotation
            && !client.disable_refresh_rotation
            && has_scope(&grant.scope, SCOPE_OFFLINE_ACCESS);
        let refresh_token = if rotate {
            Some(self.tokens.generate_refresh_token(
                &grant.subject,
                &client.client_id,
                &grant.scope,
                grant.nonce.as_deref(),
            )?)
        } else {
            None
        };
        let id_token = self.id_token(
            &user,
            client,
            &grant.scope,
            &access_token,
            grant.nonce.as_deref(),
        )?;
        Ok(self.response(access_token, refresh_token, id_token))
    }

    fn client_credentials(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> AuthResult<TokenResponse> {
        let scope = intersect_scope(&self.scope, trimmed(&request.scope));
        let access_token = self.tokens.generate_access_token(
            &User::default(),
            &client.client_id,
            &client.client_id,
            &scope,
        )?;
        Ok(self.response(access_token, None, None))
    }

    fn id_token(
        &self,
        user: &User,
        client: &Client,
        scope: &str,
        access_token: &str,
        nonce: Option<&str>,
    ) -> AuthResult<Option<String>> {
        if !has_scope(scope, SCOPE_OPENID) {
            return Ok(None);
        }
        let token = self.tokens.generate_id_token(
            user,
            &client.client_id,
            scope,
            &at_hash(access_token),
            nonce,
        )?;
        Ok(Some(token))
    }

    async fn lookup_user(&self, subject: &str) -> AuthResult<User> {
        let person = self.identities.lookup(subject).await?.ok_or_else(|| {
            tracing::error!(subject = %subject, "Authenticated subject has no person record");
            AuthError::internal("person not found")
        })?;
        Ok(User::new(subject, person))
    }

    fn response(
        &self,
        access_token: String,
        refresh_token: Option<String>,
        id_token: Option<String>,
    ) -> TokenResponse {
        TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.tokens.access_token_ttl().as_secs(),
            refresh_token,
            id_token,
        }
    }
}
