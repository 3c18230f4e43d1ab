//! Authorization endpoint state machine.
//!
//! ```text
//! validate params -> resolve client -> check redirect pattern
//!     -> check session --(no verified session)--> login redirect
//!     -> dispatch response_type -> redirect to client
//! ```
//!
//! `token` responses travel in the URI fragment, `code` responses in the
//! query string.

use std::sync::Arc;

use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

use super::pkce;
use super::scope::intersect_scope;
use crate::storage::{ClientStore, IdentityStore, User};
use crate::token::TokenService;
use crate::{AuthError, AuthResult};

/// Query parameters of an authorization request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthorizeRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub nonce: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Where the user agent is sent next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizeOutcome {
    /// No verified session: go to the login collaborator, then come back.
    Login { location: String },
    /// Flow finished: back to the client's redirect URI.
    Redirect { location: String },
}

impl AuthorizeOutcome {
    pub fn location(&self) -> &str {
        match self {
            Self::Login { location } | Self::Redirect { location } => location,
        }
    }
}

/// Drives one authorization request through the state machine.
pub struct AuthorizationEndpoint {
    tokens: Arc<TokenService>,
    identities: Arc<dyn IdentityStore>,
    clients: Arc<dyn ClientStore>,
    scope: String,
    session_name: String,
}

impl AuthorizationEndpoint {
    pub fn new(
        tokens: Arc<TokenService>,
        identities: Arc<dyn IdentityStore>,
        clients: Arc<dyn ClientStore>,
        scope: impl Into<String>,
        session_name: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            identities,
            clients,
            scope: scope.into(),
            session_name: session_name.into(),
        }
    }

    /// Login URL that resumes this request once a session exists.
    pub fn login_location(&self, raw_query: &str) -> String {
        let base = self.tokens.issuer().trim_end_matches('/');
        if raw_query.is_empty() {
            format!("{base}/login")
        } else {
            format!("{base}/login?{raw_query}")
        }
    }

    /// Processes an authorization request.
    ///
    /// `raw_query` is the original query string, replayed to the login
    /// collaborator so the request can resume afterwards.
    pub async fn authorize(
        &self,
        request: &AuthorizeRequest,
        raw_query: &str,
        jar: &CookieJar,
    ) -> AuthResult<AuthorizeOutcome> {
        let response_type = param(&request.response_type).to_lowercase();
        let client_id = param(&request.client_id).to_lowercase();
        let redirect_uri = param(&request.redirect_uri);
        if response_type.is_empty() || client_id.is_empty() || redirect_uri.is_empty() {
            return Err(AuthError::invalid_request(
                "client_id, redirect_uri and response_type parameters are required",
            ));
        }

        let client = self.clients.lookup(&client_id).await?.ok_or_else(|| {
            tracing::info!(client_id = %client_id, "Authorization request for unknown client");
            AuthError::unauthorized_client("client not found")
        })?;
        if response_type == "token" && client.disable_implicit {
            return Err(AuthError::unsupported_grant_type(&response_type));
        }

        if !client.matches_redirect_uri(redirect_uri)? {
            tracing::warn!(
                client_id = %client_id,
                redirect_uri = %redirect_uri,
                "Redirect URI does not match client pattern"
            );
            return Err(AuthError::redirect_uri_mismatch(redirect_uri));
        }

        let session_name = client.session_name_or(&self.session_name);
        let session = self.identities.is_session_active(jar, session_name).await?;
        if !session.is_authenticated() {
            tracing::debug!(
                client_id = %client_id,
                session_name = %session_name,
                active = session.active,
                verified = session.verified,
                "No verified session, redirecting to login"
            );
            return Ok(AuthorizeOutcome::Login {
                location: self.login_location(raw_query),
            });
        }

        let subject = session.subject;
        let person = self.identities.lookup(&subject).await?.ok_or_else(|| {
            tracing::error!(subject = %subject, "Session subject has no person record");
            AuthError::internal("person not found")
        })?;
        let user = User::new(subject.clone(), person);
        let scope = intersect_scope(&self.scope, param(&request.scope));
        let state = param(&request.state);

        let location = match response_type.as_str() {
            "token" => {
                let access_token = self
                    .tokens
                    .generate_access_token(&user, &subject, &client_id, &scope)?;
                let expires_in = self.tokens.access_token_ttl().as_secs().to_string();
                let mut fragment = url::form_urlencoded::Serializer::new(String::new());
                fragment
                    .append_pair("access_token", &access_token)
                    .append_pair("token_type", "Bearer")
                    .append_pair("expires_in", &expires_in);
                if !state.is_empty() {
                    fragment.append_pair("state", state);
                }
                format!("{redirect_uri}#{}", fragment.finish())
            }
            "code" => {
                let challenge = pkce::validate_request(
                    request.code_challenge.as_deref(),
                    request.code_challenge_method.as_deref(),
                )
                .map_err(|e| AuthError::invalid_request(e.to_string()))?;
                let code = self.tokens.generate_auth_code(
                    &subject,
                    &client_id,
                    &scope,
                    challenge,
                    request.nonce.as_deref().map(str::trim),
                )?;
                let mut query = url::form_urlencoded::Serializer::new(String::new());
                query.append_pair("code", &code);
                if !state.is_empty() {
                    query.append_pair("state", state);
                }
                let separator = if redirect_uri.contains('?') { '&' } else { '?' };
                format!("{redirect_uri}{separator}{}", query.finish())
            }
            other => return Err(AuthError::unsupported_grant_type(other)),
        };

        tracing::info!(
            client_id = %client_id,
            response_type = %response_type,
            "Authorization granted"
        );
        Ok(AuthorizeOutcome::Redirect { location })
    }
}

fn param(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}
