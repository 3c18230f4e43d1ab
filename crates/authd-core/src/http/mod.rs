//! HTTP handlers for the identity provider endpoints.
//!
//! # Available Handlers
//!
//! - [`authorize`]: authorization endpoint (`GET /authorize`)
//! - [`token`]: token endpoint (`POST /token`)
//! - [`jwks`]: key set export (`GET /jwks`)
//! - [`userinfo`]: OIDC userinfo (`GET /userinfo`)
//! - [`login`]: minimal login collaborator (`GET|POST /login`)
//! - [`logout`]: ends the login session (`GET|POST /logout`)
//! - [`discovery`]: provider metadata (`GET /.well-known/openid-configuration`)
//! - [`bearer`]: bearer-token extractor backed by the key set

pub mod authorize;
pub mod bearer;
pub mod discovery;
pub mod jwks;
pub mod login;
pub mod logout;
pub mod token;
pub mod userinfo;

use std::sync::Arc;

use axum::Router;
use axum::extract::FromRef;
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::embedded::{EmbeddedClientStore, EmbeddedIdentityStore, EmbeddedOtpStore};
use crate::keys::SigningKey;
use crate::keyset::{KeySetConfig, KeySetProvider};
use crate::oauth::{AuthorizationEndpoint, InMemorySeenCodes, TokenEndpoint};
use crate::storage::{ClientStore, IdentityStore, OtpStore};
use crate::token::{AccessTokenValidator, TokenConfig, TokenService};
use crate::{AuthError, AuthResult};

pub use bearer::{BearerAuth, BearerAuthError, BearerAuthState};

/// Shared state of all endpoints.
#[derive(Clone)]
pub struct AuthState {
    pub tokens: Arc<TokenService>,
    pub identities: Arc<dyn IdentityStore>,
    pub clients: Arc<dyn ClientStore>,
    pub otp_keys: Arc<dyn OtpStore>,
    pub keys: Arc<KeySetProvider>,
    pub authorization: Arc<AuthorizationEndpoint>,
    pub token_endpoint: Arc<TokenEndpoint>,
    pub bearer: BearerAuthState,
    /// Default session cookie name.
    pub session_name: String,
    /// Server-configured scope.
    pub scope: String,
}

impl AuthState {
    /// Wires the endpoints to the given collaborators.
    ///
    /// The signing key's public half is always the first entry of the key
    /// set, followed by `config.additional_keys`.
    pub fn new(
        config: &AuthConfig,
        signing_key: Arc<SigningKey>,
        identities: Arc<dyn IdentityStore>,
        clients: Arc<dyn ClientStore>,
        otp_keys: Arc<dyn OtpStore>,
    ) -> AuthResult<Self> {
        let own_key = signing_key
            .public_key_pem()
            .map_err(|e| AuthError::configuration(e.to_string()))?;
        let references: Vec<&str> = std::iter::once(own_key.as_str())
            .chain(config.additional_keys.iter().map(String::as_str))
            .collect();
        let keys = Arc::new(
            KeySetProvider::new(&references, KeySetConfig::from_auth_config(config))
                .map_err(|e| AuthError::configuration(e.to_string()))?,
        );

        let tokens = Arc::new(
            TokenService::new(signing_key, TokenConfig::from_auth_config(config))
                .map_err(|e| AuthError::configuration(e.to_string()))?,
        );
        let scope = config.server_scope();

        let authorization = AuthorizationEndpoint::new(
            Arc::clone(&tokens),
            Arc::clone(&identities),
            Arc::clone(&clients),
            scope.clone(),
            config.session_name.clone(),
        );
        let mut token_endpoint = TokenEndpoint::new(
            Arc::clone(&tokens),
            Arc::clone(&identities),
            Arc::clone(&clients),
            scope,
        )
        .with_refresh_token_rotation(config.refresh_token_rotation);
        if config.single_use_codes {
            token_endpoint = token_endpoint.with_seen_code_check(Arc::new(InMemorySeenCodes::new()));
        }

        let validator = AccessTokenValidator::new(Arc::clone(&keys))
            .with_issuer(config.issuer.clone())
            .with_leeway(config.leeway);

        Ok(Self {
            tokens,
            identities,
            clients,
            otp_keys,
            keys,
            authorization: Arc::new(authorization),
            token_endpoint: Arc::new(token_endpoint),
            bearer: BearerAuthState::new(Arc::new(validator), config.session_name.clone()),
            session_name: config.session_name.clone(),
            scope: config.server_scope(),
        })
    }

    /// State backed by the users and clients of the configuration file.
    pub fn embedded(config: &AuthConfig, signing_key: Arc<SigningKey>) -> AuthResult<Self> {
        let identities = Arc::new(EmbeddedIdentityStore::new(
            config.users.clone(),
            config.session_ttl,
        ));
        let clients = Arc::new(EmbeddedClientStore::new(config.clients.clone()));
        let otp_keys = Arc::new(EmbeddedOtpStore::new(&config.users)?);
        Self::new(config, signing_key, identities, clients, otp_keys)
    }
}

impl FromRef<AuthState> for BearerAuthState {
    fn from_ref(state: &AuthState) -> Self {
        state.bearer.clone()
    }
}

/// Endpoints called by clients and resource servers.
///
/// `/token`, `/jwks`, `/userinfo` and the discovery document; these are the
/// cross-origin ones.
pub fn api_router(state: AuthState) -> Router {
    Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(discovery::openid_configuration_handler),
        )
        .route("/token", post(token::token_handler))
        .route("/jwks", get(jwks::jwks_handler))
        .route(
            "/userinfo",
            get(userinfo::userinfo_handler).post(userinfo::userinfo_handler),
        )
        .with_state(state)
}

/// Endpoints visited by the user agent: `/authorize`, `/login` and `/logout`.
pub fn browser_router(state: AuthState) -> Router {
    Router::new()
        .route("/authorize", get(authorize::authorize_handler))
        .route(
            "/login",
            get(login::login_page_handler).post(login::login_submit_handler),
        )
        .route(
            "/logout",
            get(logout::logout_handler).post(logout::logout_handler),
        )
        .with_state(state)
}

/// OAuth 2.0 error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

impl ErrorResponse {
    pub fn from_error(error: &AuthError) -> Self {
        Self {
            error: error.oauth_error_code().to_string(),
            error_description: error.public_description(),
        }
    }
}

/// Logs `error` and turns it into a JSON error response with `status`.
pub(crate) fn error_response(
    error: &AuthError,
    status: StatusCode,
    headers: &[(HeaderName, HeaderValue)],
) -> Response {
    if error.is_server_error() {
        tracing::error!(error = %error, category = %error.category(), "Request failed");
    } else {
        tracing::info!(error = %error, category = %error.category(), "Request rejected");
    }

    let mut response = (status, Json(ErrorResponse::from_error(error))).into_response();
    for (name, value) in headers {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    response
}

/// `Cache-Control`, `Pragma` and `Expires` headers that disable caching.
pub(crate) fn no_cache_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::EXPIRES, HeaderValue::from_static("0")),
    ]
}
