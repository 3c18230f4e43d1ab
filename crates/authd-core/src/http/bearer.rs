//! Bearer-token extractor.
//!
//! Validates `Authorization: Bearer <token>` with the key-set backed
//! [`AccessTokenValidator`] and yields the token's claims. Rejections carry a
//! `WWW-Authenticate` challenge naming the realm.

use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};

use crate::token::{AccessTokenValidator, Claims};

/// State needed by the [`BearerAuth`] extractor.
#[derive(Clone)]
pub struct BearerAuthState {
    pub validator: Arc<AccessTokenValidator>,
    /// Realm announced in `WWW-Authenticate`.
    pub realm: String,
}

impl BearerAuthState {
    pub fn new(validator: Arc<AccessTokenValidator>, realm: impl Into<String>) -> Self {
        Self {
            validator,
            realm: realm.into(),
        }
    }
}

/// Claims of a validated access token.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    pub claims: Claims,
    /// The raw token.
    pub token: String,
}

impl BearerAuth {
    pub fn subject(&self) -> &str {
        &self.claims.sub
    }
}

/// Rejection of the [`BearerAuth`] extractor; always 401.
#[derive(Debug, Clone)]
pub struct BearerAuthError {
    pub error: &'static str,
    pub error_description: String,
    pub realm: String,
}

impl BearerAuthError {
    fn challenge(&self) -> String {
        let realm = self.realm.replace('"', "");
        if self.error == "invalid_token" {
            format!(
                "Bearer realm=\"{realm}\", error=\"invalid_token\", error_description=\"{}\"",
                self.error_description.replace('"', "'")
            )
        } else {
            format!("Bearer realm=\"{realm}\"")
        }
    }
}

impl IntoResponse for BearerAuthError {
    fn into_response(self) -> Response {
        let challenge = HeaderValue::from_str(&self.challenge())
            .unwrap_or_else(|_| HeaderValue::from_static("Bearer"));
        let body = Json(serde_json::json!({
            "error": self.error,
            "error_description": self.error_description,
        }));
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge)],
            body,
        )
            .into_response()
    }
}

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    BearerAuthState: FromRef<S>,
{
    type Rejection = BearerAuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = BearerAuthState::from_ref(state);

        let Some(token) = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(extract_bearer_token)
        else {
            return Err(BearerAuthError {
                error: "unauthorized",
                error_description: "authentication required".to_string(),
                realm: state.realm,
            });
        };

        match state.validator.validate(token, &[]).await {
            Ok(claims) => Ok(Self {
                claims,
                token: token.to_string(),
            }),
            Err(err) => {
                if err.is_server_error() {
                    tracing::error!(error = %err, "Bearer token validation failed");
                } else {
                    tracing::debug!(
                        error = %err,
                        endpoint = %parts.uri.path(),
                        "Bearer token rejected"
                    );
                }
                Err(BearerAuthError {
                    error: "invalid_token",
                    error_description: err.public_description(),
                    realm: state.realm,
                })
            }
        }
    }
}

/// Token of a `Bearer` authorization header value; the scheme is case-insensitive.
pub fn extract_bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
