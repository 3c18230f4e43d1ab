//! OIDC userinfo endpoint handler.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use super::{AuthState, BearerAuth, error_response, no_cache_headers};
use crate::AuthError;
use crate::storage::User;

/// `GET /userinfo` with `Authorization: Bearer <access token>`.
///
/// Returns `sub` plus the profile, email, phone and address claims of the
/// token's subject, and the configured extra ID token claims.
pub async fn userinfo_handler(State(state): State<AuthState>, auth: BearerAuth) -> Response {
    let subject = auth.subject();
    let person = match state.identities.lookup(subject).await {
        Ok(Some(person)) => person,
        Ok(None) => {
            tracing::warn!(subject = %subject, "Userinfo for unknown subject");
            let err = AuthError::internal("person not found");
            return error_response(&err, err.status_code(), &no_cache_headers());
        }
        Err(err) => return error_response(&err, err.status_code(), &no_cache_headers()),
    };

    let user = User::new(subject, person);
    let scope = auth.claims.scope.as_deref().unwrap_or_default();
    let claims = state.tokens.userinfo_claims(&user, scope);
    (no_cache_headers(), Json(claims)).into_response()
}
