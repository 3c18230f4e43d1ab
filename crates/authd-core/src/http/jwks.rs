//! JWKS endpoint handler.
//!
//! Serves every key of the key set (the signing key first among them) as an
//! RFC 7517 document, sorted by `kid`, each with `"use": "sig"`.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};

use super::{AuthState, error_response, no_cache_headers};
use crate::AuthError;

/// `GET /jwks`.
pub async fn jwks_handler(State(state): State<AuthState>) -> Response {
    let jwks = state
        .keys
        .get()
        .await
        .map_err(|e| AuthError::internal(format!("key retrieval failed: {e}")))
        .and_then(|keys| {
            keys.to_jwks()
                .map_err(|e| AuthError::internal(format!("key export failed: {e}")))
        });

    match jwks {
        Ok(jwks) => (no_cache_headers(), Json(jwks)).into_response(),
        Err(err) => error_response(&err, err.status_code(), &no_cache_headers()),
    }
}
