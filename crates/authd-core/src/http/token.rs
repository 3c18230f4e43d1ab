//! Token endpoint handler.
//!
//! ```text
//! POST /token
//! Content-Type: application/x-www-form-urlencoded
//! Authorization: Basic <base64(client_id:client_secret)>
//!
//! grant_type=authorization_code&code=...&code_verifier=...
//! ```
//!
//! The response body is serialized in full before it is sent and always
//! carries an exact `Content-Length`.

use axum::Form;
use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::FormRejection;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::Response;

use super::{AuthState, error_response};
use crate::AuthError;
use crate::oauth::{TokenRequest, TokenResponse};

fn token_headers() -> [(HeaderName, HeaderValue); 3] {
    [
        (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ),
    ]
}

/// `POST /token`.
pub async fn token_handler(
    State(state): State<AuthState>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed token request");
            let err = AuthError::invalid_request(rejection.body_text());
            return error_response(&err, StatusCode::BAD_REQUEST, &token_headers());
        }
    };
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    match state.token_endpoint.exchange(&request, authorization).await {
        Ok(response) => token_success_response(&response),
        Err(err) => error_response(&err, err.status_code(), &token_headers()),
    }
}

fn token_success_response(response: &TokenResponse) -> Response {
    let body = match serde_json::to_vec(response) {
        Ok(body) => body,
        Err(e) => {
            let err = AuthError::internal(format!("failed to serialize token response: {e}"));
            return error_response(&err, err.status_code(), &token_headers());
        }
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len());
    for (name, value) in token_headers() {
        builder = builder.header(name, value);
    }
    builder.body(Body::from(body)).unwrap_or_else(|e| {
        let err = AuthError::internal(e.to_string());
        error_response(&err, err.status_code(), &token_headers())
    })
}
