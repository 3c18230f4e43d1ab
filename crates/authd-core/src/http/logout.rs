//! Logout handler.
//!
//! Ends the login session of the requesting client and removes its cookie.
//! With `post_logout_redirect_uri` the user agent is sent back to the client,
//! which must be named by `client_id` and whose redirect pattern must accept
//! the URI.

use axum::extract::{Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use super::{AuthState, no_cache_headers};
use crate::AuthError;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogoutQuery {
    pub client_id: Option<String>,
    pub post_logout_redirect_uri: Option<String>,
    pub state: Option<String>,
}

fn text(status: StatusCode, body: &'static str) -> Response {
    let mut response = (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        body,
    )
        .into_response();
    response.headers_mut().extend(no_cache_headers());
    response
}

fn internal(err: &AuthError) -> Response {
    tracing::error!(error = %err, "Logout failed");
    text(StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n")
}

fn param(value: &Option<String>) -> &str {
    value.as_deref().map(str::trim).unwrap_or_default()
}

/// `GET|POST /logout`.
pub async fn logout_handler(
    State(state): State<AuthState>,
    Query(query): Query<LogoutQuery>,
    jar: CookieJar,
) -> Response {
    let client_id = param(&query.client_id).to_lowercase();
    let redirect_uri = param(&query.post_logout_redirect_uri);

    let client = if client_id.is_empty() {
        None
    } else {
        match state.clients.lookup(&client_id).await {
            Ok(Some(client)) => Some(client),
            Ok(None) => return text(StatusCode::FORBIDDEN, "invalid_client\n"),
            Err(err) => return internal(&err),
        }
    };

    if !redirect_uri.is_empty() {
        let Some(client) = &client else {
            return text(
                StatusCode::BAD_REQUEST,
                "client_id is required with post_logout_redirect_uri\n",
            );
        };
        match client.matches_redirect_uri(redirect_uri) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    client_id = %client_id,
                    redirect_uri = %redirect_uri,
                    "Logout redirect does not match client pattern"
                );
                return text(StatusCode::BAD_REQUEST, "redirect_uri_mismatch\n");
            }
            Err(err) => return internal(&err),
        }
    }

    let session_name = client
        .as_ref()
        .map(|client| client.session_name_or(&state.session_name))
        .unwrap_or(state.session_name.as_str());
    let jar = match state.identities.end_session(jar, session_name).await {
        Ok(jar) => jar,
        Err(err) => return internal(&err),
    };
    tracing::info!(session_name = %session_name, "Logged out");

    if redirect_uri.is_empty() {
        return (jar, text(StatusCode::OK, "logged out\n")).into_response();
    }

    let mut location = redirect_uri.to_string();
    let logout_state = param(&query.state);
    if !logout_state.is_empty() {
        let separator = if location.contains('?') { '&' } else { '?' };
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("state", logout_state)
            .finish();
        location = format!("{location}{separator}{encoded}");
    }
    match HeaderValue::from_str(&location) {
        Ok(location) => (jar, (StatusCode::FOUND, [(header::LOCATION, location)])).into_response(),
        Err(e) => internal(&AuthError::internal(format!("invalid logout location: {e}"))),
    }
}
