//! Minimal login collaborator.
//!
//! The authorization endpoint sends users without a verified session here
//! with the original authorization query. A successful login (and TOTP
//! check, for users with a second factor) redirects back to `/authorize`
//! with that query, where the flow resumes.
//!
//! Responses are plain text; there is no templating.

use axum::Form;
use axum::extract::{Query, RawQuery, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use time::OffsetDateTime;

use super::{AuthState, no_cache_headers};
use crate::AuthError;

/// `client_id` of the authorization request being resumed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginQuery {
    pub client_id: Option<String>,
}

/// Login form fields.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub user_id: Option<String>,
    /// Accepted as an alias of `user_id`.
    pub username: Option<String>,
    pub password: Option<String>,
    /// TOTP code.
    pub code: Option<String>,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("code", &self.code.as_ref().map(|_| "***"))
            .finish()
    }
}

impl LoginForm {
    fn user_id(&self) -> &str {
        [&self.user_id, &self.username]
            .into_iter()
            .filter_map(|value| value.as_deref().map(str::trim))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }
}

fn text(status: StatusCode, body: impl Into<String>) -> Response {
    let mut response = (
        status,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            ),
            (
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ),
        ],
        body.into(),
    )
        .into_response();
    response.headers_mut().extend(no_cache_headers());
    response
}

fn internal(err: &AuthError) -> Response {
    tracing::error!(error = %err, "Login failed");
    text(StatusCode::INTERNAL_SERVER_ERROR, "internal server error\n")
}

fn resume_authorization(state: &AuthState, jar: CookieJar, raw_query: &str) -> Response {
    let location = format!(
        "{}/authorize?{raw_query}",
        state.tokens.issuer().trim_end_matches('/')
    );
    match HeaderValue::from_str(&location) {
        Ok(location) => (jar, (StatusCode::FOUND, [(header::LOCATION, location)])).into_response(),
        Err(e) => internal(&AuthError::internal(format!("invalid resume location: {e}"))),
    }
}

/// Resolves the session name of the requesting client.
async fn session_name(state: &AuthState, query: &LoginQuery) -> Result<String, Response> {
    let client_id = query
        .client_id
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_lowercase();
    if client_id.is_empty() {
        return Err(text(
            StatusCode::BAD_REQUEST,
            "client_id parameter is required\n",
        ));
    }
    match state.clients.lookup(&client_id).await {
        Ok(Some(client)) => Ok(client.session_name_or(&state.session_name).to_string()),
        Ok(None) => Err(text(StatusCode::FORBIDDEN, "invalid_client\n")),
        Err(err) => Err(internal(&err)),
    }
}

/// `GET /login`: describes what the form expects.
pub async fn login_page_handler(
    State(state): State<AuthState>,
    Query(query): Query<LoginQuery>,
    jar: CookieJar,
) -> Response {
    let session_name = match session_name(&state, &query).await {
        Ok(name) => name,
        Err(response) => return response,
    };
    let session = match state.identities.is_session_active(&jar, &session_name).await {
        Ok(session) => session,
        Err(err) => return internal(&err),
    };

    let body = if session.is_authenticated() {
        format!("current active session for {}\n", session.subject)
    } else if session.active {
        "POST code to complete the login\n".to_string()
    } else {
        "POST user_id and password to log in\n".to_string()
    };
    text(StatusCode::OK, body)
}

/// `POST /login`: password step, then TOTP step when the user has a key.
pub async fn login_submit_handler(
    State(state): State<AuthState>,
    Query(query): Query<LoginQuery>,
    RawQuery(raw_query): RawQuery,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let raw_query = raw_query.unwrap_or_default();
    let session_name = match session_name(&state, &query).await {
        Ok(name) => name,
        Err(response) => return response,
    };
    let session = match state.identities.is_session_active(&jar, &session_name).await {
        Ok(session) => session,
        Err(err) => return internal(&err),
    };

    if !session.active {
        let user_id = form.user_id();
        let password = form.password.as_deref().unwrap_or_default();
        if user_id.is_empty() || password.is_empty() {
            return text(
                StatusCode::BAD_REQUEST,
                "username and password must not be empty\n",
            );
        }

        let subject = match state.identities.authenticate(user_id, password).await {
            Ok(Some(subject)) => subject,
            Ok(None) => {
                return text(
                    StatusCode::UNAUTHORIZED,
                    "invalid username and password combination\n",
                );
            }
            Err(err) => return internal(&err),
        };
        let two_factor_required = match state.otp_keys.lookup(&subject).await {
            Ok(key) => key.is_some(),
            Err(err) => return internal(&err),
        };

        let jar = match state
            .identities
            .save_session(
                jar,
                OffsetDateTime::now_utc(),
                &subject,
                &session_name,
                two_factor_required,
            )
            .await
        {
            Ok(jar) => jar,
            Err(err) => return internal(&err),
        };
        tracing::info!(
            user_id = %subject,
            session_name = %session_name,
            two_factor_required,
            "User logged in"
        );

        if two_factor_required {
            return (jar, text(StatusCode::OK, "POST code to complete the login\n")).into_response();
        }
        return resume_authorization(&state, jar, &raw_query);
    }

    if session.verified {
        return resume_authorization(&state, jar, &raw_query);
    }

    let code = form.code.as_deref().map(str::trim).unwrap_or_default();
    if code.is_empty() {
        return text(StatusCode::BAD_REQUEST, "code must not be empty\n");
    }
    let key = match state.otp_keys.lookup(&session.subject).await {
        Ok(Some(key)) => key,
        Ok(None) => {
            return internal(&AuthError::internal(format!(
                "no OTP key for {}",
                session.subject
            )));
        }
        Err(err) => return internal(&err),
    };
    if !key.verify(code) {
        tracing::info!(user_id = %session.subject, "TOTP code rejected");
        return text(StatusCode::UNAUTHORIZED, "code is invalid\n");
    }

    match state.identities.verify_session(jar, &session_name).await {
        Ok(jar) => {
            tracing::info!(user_id = %session.subject, "Second factor verified");
            resume_authorization(&state, jar, &raw_query)
        }
        Err(err) => internal(&err),
    }
}
