//! Authorization endpoint handler.
//!
//! ```text
//! GET /authorize?response_type=code&client_id=...&redirect_uri=...
//!     ├─► invalid request → JSON error (no redirect to an unverified URI)
//!     ├─► no verified session → 302 /login?<original query>
//!     └─► session → 302 redirect_uri?code=...  or  redirect_uri#access_token=...
//! ```

use axum::extract::{Query, RawQuery, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;

use super::{AuthState, error_response, no_cache_headers};
use crate::AuthError;
use crate::oauth::AuthorizeRequest;

/// `GET /authorize`.
pub async fn authorize_handler(
    State(state): State<AuthState>,
    Query(request): Query<AuthorizeRequest>,
    RawQuery(raw_query): RawQuery,
    jar: CookieJar,
) -> Response {
    let raw_query = raw_query.unwrap_or_default();
    match state
        .authorization
        .authorize(&request, &raw_query, &jar)
        .await
    {
        Ok(outcome) => match HeaderValue::from_str(outcome.location()) {
            Ok(location) => {
                let mut response = (StatusCode::FOUND, [(header::LOCATION, location)]).into_response();
                response.headers_mut().extend(no_cache_headers());
                response
            }
            Err(e) => {
                let err = AuthError::invalid_request(format!("invalid redirect location: {e}"));
                error_response(&err, err.status_code(), &no_cache_headers())
            }
        },
        Err(err) => {
            let status = match err {
                AuthError::UnauthorizedClient { .. } => StatusCode::FORBIDDEN,
                _ => err.status_code(),
            };
            error_response(&err, status, &no_cache_headers())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ErrorResponse, browser_router, testing};
    use crate::storage::IdentityStore;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use time::OffsetDateTime;
    use tower::ServiceExt;

    async fn get(state: AuthState, uri: &str, cookie: Option<String>) -> Response {
        let mut request = Request::get(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        browser_router(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn error_body(response: Response) -> ErrorResponse {
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn session_cookie(state: &AuthState) -> String {
        let jar = state
            .identities
            .save_session(CookieJar::new(), OffsetDateTime::now_utc(), "alice", "_auth", false)
            .await
            .unwrap();
        let cookie = jar.get("_auth").unwrap();
        format!("{}={}", cookie.name(), cookie.value())
    }

    #[tokio::test]
    async fn test_unknown_client_is_forbidden() {
        let response = get(
            testing::state(),
            "/authorize?response_type=code&client_id=nobody&redirect_uri=https://x/",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(error_body(response).await.error, "unauthorized_client");
    }

    #[tokio::test]
    async fn test_redirect_mismatch() {
        let response = get(
            testing::state(),
            "/authorize?response_type=code&client_id=webapp&redirect_uri=https://evil.example.com/",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_body(response).await.error, "redirect_uri_mismatch");
    }

    #[tokio::test]
    async fn test_login_redirect_preserves_query() {
        let query = "response_type=code&client_id=webapp&redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb&state=s1";
        let response = get(testing::state(), &format!("/authorize?{query}"), None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            format!("{}/login?{query}", testing::ISSUER).as_str()
        );
        assert_eq!(response.headers()[header::PRAGMA], "no-cache");
    }

    #[tokio::test]
    async fn test_code_redirect_with_session() {
        let state = testing::state();
        let cookie = session_cookie(&state).await;
        let response = get(
            state.clone(),
            "/authorize?response_type=code&client_id=webapp&redirect_uri=https%3A%2F%2Fapp.example.com%2Fcb&state=s1&scope=openid",
            Some(cookie),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FOUND);

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let url = url::Url::parse(location).unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["state"], "s1");
        let grant = state.tokens.verify_auth_code(&params["code"]).unwrap();
        assert_eq!(grant.subject, "alice");
        assert_eq!(grant.scope, "openid");
    }
}
