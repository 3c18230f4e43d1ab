//! OpenID Connect discovery handler.
//!
//! Serves `/.well-known/openid-configuration` with endpoint URLs derived from
//! the configured issuer.

use axum::Json;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::AuthState;

/// OpenID Provider metadata (OpenID Connect Discovery 1.0, section 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub end_session_endpoint: String,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl DiscoveryDocument {
    /// Builds the document for `issuer`, the server scope and the signing
    /// algorithm name.
    pub fn build(issuer: &str, scope: &str, algorithm: &str) -> Self {
        let base = issuer.trim_end_matches('/');
        Self {
            issuer: issuer.to_string(),
            authorization_endpoint: format!("{base}/authorize"),
            token_endpoint: format!("{base}/token"),
            userinfo_endpoint: format!("{base}/userinfo"),
            jwks_uri: format!("{base}/jwks"),
            end_session_endpoint: format!("{base}/logout"),
            scopes_supported: scope.split_whitespace().map(str::to_string).collect(),
            response_types_supported: strings(&["code", "token"]),
            grant_types_supported: strings(&[
                "authorization_code",
                "implicit",
                "refresh_token",
                "password",
                "client_credentials",
            ]),
            subject_types_supported: strings(&["public"]),
            id_token_signing_alg_values_supported: vec![algorithm.to_string()],
            token_endpoint_auth_methods_supported: strings(&[
                "client_secret_basic",
                "client_secret_post",
                "none",
            ]),
            code_challenge_methods_supported: strings(&["S256"]),
        }
    }
}

/// `GET /.well-known/openid-configuration`.
pub async fn openid_configuration_handler(State(state): State<AuthState>) -> Response {
    let algorithm = format!("{:?}", state.tokens.signing_key().algorithm());
    Json(DiscoveryDocument::build(
        state.tokens.issuer(),
        &state.scope,
        &algorithm,
    ))
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{api_router, testing};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_endpoints_follow_issuer() {
        let doc = DiscoveryDocument::build("https://login.example.com/", "openid email", "PS256");
        assert_eq!(doc.issuer, "https://login.example.com/");
        assert_eq!(doc.authorization_endpoint, "https://login.example.com/authorize");
        assert_eq!(doc.jwks_uri, "https://login.example.com/jwks");
        assert_eq!(doc.end_session_endpoint, "https://login.example.com/logout");
        assert_eq!(doc.scopes_supported, vec!["openid", "email"]);
        assert_eq!(doc.id_token_signing_alg_values_supported, vec!["PS256"]);
    }

    #[tokio::test]
    async fn test_discovery_document() {
        let response = api_router(testing::state())
            .oneshot(
                Request::get("/.well-known/openid-configuration")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let doc: DiscoveryDocument = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc.issuer, testing::ISSUER);
        assert_eq!(doc.token_endpoint, format!("{}/token", testing::ISSUER));
        assert_eq!(doc.userinfo_endpoint, format!("{}/userinfo", testing::ISSUER));
        assert!(doc.scopes_supported.contains(&"offline_access".to_string()));
        assert_eq!(doc.response_types_supported, vec!["code", "token"]);
        assert!(doc.grant_types_supported.contains(&"client_credentials".to_string()));
        assert_eq!(doc.id_token_signing_alg_values_supported, vec!["RS256"]);
    }
}
