//! Client authentication for the token endpoint.
//!
//! Credentials are taken from the HTTP Basic `Authorization` header when
//! present, otherwise from the `client_id`/`client_secret` body parameters.
//!
//! A presented secret is always checked. A `client_credentials` grant always
//! requires one, and the client must have a secret configured.

use base64::{Engine, engine::general_purpose::STANDARD};

use super::token::GrantType;
use crate::storage::{Client, ClientStore};
use crate::{AuthError, AuthResult};

/// Client credentials as presented in a token request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: Option<String>,
    /// Whether the credentials came from the `Authorization` header.
    pub basic_auth: bool,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "***"))
            .field("basic_auth", &self.basic_auth)
            .finish()
    }
}

impl ClientCredentials {
    /// Picks Basic auth credentials if given, else the body parameters.
    pub fn resolve(
        authorization: Option<&str>,
        body_client_id: Option<&str>,
        body_client_secret: Option<&str>,
    ) -> Self {
        if let Some((client_id, client_secret)) = authorization.and_then(parse_basic_auth) {
            return Self {
                client_id: client_id.trim().to_string(),
                client_secret: Some(client_secret),
                basic_auth: true,
            };
        }
        Self {
            client_id: body_client_id.unwrap_or_default().trim().to_string(),
            client_secret: body_client_secret.map(str::to_string),
            basic_auth: false,
        }
    }

    fn presented_secret(&self) -> Option<&str> {
        self.client_secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// Authenticates the client of a token request.
///
/// # Errors
///
/// - `InvalidClient` (401) for unknown clients and failed secret checks
/// - `UnauthorizedClient` (400) for `client_credentials` without a configured secret
pub async fn authenticate_client(
    credentials: &ClientCredentials,
    grant_type: Option<GrantType>,
    clients: &dyn ClientStore,
) -> AuthResult<Client> {
    let client_id = credentials.client_id.to_lowercase();
    let client = clients
        .lookup(&client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client("client not found"))?;

    let client_credentials = grant_type == Some(GrantType::ClientCredentials);
    if client_credentials && !client.has_secret() {
        return Err(AuthError::unauthorized_client("client has no secret"));
    }

    let presented = credentials.presented_secret();
    if presented.is_none() && !client_credentials {
        return Ok(client);
    }

    match clients
        .authenticate(&client_id, presented.unwrap_or_default())
        .await
    {
        Ok(client) => Ok(client),
        Err(err) if err.is_client_error() => {
            tracing::warn!(
                client_id = %client_id,
                basic_auth = credentials.basic_auth,
                "Client authentication failed"
            );
            Err(AuthError::invalid_client("client authentication failed"))
        }
        Err(err) => Err(err),
    }
}

/// Parses an HTTP Basic `Authorization` header value.
///
/// Splits on the first colon; the secret may contain colons.
#[must_use]
pub fn parse_basic_auth(header_value: &str) -> Option<(String, String)> {
    let header_value = header_value.trim();
    let (scheme, encoded) = header_value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = credentials.split_once(':')?;
    Some((client_id.to_string(), client_secret.to_string()))
}
