//! Client store trait.

use std::collections::HashMap;

use async_trait::async_trait;

use super::Client;
use crate::secret::verify_client_secret;
use crate::{AuthError, AuthResult};

/// Lookup and authentication of OAuth clients.
///
/// Client ids are compared case-insensitively; implementations normalize to
/// lowercase.
#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Find a client by id. Returns `None` if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn lookup(&self, client_id: &str) -> AuthResult<Option<Client>>;

    /// Authenticate a client by id and secret.
    ///
    /// Hashed secrets are verified with their hash function, plain-text
    /// secrets are compared in constant time.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClient` for unknown clients, clients without a secret
    /// and wrong secrets.
    async fn authenticate(&self, client_id: &str, secret: &str) -> AuthResult<Client> {
        let client = self
            .lookup(client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_client("client not found"))?;
        let Some(stored) = client.secret.as_deref().filter(|s| !s.is_empty()) else {
            return Err(AuthError::invalid_client("client has no secret"));
        };
        if verify_client_secret(secret, stored) {
            Ok(client)
        } else {
            Err(AuthError::invalid_client("client authentication failed"))
        }
    }

    /// Client ids grouped by effective session name.
    ///
    /// Clients without a session name are grouped under `default_session_name`.
    async fn per_session_name_map(
        &self,
        default_session_name: &str,
    ) -> AuthResult<HashMap<String, Vec<String>>>;

    /// Ids of the clients whose redirect URI pattern matches `redirect_uri`.
    async fn clients_matching_redirect_uri(&self, redirect_uri: &str) -> AuthResult<Vec<String>>;
}
