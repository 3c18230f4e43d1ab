use std::collections::HashMap;

use async_trait::async_trait;

use crate::AuthResult;
use crate::storage::{Client, ClientStore};

/// Client registrations from configuration, keyed by lowercase client id.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedClientStore {
    clients: HashMap<String, Client>,
}

impl EmbeddedClientStore {
    /// Normalizes ids to lowercase and fills in `client_id` from the key.
    pub fn new(clients: HashMap<String, Client>) -> Self {
        let clients = clients
            .into_iter()
            .map(|(id, mut client)| {
                let id = id.to_lowercase();
                client.client_id = id.clone();
                (id, client)
            })
            .collect();
        Self { clients }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ClientStore for EmbeddedClientStore {
    async fn lookup(&self, client_id: &str) -> AuthResult<Option<Client>> {
        Ok(self.clients.get(&client_id.to_lowercase()).cloned())
    }

    async fn per_session_name_map(
        &self,
        default_session_name: &str,
    ) -> AuthResult<HashMap<String, Vec<String>>> {
        let mut map: HashMap<String, Vec<String>> = HashMap::new();
        for (id, client) in &self.clients {
            map.entry(client.session_name_or(default_session_name).to_string())
                .or_default()
                .push(id.clone());
        }
        for ids in map.values_mut() {
            ids.sort();
        }
        Ok(map)
    }

    async fn clients_matching_redirect_uri(&self, redirect_uri: &str) -> AuthResult<Vec<String>> {
        let mut matching = Vec::new();
        for (id, client) in &self.clients {
            if client.redirect_uri_pattern.is_some() && client.matches_redirect_uri(redirect_uri)? {
                matching.push(id.clone());
            }
        }
        matching.sort();
        Ok(matching)
    }
}
