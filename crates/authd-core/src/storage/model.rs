//! Value objects exchanged with the collaborator stores.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{AuthError, AuthResult};

/// Profile attributes of a person, used for claim shaping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Person {
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub department: String,
    /// ISO 8601 date (`YYYY-MM-DD`).
    pub birthdate: String,
    pub phone_number: String,
    pub street_address: String,
    pub locality: String,
    pub postal_code: String,
    /// Group names or group DNs.
    pub groups: Vec<String>,
}

impl Person {
    /// Full name built from given and family name.
    pub fn name(&self) -> String {
        [self.given_name.trim(), self.family_name.trim()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A person together with the user id it was looked up by.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub user_id: String,
    pub person: Person,
}

impl User {
    pub fn new(user_id: impl Into<String>, person: Person) -> Self {
        Self {
            user_id: user_id.into(),
            person,
        }
    }
}

/// State of the session cookie for one session name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStatus {
    /// Authenticated subject; empty when the session is not active.
    pub subject: String,
    /// The session exists and has not expired.
    pub active: bool,
    /// Two-factor authentication is not required or has been completed.
    pub verified: bool,
}

impl SessionStatus {
    /// No usable session.
    pub fn inactive() -> Self {
        Self::default()
    }

    /// Active and verified: the authorization flow may proceed.
    pub fn is_authenticated(&self) -> bool {
        self.active && self.verified && !self.subject.is_empty()
    }
}

/// An OAuth client registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Client {
    /// Lowercase client id. Filled in by the store from its key when omitted.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub client_id: String,

    /// Plain-text secret or an adaptive hash (`$2...` bcrypt, `$argon2...`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Regular expression the `redirect_uri` must match (unanchored).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri_pattern: Option<String>,

    /// Reject `response_type=token`.
    pub disable_implicit: bool,

    /// Never rotate refresh tokens for this client.
    pub disable_refresh_rotation: bool,

    /// Session cookie name overriding the server default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,
}

impl Client {
    /// Whether a non-empty secret is configured.
    pub fn has_secret(&self) -> bool {
        self.secret.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// The client's session name, or `default` when it has none.
    pub fn session_name_or<'a>(&'a self, default: &'a str) -> &'a str {
        match self.session_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => default,
        }
    }

    /// Whether `redirect_uri` is acceptable. Clients without a pattern accept any URI.
    pub fn matches_redirect_uri(&self, redirect_uri: &str) -> AuthResult<bool> {
        let Some(pattern) = self.redirect_uri_pattern.as_deref() else {
            return Ok(true);
        };
        let regex = Regex::new(pattern).map_err(|e| {
            AuthError::configuration(format!(
                "client '{}' has an invalid redirect_uri_pattern: {e}",
                self.client_id
            ))
        })?;
        Ok(regex.is_match(redirect_uri))
    }
}
