//! Identity provider configuration.
//!
//! All durations are written in humantime notation (`"15m"`, `"8h"`).
//!
//! # Example (TOML)
//!
//! ```toml
//! issuer = "https://login.example.com"
//! key = "@signing.pem"
//! additional_keys = ["https://partner.example.com/jwks"]
//! access_token_ttl = "1h"
//! refresh_token_rotation = true
//!
//! [roles.admin]
//! by_user_id = ["alice"]
//!
//! [clients.webapp]
//! redirect_uri_pattern = "^https://app\\.example\\.com/"
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::embedded::AuthenticPerson;
use crate::roles::RoleMappings;
use crate::storage::Client;
use crate::token::ClaimTemplate;

/// Scope offered when nothing else is configured.
pub const DEFAULT_SCOPE: &str = "openid profile email phone address offline_access";

/// Root configuration of the identity provider.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Issuer URL placed in the `iss` claim and used to build the login redirect.
    pub issuer: String,

    /// Server-configured scope. Granted scopes are always a subset of it.
    pub scope: String,

    /// Additional scope tokens appended to [`scope`](Self::scope).
    pub extra_scope: String,

    /// Signing key: an inline RSA private key PEM or `@path` relative to
    /// [`base_dir`](Self::base_dir).
    pub key: String,

    /// Sign with RSASSA-PSS (PS256) instead of PKCS#1 v1.5 (RS256).
    pub use_pss: bool,

    /// Extra verification keys: inline PEM, `@file`, `.json` JWKS file or JWKS URL.
    pub additional_keys: Vec<String>,

    /// How long a resolved key set is served from cache.
    #[serde(with = "humantime_serde")]
    pub keys_ttl: Duration,

    /// Per-request timeout for remote JWKS fetches.
    #[serde(with = "humantime_serde")]
    pub keys_fetch_timeout: Duration,

    /// Retries for a remote JWKS fetch after a transport error or 5xx response.
    pub keys_fetch_retries: u32,

    /// Access token lifetime, also returned as `expires_in`.
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,

    /// Refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token_ttl: Duration,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub auth_code_ttl: Duration,

    /// Issue a new refresh token on every `refresh_token` grant.
    pub refresh_token_rotation: bool,

    /// Reject an authorization code on its second use.
    pub single_use_codes: bool,

    /// Allowed clock skew when verifying tokens.
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,

    /// Default session cookie name. Clients may override it.
    pub session_name: String,

    /// How long an authenticated session stays active.
    #[serde(with = "humantime_serde")]
    pub session_ttl: Duration,

    /// Extra access token claims: claim name to template.
    pub access_token_extra_claims: HashMap<String, ClaimTemplate>,

    /// Extra ID token and userinfo claims: claim name to template.
    pub id_token_extra_claims: HashMap<String, ClaimTemplate>,

    /// Role mapping rules.
    pub roles: RoleMappings,

    /// Clients served by the embedded client store, keyed by client id.
    pub clients: HashMap<String, Client>,

    /// Users served by the embedded identity store, keyed by user id.
    pub users: HashMap<String, AuthenticPerson>,

    /// Directory that relative key paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:6080".to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            extra_scope: String::new(),
            key: String::new(),
            use_pss: false,
            additional_keys: Vec::new(),
            keys_ttl: Duration::from_secs(900),
            keys_fetch_timeout: Duration::from_secs(10),
            keys_fetch_retries: 2,
            access_token_ttl: Duration::from_secs(3_600),
            refresh_token_ttl: Duration::from_secs(28_800),
            id_token_ttl: Duration::from_secs(28_800),
            auth_code_ttl: Duration::from_secs(300),
            refresh_token_rotation: false,
            single_use_codes: false,
            leeway: Duration::ZERO,
            session_name: "_auth".to_string(),
            session_ttl: Duration::from_secs(28_800),
            access_token_extra_claims: HashMap::new(),
            id_token_extra_claims: HashMap::new(),
            roles: RoleMappings::default(),
            clients: HashMap::new(),
            users: HashMap::new(),
            base_dir: PathBuf::from("."),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}

impl AuthConfig {
    /// The effective server scope: [`scope`](Self::scope) followed by
    /// [`extra_scope`](Self::extra_scope).
    #[must_use]
    pub fn server_scope(&self) -> String {
        self.scope
            .split_whitespace()
            .chain(self.extra_scope.split_whitespace())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer cannot be empty".to_string(),
            ));
        }

        if self.key.trim().is_empty() {
            return Err(ConfigError::Missing("key".to_string()));
        }

        let lifetimes = [
            ("access_token_ttl", self.access_token_ttl),
            ("refresh_token_ttl", self.refresh_token_ttl),
            ("id_token_ttl", self.id_token_ttl),
            ("auth_code_ttl", self.auth_code_ttl),
            ("session_ttl", self.session_ttl),
        ];
        for (name, value) in lifetimes {
            if value.is_zero() {
                return Err(ConfigError::InvalidValue(format!("{name} must be > 0")));
            }
        }

        if self.session_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "session_name cannot be empty".to_string(),
            ));
        }

        self.roles.validate().map_err(ConfigError::InvalidValue)?;

        for (client_id, client) in &self.clients {
            if let Some(pattern) = &client.redirect_uri_pattern {
                regex::Regex::new(pattern).map_err(|e| {
                    ConfigError::InvalidValue(format!(
                        "client '{client_id}' has an invalid redirect_uri_pattern: {e}"
                    ))
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> AuthConfig {
        AuthConfig {
            key: "@signing.pem".to_string(),
            ..AuthConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.access_token_ttl, Duration::from_secs(3600));
        assert_eq!(config.refresh_token_ttl, Duration::from_secs(28_800));
        assert_eq!(config.id_token_ttl, Duration::from_secs(28_800));
        assert_eq!(config.keys_ttl, Duration::from_secs(900));
        assert_eq!(config.session_name, "_auth");
        assert_eq!(config.leeway, Duration::ZERO);
        assert!(!config.refresh_token_rotation);
    }

    #[test]
    fn test_missing_key_fails_validation() {
        let err = AuthConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(_)));
        assert!(err.to_string().contains("key"));
    }

    #[test]
    fn test_config_with_key_validates() {
        assert!(config_with_key().validate().is_ok());
    }

    #[test]
    fn test_empty_issuer_fails_validation() {
        let mut config = config_with_key();
        config.issuer = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("issuer"));
    }

    #[test]
    fn test_zero_lifetime_fails_validation() {
        let mut config = config_with_key();
        config.access_token_ttl = Duration::ZERO;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(_)));
        assert!(err.to_string().contains("access_token_ttl"));
    }

    #[test]
    fn test_invalid_redirect_pattern_fails_validation() {
        let mut config = config_with_key();
        config.clients.insert(
            "app".to_string(),
            Client {
                redirect_uri_pattern: Some("^https://(".to_string()),
                ..Client::default()
            },
        );
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("redirect_uri_pattern"));
    }

    #[test]
    fn test_server_scope_appends_extra_scope() {
        let config = AuthConfig {
            scope: "openid profile".to_string(),
            extra_scope: " groups  ".to_string(),
            ..AuthConfig::default()
        };
        assert_eq!(config.server_scope(), "openid profile groups");
    }

    #[test]
    fn test_deserialize_from_json_with_humantime() {
        let json = r#"{
            "issuer": "https://login.example.com",
            "key": "@key.pem",
            "access_token_ttl": "15m",
            "keys_ttl": "1h",
            "refresh_token_rotation": true,
            "roles": { "admin": { "by_user_id": ["alice"] } },
            "clients": { "webapp": { "secret": "s3cret", "disable_implicit": true } }
        }"#;
        let config: AuthConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.access_token_ttl, Duration::from_secs(900));
        assert_eq!(config.keys_ttl, Duration::from_secs(3600));
        assert!(config.refresh_token_rotation);
        assert_eq!(config.session_name, "_auth");
        assert!(config.clients["webapp"].disable_implicit);
        assert!(config.validate().is_ok());
    }
}
