use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use authd_core::AuthConfig;
use serde::Deserialize;

/// Environment variable prefix for overrides, e.g. `AUTHD__SERVER__PORT=7000`.
pub const ENV_PREFIX: &str = "AUTHD";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl AppConfig {
    pub fn addr(&self) -> SocketAddr {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::from((host, self.server.port))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        self.auth
            .validate()
            .map_err(|e| format!("auth: {e}"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    6080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

pub mod loader {
    use super::*;
    use config::{Config, Environment, File};

    /// Loads the optional TOML file at `path`, then applies `AUTHD__*`
    /// environment overrides, then validates.
    ///
    /// Relative key paths are resolved against the directory of the file.
    pub fn load_config(path: &Path) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        if path.exists() {
            builder = builder.add_source(File::from(path.to_path_buf()));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let mut merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.auth.base_dir = base_dir(path);
        merged.validate()?;
        Ok(merged)
    }

    fn base_dir(path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::loader::load_config;
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.addr().port(), 6080);
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.auth.session_name, "_auth");
    }

    #[test]
    fn test_load_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authd.toml");
        std::fs::write(
            &path,
            r#"
[server]
host = "127.0.0.1"
port = 7000

[logging]
level = "debug"

[auth]
issuer = "https://login.example.com"
key = "@signing.pem"
access_token_ttl = "15m"

[auth.clients.webapp]
secret = "s3cret"
redirect_uri_pattern = "^https://app\\.example\\.com/"

[auth.users.alice]
given_name = "Alice"
password_hash = "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA"
"#,
        )
        .unwrap();

        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.addr(), "127.0.0.1:7000".parse().unwrap());
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.auth.issuer, "https://login.example.com");
        assert_eq!(cfg.auth.access_token_ttl, Duration::from_secs(900));
        assert_eq!(cfg.auth.base_dir, dir.path());
        assert!(cfg.auth.clients.contains_key("webapp"));
        assert_eq!(cfg.auth.users["alice"].person.given_name, "Alice");
    }

    #[test]
    fn test_missing_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("authd.toml");
        std::fs::write(&path, "[auth]\nissuer = \"https://login.example.com\"\n").unwrap();

        let err = load_config(&path).unwrap_err();
        assert!(err.contains("key"));
    }
}
