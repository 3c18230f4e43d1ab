use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "authd-server")]
#[command(about = "OpenID Connect identity provider")]
#[command(version)]
pub struct Cli {
    /// Configuration file (falls back to AUTHD_CONFIG, then authd.toml)
    #[arg(short, long, global = true, env = "AUTHD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the identity provider (default)
    Serve,
    /// Generate an RSA signing key
    Genkey(GenkeyArgs),
    /// Read a password from stdin and print its Argon2id hash
    HashPassword,
}

#[derive(Args, Debug)]
pub struct GenkeyArgs {
    /// Key size in bits
    #[arg(short, long, default_value_t = 2048)]
    pub size: usize,

    /// Key id written to the PEM `kid` header
    #[arg(short, long, default_value = "")]
    pub id: String,

    /// Output file (mode 0600); stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Where the configuration path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` or `AUTHD_CONFIG`
    Explicit,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explicit => write!(f, "--config / AUTHD_CONFIG"),
            Self::Default => write!(f, "default"),
        }
    }
}

pub const DEFAULT_CONFIG: &str = "authd.toml";

impl Cli {
    pub fn config_path(&self) -> (PathBuf, ConfigSource) {
        match &self.config {
            Some(path) if !path.as_os_str().is_empty() => (path.clone(), ConfigSource::Explicit),
            _ => (PathBuf::from(DEFAULT_CONFIG), ConfigSource::Default),
        }
    }
}
