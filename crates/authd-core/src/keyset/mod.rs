//! Key-set provider.
//!
//! Resolves the configured key references (inline PEM, `@file`, `.json`
//! JWKS file, JWKS URL) into a `kid -> public key` map and serves it from a
//! cache for a fixed TTL.
//!
//! # Caching
//!
//! A cached map is returned unconditionally while it is younger than the TTL.
//! After that the whole map is rebuilt under the write lock and swapped in as
//! a new `Arc`, so readers always see either the old or the new map. Callers
//! that queued on the write lock re-check freshness and reuse the map built by
//! the caller ahead of them.
//!
//! Any failing source aborts the refresh; the previous map stays cached but
//! is not returned, the error is.

mod source;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use crate::config::AuthConfig;
use crate::keys::{Jwks, KeyError, PublicKey};

pub use source::{KeySource, RetryPolicy};

/// Errors that abort a key-set refresh.
#[derive(Debug, thiserror::Error)]
pub enum KeySetError {
    /// A key could not be parsed, or its type is unsupported.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// A key file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// The file that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A remote JWKS endpoint answered with a status other than 200.
    #[error("JWKS endpoint returned HTTP {0}")]
    HttpStatus(u16),

    /// A remote JWKS endpoint could not be reached.
    #[error("JWKS transport error: {0}")]
    Transport(String),

    /// A JWKS document could not be parsed.
    #[error("failed to parse JWKS: {0}")]
    Parse(String),

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl KeySetError {
    /// Transport failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::HttpStatus(status) => *status >= 500,
            _ => false,
        }
    }
}

/// An entry of a resolved key set.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyEntry {
    /// Key id as configured.
    pub kid: String,
    /// The verification key.
    pub key: PublicKey,
}

/// A resolved `kid -> public key` map. Key ids match case-insensitively.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeySet {
    entries: BTreeMap<String, KeyEntry>,
}

impl KeySet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a key, replacing an earlier key with the same id.
    pub fn insert(&mut self, kid: impl Into<String>, key: PublicKey) {
        let kid = kid.into();
        self.entries
            .insert(kid.to_lowercase(), KeyEntry { kid, key });
    }

    /// Looks up a key by id.
    pub fn get(&self, kid: &str) -> Option<&PublicKey> {
        self.entries.get(&kid.to_lowercase()).map(|entry| &entry.key)
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the set holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries ordered by lowercase key id.
    pub fn iter(&self) -> impl Iterator<Item = &KeyEntry> {
        self.entries.values()
    }

    /// The set as a JWKS document with `use=sig`, ordered by key id.
    pub fn to_jwks(&self) -> Result<Jwks, KeyError> {
        let keys = self
            .iter()
            .map(|entry| entry.key.to_jwk(&entry.kid, None))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Jwks { keys })
    }
}

/// Key-set provider settings.
#[derive(Debug, Clone)]
pub struct KeySetConfig {
    /// Directory that file references are resolved against.
    pub base_dir: PathBuf,
    /// How long a resolved set is served from cache.
    pub ttl: Duration,
    /// Per-request timeout for remote fetches.
    pub fetch_timeout: Duration,
    /// Retry policy for remote fetches.
    pub retry: RetryPolicy,
}

impl Default for KeySetConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            ttl: Duration::from_secs(900),
            fetch_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl KeySetConfig {
    /// Provider settings from the server configuration.
    pub fn from_auth_config(config: &AuthConfig) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            ttl: config.keys_ttl,
            fetch_timeout: config.keys_fetch_timeout,
            retry: RetryPolicy {
                max_retries: config.keys_fetch_retries,
                ..RetryPolicy::default()
            },
        }
    }

    /// Sets the cache TTL.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Sets the base directory for file references.
    #[must_use]
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

struct CachedKeySet {
    keys: Arc<KeySet>,
    fetched_at: Instant,
}

/// Resolves and caches the configured verification keys.
///
/// Owned by whoever needs key material and shared behind an `Arc`; there is
/// no process-wide instance.
pub struct KeySetProvider {
    sources: Vec<KeySource>,
    config: KeySetConfig,
    http_client: reqwest::Client,
    cache: RwLock<Option<CachedKeySet>>,
}

impl KeySetProvider {
    /// Creates a provider for the given references.
    pub fn new<S: AsRef<str>>(references: &[S], config: KeySetConfig) -> Result<Self, KeySetError> {
        let sources = references
            .iter()
            .enumerate()
            .map(|(index, reference)| KeySource::parse(reference.as_ref(), index))
            .collect::<Result<Vec<_>, _>>()?;

        let http_client = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()
            .map_err(|e| KeySetError::Client(e.to_string()))?;

        Ok(Self {
            sources,
            config,
            http_client,
            cache: RwLock::new(None),
        })
    }

    /// The configured sources.
    pub fn sources(&self) -> &[KeySource] {
        &self.sources
    }

    /// Returns the current key set, rebuilding it when the cache has expired.
    pub async fn get(&self) -> Result<Arc<KeySet>, KeySetError> {
        {
            let cache = self.cache.read().await;
            if let Some(keys) = self.fresh(cache.as_ref()) {
                tracing::trace!("Serving key set from cache");
                return Ok(keys);
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(keys) = self.fresh(cache.as_ref()) {
            return Ok(keys);
        }

        tracing::debug!(sources = self.sources.len(), "Resolving key set");
        let keys = Arc::new(self.resolve().await?);
        tracing::info!(keys = keys.len(), "Key set refreshed");
        *cache = Some(CachedKeySet {
            keys: Arc::clone(&keys),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    fn fresh(&self, cached: Option<&CachedKeySet>) -> Option<Arc<KeySet>> {
        cached
            .filter(|cached| cached.fetched_at.elapsed() < self.config.ttl)
            .map(|cached| Arc::clone(&cached.keys))
    }

    async fn resolve(&self) -> Result<KeySet, KeySetError> {
        let mut keys = KeySet::new();
        for source in &self.sources {
            match source {
                KeySource::Inline { pem, position } => {
                    source::merge_pem(&mut keys, pem, &format!("key{position}"))?;
                }
                KeySource::File(path) => {
                    source::merge_file(&mut keys, &self.config.base_dir, path).await?;
                }
                KeySource::Remote(url) => {
                    let body =
                        source::fetch_jwks(&self.http_client, url, self.config.retry).await?;
                    let count = source::merge_jwks(&mut keys, &body)?;
                    tracing::debug!(url = %url, keys = count, "Merged remote JWKS");
                }
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SigningKey;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            initial_backoff: Duration::from_millis(1),
        }
    }

    fn private_pem_without_kid() -> (SigningKey, String) {
        let key = SigningKey::generate(2048, "", false).unwrap();
        let pem = key.to_pem().unwrap();
        (key, pem)
    }

    #[tokio::test]
    async fn test_inline_key_without_kid_is_named_by_position() {
        let (key, pem) = private_pem_without_kid();
        let provider = KeySetProvider::new(&[pem], KeySetConfig::default()).unwrap();

        let keys = provider.get().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.get("key1"), Some(key.public_key()));
    }

    #[tokio::test]
    async fn test_cached_set_is_reused_within_ttl() {
        let (_, pem) = private_pem_without_kid();
        let provider = KeySetProvider::new(&[pem], KeySetConfig::default()).unwrap();

        let first = provider.get().await.unwrap();
        let second = provider.get().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_expired_set_is_rebuilt() {
        let (_, pem) = private_pem_without_kid();
        let config = KeySetConfig::default().with_ttl(Duration::ZERO);
        let provider = KeySetProvider::new(&[pem], config).unwrap();

        let first = provider.get().await.unwrap();
        let second = provider.get().await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(*first, *second);
    }

    #[tokio::test]
    async fn test_signing_public_key_keeps_its_kid() {
        let key = SigningKey::generate(2048, "sigkey", false).unwrap();
        let provider =
            KeySetProvider::new(&[key.public_key_pem().unwrap()], KeySetConfig::default())
                .unwrap();

        let keys = provider.get().await.unwrap();
        assert_eq!(keys.get("SIGKEY"), Some(key.public_key()));
    }

    #[tokio::test]
    async fn test_file_sources() {
        let dir = tempfile::tempdir().unwrap();
        let pem_key = SigningKey::generate(2048, "", false).unwrap();
        std::fs::write(dir.path().join("partner.pem"), pem_key.to_pem().unwrap()).unwrap();

        let jwks_key = SigningKey::generate(2048, "from-jwks", false).unwrap();
        let jwks = Jwks {
            keys: vec![jwks_key.to_jwk().unwrap()],
        };
        std::fs::write(
            dir.path().join("federation.JSON"),
            serde_json::to_vec(&jwks).unwrap(),
        )
        .unwrap();

        let config = KeySetConfig::default().with_base_dir(dir.path());
        let provider = KeySetProvider::new(&["@partner.pem", "federation.JSON"], config).unwrap();

        let keys = provider.get().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.get("partner"), Some(pem_key.public_key()));
        assert_eq!(keys.get("from-jwks"), Some(jwks_key.public_key()));
    }

    #[tokio::test]
    async fn test_unsupported_pem_type_fails_refresh() {
        let pem = "-----BEGIN CERTIFICATE-----\nMAA=\n-----END CERTIFICATE-----";
        let provider = KeySetProvider::new(&[pem], KeySetConfig::default()).unwrap();

        let err = provider.get().await.unwrap_err();
        assert_eq!(err.to_string(), "unsupported key type: CERTIFICATE");
    }

    #[tokio::test]
    async fn test_missing_file_fails_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeySetConfig::default().with_base_dir(dir.path());
        let provider = KeySetProvider::new(&["@missing.pem"], config).unwrap();

        assert!(matches!(
            provider.get().await,
            Err(KeySetError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_remote_jwks_is_merged() {
        let server = MockServer::start().await;
        let remote = SigningKey::generate(2048, "remote-1", false).unwrap();
        let jwks = Jwks {
            keys: vec![remote.to_jwk().unwrap()],
        };
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&jwks))
            .expect(1)
            .mount(&server)
            .await;

        let (local, pem) = private_pem_without_kid();
        let url = format!("{}/jwks", server.uri());
        let provider = KeySetProvider::new(&[pem, url], KeySetConfig::default()).unwrap();

        let keys = provider.get().await.unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.get("key1"), Some(local.public_key()));
        assert_eq!(keys.get("remote-1"), Some(remote.public_key()));

        // served from cache, the mock expects a single request
        provider.get().await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let config = KeySetConfig::default().with_retry(RetryPolicy {
            max_retries: 3,
            initial_backoff: Duration::from_millis(1),
        });
        let provider = KeySetProvider::new(&[server.uri()], config).unwrap();

        assert!(matches!(
            provider.get().await,
            Err(KeySetError::HttpStatus(404))
        ));
    }

    #[tokio::test]
    async fn test_remote_server_error_is_retried_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let config = KeySetConfig::default().with_retry(RetryPolicy {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
        });
        let provider = KeySetProvider::new(&[server.uri()], config).unwrap();

        let err = provider.get().await.unwrap_err();
        assert!(matches!(err, KeySetError::HttpStatus(503)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_remote_failure_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let config = KeySetConfig::default().with_retry(no_retry());
        let provider = KeySetProvider::new(&[server.uri()], config).unwrap();
        assert!(provider.get().await.is_err());
    }

    #[test]
    fn test_to_jwks_is_sorted_by_kid() {
        let mut set = KeySet::new();
        let b = SigningKey::generate(2048, "b", false).unwrap();
        let a = SigningKey::generate(2048, "a", false).unwrap();
        set.insert("b", b.public_key().clone());
        set.insert("a", a.public_key().clone());

        let jwks = set.to_jwks().unwrap();
        let kids: Vec<_> = jwks.keys.iter().map(|k| k.kid.as_str()).collect();
        assert_eq!(kids, vec!["a", "b"]);
        assert!(jwks.keys.iter().all(|k| k.use_.as_deref() == Some("sig")));
    }
}
