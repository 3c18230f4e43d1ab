//! Key references and their resolution into key-set entries.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use super::{KeySet, KeySetError};
use crate::keys::{Jwks, PemBlock, PublicKey};

/// A configured key reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySource {
    /// Inline PEM block. `position` is the 1-based index in the reference list.
    Inline {
        /// The PEM text.
        pem: String,
        /// Position used to synthesize `key<N>` when the block has no `kid`.
        position: usize,
    },
    /// PEM or `.json` JWKS file relative to the provider's base directory.
    File(PathBuf),
    /// Remote JWKS document.
    Remote(Url),
}

impl KeySource {
    /// Classifies a reference string. `index` is zero-based.
    pub fn parse(reference: &str, index: usize) -> Result<Self, KeySetError> {
        let reference = reference.trim();
        if reference.starts_with("-----BEGIN ") {
            return Ok(Self::Inline {
                pem: reference.to_string(),
                position: index + 1,
            });
        }
        if reference.starts_with("http://") || reference.starts_with("https://") {
            let url = Url::parse(reference)
                .map_err(|e| KeySetError::Parse(format!("invalid JWKS URL {reference}: {e}")))?;
            return Ok(Self::Remote(url));
        }
        let path = reference.strip_prefix('@').unwrap_or(reference);
        Ok(Self::File(PathBuf::from(path)))
    }
}

/// Bounded retry policy for remote fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
        }
    }
}

/// Adds the keys of one PEM block, naming it `kid` header first, else `fallback_kid`.
pub(super) fn merge_pem(keys: &mut KeySet, pem: &str, fallback_kid: &str) -> Result<(), KeySetError> {
    let block = PemBlock::parse(pem)?;
    let kid = block.key_id().unwrap_or(fallback_kid).to_string();
    let key = PublicKey::from_pem_block(&block)?;
    keys.insert(kid, key);
    Ok(())
}

/// Adds every key of a JWKS document.
pub(super) fn merge_jwks(keys: &mut KeySet, document: &[u8]) -> Result<usize, KeySetError> {
    let jwks: Jwks =
        serde_json::from_slice(document).map_err(|e| KeySetError::Parse(e.to_string()))?;
    let count = jwks.keys.len();
    for jwk in &jwks.keys {
        let key = PublicKey::from_jwk(jwk)?;
        keys.insert(jwk.kid.clone(), key);
    }
    Ok(count)
}

/// Reads a key file below `base_dir` and merges its keys.
pub(super) async fn merge_file(
    keys: &mut KeySet,
    base_dir: &Path,
    relative: &Path,
) -> Result<(), KeySetError> {
    let path = base_dir.join(relative);
    let bytes = tokio::fs::read(&path).await.map_err(|source| KeySetError::Io {
        path: path.clone(),
        source,
    })?;

    let is_jwks = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_jwks {
        let count = merge_jwks(keys, &bytes)?;
        tracing::debug!(path = %path.display(), keys = count, "Loaded JWKS file");
        return Ok(());
    }

    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let pem = String::from_utf8_lossy(&bytes);
    merge_pem(keys, &pem, &stem)
}

/// Fetches a remote JWKS document, retrying transport errors and 5xx responses.
pub(super) async fn fetch_jwks(
    client: &reqwest::Client,
    url: &Url,
    retry: RetryPolicy,
) -> Result<Vec<u8>, KeySetError> {
    let mut attempt = 0;
    let mut backoff = retry.initial_backoff;
    loop {
        match fetch_once(client, url).await {
            Ok(body) => return Ok(body),
            Err(err) if err.is_retryable() && attempt < retry.max_retries => {
                attempt += 1;
                tracing::warn!(
                    url = %url,
                    attempt,
                    error = %err,
                    "JWKS fetch failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                backoff = backoff.saturating_mul(2);
            }
            Err(err) => return Err(err),
        }
    }
}

async fn fetch_once(client: &reqwest::Client, url: &Url) -> Result<Vec<u8>, KeySetError> {
    tracing::debug!(url = %url, "GET JWKS");
    let response = client
        .get(url.as_str())
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| KeySetError::Transport(e.to_string()))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        return Err(KeySetError::HttpStatus(status.as_u16()));
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| KeySetError::Transport(e.to_string()))?;
    Ok(body.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reference_kinds() {
        assert_eq!(
            KeySource::parse("  -----BEGIN PUBLIC KEY-----\nAA==\n-----END PUBLIC KEY-----", 2)
                .unwrap(),
            KeySource::Inline {
                pem: "-----BEGIN PUBLIC KEY-----\nAA==\n-----END PUBLIC KEY-----".to_string(),
                position: 3,
            }
        );
        assert_eq!(
            KeySource::parse("@keys/partner.pem", 0).unwrap(),
            KeySource::File(PathBuf::from("keys/partner.pem"))
        );
        assert_eq!(
            KeySource::parse("keys/jwks.json", 0).unwrap(),
            KeySource::File(PathBuf::from("keys/jwks.json"))
        );
        assert!(matches!(
            KeySource::parse("https://idp.example.com/jwks", 0).unwrap(),
            KeySource::Remote(url) if url.host_str() == Some("idp.example.com")
        ));
    }

    #[test]
    fn test_retry_policy_default_is_bounded() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 2);
        assert!(policy.initial_backoff < Duration::from_secs(1));
    }
}
