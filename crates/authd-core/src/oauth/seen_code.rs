//! Optional single-use enforcement for authorization codes.
//!
//! Codes are stateless signed tokens, so by default one can be exchanged
//! any number of times until it expires. Injecting a [`SeenCodeCheck`] into
//! the token endpoint makes every code single-use, keyed by its `jti`.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use time::OffsetDateTime;

use crate::AuthResult;

/// Records redeemed authorization codes.
#[async_trait]
pub trait SeenCodeCheck: Send + Sync {
    /// Atomically marks a code id as used.
    ///
    /// Returns `true` on first use and `false` if the code was seen before.
    /// `expires_at` is the code's expiry; the entry may be dropped after it.
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool>;
}

/// Process-local [`SeenCodeCheck`].
///
/// Expired entries are pruned on every call.
#[derive(Debug, Default)]
pub struct InMemorySeenCodes {
    seen: DashMap<String, OffsetDateTime>,
}

impl InMemorySeenCodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked codes.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[async_trait]
impl SeenCodeCheck for InMemorySeenCodes {
    async fn mark_used(&self, jti: &str, expires_at: OffsetDateTime) -> AuthResult<bool> {
        let now = OffsetDateTime::now_utc();
        self.seen.retain(|_, expiry| *expiry > now);

        match self.seen.entry(jti.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(expires_at);
                Ok(true)
            }
        }
    }
}
