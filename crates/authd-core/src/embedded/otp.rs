use std::collections::HashMap;

use async_trait::async_trait;

use super::AuthenticPerson;
use crate::otp::OtpKey;
use crate::storage::OtpStore;
use crate::{AuthError, AuthResult};

const OTPAUTH_PREFIX: &str = "otpauth://";

/// TOTP keys taken from the users' `otp_key_uri`.
///
/// URIs are parsed up front, so a malformed one fails at startup rather than
/// at login.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedOtpStore {
    keys: HashMap<String, OtpKey>,
}

impl EmbeddedOtpStore {
    /// # Errors
    ///
    /// Returns a configuration error naming the user whose URI is malformed.
    pub fn new(users: &HashMap<String, AuthenticPerson>) -> AuthResult<Self> {
        let mut keys = HashMap::new();
        for (user_id, user) in users {
            let Some(uri) = user
                .otp_key_uri
                .as_deref()
                .filter(|uri| uri.starts_with(OTPAUTH_PREFIX))
            else {
                continue;
            };
            let key = OtpKey::from_uri(uri).map_err(|e| {
                AuthError::configuration(format!("user '{user_id}' has an invalid otp_key_uri: {e}"))
            })?;
            keys.insert(user_id.to_lowercase(), key);
        }
        Ok(Self { keys })
    }
}

#[async_trait]
impl OtpStore for EmbeddedOtpStore {
    async fn lookup(&self, subject: &str) -> AuthResult<Option<OtpKey>> {
        Ok(self.keys.get(&subject.to_lowercase()).cloned())
    }
}
