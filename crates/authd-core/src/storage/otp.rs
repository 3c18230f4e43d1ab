//! OTP key store trait.

use async_trait::async_trait;

use crate::AuthResult;
use crate::otp::OtpKey;

/// Lookup of second-factor keys.
#[async_trait]
pub trait OtpStore: Send + Sync {
    /// The TOTP key of `subject`, or `None` when the user has no second factor.
    async fn lookup(&self, subject: &str) -> AuthResult<Option<OtpKey>>;
}
