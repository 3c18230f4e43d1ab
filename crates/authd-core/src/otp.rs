//! Time-based one-time passwords (RFC 6238) for the second login factor.
//!
//! Keys are provisioned as `otpauth://totp/<label>?secret=<base32>` URIs with
//! optional `algorithm`, `digits` and `period` parameters.

use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use time::OffsetDateTime;
use url::Url;

use crate::secret::constant_time_eq;

/// URI scheme prefix of provisioned keys.
pub const OTPAUTH_PREFIX: &str = "otpauth://";

const DEFAULT_DIGITS: u32 = 6;
const DEFAULT_PERIOD: u64 = 30;
/// Accepted clock skew in time steps on either side.
const SKEW_STEPS: i64 = 1;

/// HMAC algorithm of a TOTP key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OtpAlgorithm {
    /// HMAC-SHA1, the authenticator-app default.
    #[default]
    Sha1,
    /// HMAC-SHA256.
    Sha256,
    /// HMAC-SHA512.
    Sha512,
}

/// Errors raised while parsing an `otpauth://` URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OtpError {
    /// The URI is not a TOTP provisioning URI.
    #[error("invalid otpauth URI: {0}")]
    InvalidUri(String),

    /// The shared secret is not valid base32.
    #[error("invalid otp secret")]
    InvalidSecret,

    /// A parameter has an unsupported value.
    #[error("unsupported otp parameter {name}={value}")]
    UnsupportedParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
}

/// A TOTP key.
#[derive(Clone, PartialEq, Eq)]
pub struct OtpKey {
    secret: Vec<u8>,
    algorithm: OtpAlgorithm,
    digits: u32,
    period: u64,
}

impl std::fmt::Debug for OtpKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpKey")
            .field("algorithm", &self.algorithm)
            .field("digits", &self.digits)
            .field("period", &self.period)
            .finish_non_exhaustive()
    }
}

impl OtpKey {
    /// Creates a key from a raw shared secret with default parameters.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
            algorithm: OtpAlgorithm::Sha1,
            digits: DEFAULT_DIGITS,
            period: DEFAULT_PERIOD,
        }
    }

    /// Sets the HMAC algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: OtpAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Sets the number of digits.
    #[must_use]
    pub fn with_digits(mut self, digits: u32) -> Self {
        self.digits = digits;
        self
    }

    /// Parses an `otpauth://totp/...` URI.
    pub fn from_uri(uri: &str) -> Result<Self, OtpError> {
        let url = Url::parse(uri).map_err(|e| OtpError::InvalidUri(e.to_string()))?;
        if url.scheme() != "otpauth" || url.host_str() != Some("totp") {
            return Err(OtpError::InvalidUri(
                "expected otpauth://totp/".to_string(),
            ));
        }

        let mut key = Self::new(Vec::new());
        let mut secret = None;
        for (name, value) in url.query_pairs() {
            match name.as_ref() {
                "secret" => secret = Some(decode_base32(&value).ok_or(OtpError::InvalidSecret)?),
                "algorithm" => {
                    key.algorithm = match value.to_ascii_uppercase().as_str() {
                        "SHA1" => OtpAlgorithm::Sha1,
                        "SHA256" => OtpAlgorithm::Sha256,
                        "SHA512" => OtpAlgorithm::Sha512,
                        _ => {
                            return Err(OtpError::UnsupportedParameter {
                                name: "algorithm",
                                value: value.into_owned(),
                            });
                        }
                    }
                }
                "digits" => {
                    key.digits = value
                        .parse()
                        .ok()
                        .filter(|digits| (6..=8).contains(digits))
                        .ok_or_else(|| OtpError::UnsupportedParameter {
                            name: "digits",
                            value: value.to_string(),
                        })?;
                }
                "period" => {
                    key.period = value
                        .parse()
                        .ok()
                        .filter(|period| *period > 0)
                        .ok_or_else(|| OtpError::UnsupportedParameter {
                            name: "period",
                            value: value.to_string(),
                        })?;
                }
                _ => {}
            }
        }

        key.secret = secret
            .filter(|secret| !secret.is_empty())
            .ok_or(OtpError::InvalidSecret)?;
        Ok(key)
    }

    /// Verifies a code against the current time.
    pub fn verify(&self, code: &str) -> bool {
        self.verify_at(code, OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Verifies a code at `unix_time`, accepting one step of clock skew.
    pub fn verify_at(&self, code: &str, unix_time: i64) -> bool {
        let code = code.trim();
        if code.len() != self.digits as usize {
            return false;
        }
        let step = unix_time.div_euclid(self.period as i64);
        let mut valid = false;
        for counter in (step - SKEW_STEPS)..=(step + SKEW_STEPS) {
            if counter < 0 {
                continue;
            }
            // evaluate every step so timing does not reveal which one matched
            valid |= constant_time_eq(&self.code_for_counter(counter as u64), code);
        }
        valid
    }

    /// The code valid at `unix_time`.
    pub fn generate_at(&self, unix_time: i64) -> String {
        let step = unix_time.div_euclid(self.period as i64).max(0);
        self.code_for_counter(step as u64)
    }

    fn code_for_counter(&self, counter: u64) -> String {
        let message = counter.to_be_bytes();
        let digest = match self.algorithm {
            OtpAlgorithm::Sha1 => hmac_digest::<Hmac<Sha1>>(&self.secret, &message),
            OtpAlgorithm::Sha256 => hmac_digest::<Hmac<Sha256>>(&self.secret, &message),
            OtpAlgorithm::Sha512 => hmac_digest::<Hmac<Sha512>>(&self.secret, &message),
        };

        let offset = usize::from(digest[digest.len() - 1] & 0x0f);
        let binary = u32::from_be_bytes([
            digest[offset] & 0x7f,
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ]);
        let modulus = 10u32.pow(self.digits);
        format!("{:0width$}", binary % modulus, width = self.digits as usize)
    }
}

fn hmac_digest<M: Mac + hmac::digest::KeyInit>(key: &[u8], message: &[u8]) -> Vec<u8> {
    // HMAC accepts keys of any length
    let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key)
        .unwrap_or_else(|_| <M as hmac::digest::KeyInit>::new(&Default::default()));
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

/// RFC 4648 base32 without padding requirements, case-insensitive, spaces ignored.
fn decode_base32(input: &str) -> Option<Vec<u8>> {
    let mut output = Vec::with_capacity(input.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;
    for c in input.chars().filter(|c| !c.is_whitespace() && *c != '=') {
        let value = match c.to_ascii_uppercase() {
            c @ 'A'..='Z' => c as u32 - 'A' as u32,
            c @ '2'..='7' => c as u32 - '2' as u32 + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            output.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    Some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RFC_SECRET_SHA1: &str = "12345678901234567890";

    #[test]
    fn test_base32_decoding() {
        assert_eq!(
            decode_base32("GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ").unwrap(),
            RFC_SECRET_SHA1.as_bytes()
        );
        assert_eq!(decode_base32("mzxw6ytb oi======").unwrap(), b"foobar");
        assert!(decode_base32("01").is_none());
    }

    #[test]
    fn test_rfc6238_vectors() {
        let sha1 = OtpKey::new(RFC_SECRET_SHA1).with_digits(8);
        assert_eq!(sha1.generate_at(59), "94287082");
        assert_eq!(sha1.generate_at(1_111_111_109), "07081804");

        let sha256 = OtpKey::new("12345678901234567890123456789012")
            .with_algorithm(OtpAlgorithm::Sha256)
            .with_digits(8);
        assert_eq!(sha256.generate_at(59), "46119246");

        let sha512 = OtpKey::new(
            "1234567890123456789012345678901234567890123456789012345678901234",
        )
        .with_algorithm(OtpAlgorithm::Sha512)
        .with_digits(8);
        assert_eq!(sha512.generate_at(59), "90693936");
    }

    #[test]
    fn test_verify_accepts_one_step_of_skew() {
        let key = OtpKey::new(RFC_SECRET_SHA1);
        let code = key.generate_at(1_000_000);
        assert!(key.verify_at(&code, 1_000_000));
        assert!(key.verify_at(&code, 1_000_000 + 30));
        assert!(key.verify_at(&code, 1_000_000 - 30));
        assert!(!key.verify_at(&code, 1_000_000 + 90));
        assert!(!key.verify_at("12345", 1_000_000));
    }

    #[test]
    fn test_from_uri() {
        let key = OtpKey::from_uri(
            "otpauth://totp/authd:alice?secret=GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ&issuer=authd&digits=8",
        )
        .unwrap();
        assert_eq!(key.generate_at(59), "94287082");
        assert!(key.verify(&key.generate_at(OffsetDateTime::now_utc().unix_timestamp())));
    }

    #[test]
    fn test_from_uri_errors() {
        assert!(matches!(
            OtpKey::from_uri("otpauth://hotp/x?secret=GEZA"),
            Err(OtpError::InvalidUri(_))
        ));
        assert_eq!(
            OtpKey::from_uri("otpauth://totp/x"),
            Err(OtpError::InvalidSecret)
        );
        assert!(matches!(
            OtpKey::from_uri("otpauth://totp/x?secret=GEZA&algorithm=MD5"),
            Err(OtpError::UnsupportedParameter { name: "algorithm", .. })
        ));
    }

    #[test]
    fn test_debug_hides_secret() {
        let key = OtpKey::new(RFC_SECRET_SHA1);
        assert!(!format!("{key:?}").contains("1234"));
    }
}
