use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use elliptic_curve::sec1::ToEncodedPoint;
use jsonwebtoken::{Algorithm, DecodingKey};
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};

use super::{Jwk, KeyError, PemBlock};

const CURVE_P256: &str = "P-256";
const CURVE_P384: &str = "P-384";

/// A public key able to verify token signatures.
#[derive(Debug, Clone, PartialEq)]
pub enum PublicKey {
    /// RSA key, used with RS* and PS* algorithms.
    Rsa(RsaPublicKey),
    /// NIST P-256 key, used with ES256.
    P256(p256::PublicKey),
    /// NIST P-384 key, used with ES384.
    P384(p384::PublicKey),
}

impl PublicKey {
    /// Extracts the public key from a PEM block.
    ///
    /// Accepted labels: `RSA PRIVATE KEY` (PKCS#1), `EC PRIVATE KEY` (SEC1),
    /// `RSA PUBLIC KEY` (PKCS#1) and `PUBLIC KEY` (PKIX). Private keys yield
    /// their public half.
    pub fn from_pem_block(block: &PemBlock) -> Result<Self, KeyError> {
        let der = block.contents.as_slice();
        match block.label.trim().to_ascii_lowercase().as_str() {
            "rsa private key" => {
                let private = RsaPrivateKey::from_pkcs1_der(der).map_err(KeyError::invalid)?;
                Ok(Self::Rsa(private.to_public_key()))
            }
            "ec private key" => {
                if let Ok(secret) = p256::SecretKey::from_sec1_der(der) {
                    return Ok(Self::P256(secret.public_key()));
                }
                p384::SecretKey::from_sec1_der(der)
                    .map(|secret| Self::P384(secret.public_key()))
                    .map_err(|_| KeyError::InvalidKey("unsupported or malformed EC private key".to_string()))
            }
            "rsa public key" => RsaPublicKey::from_pkcs1_der(der)
                .map(Self::Rsa)
                .map_err(KeyError::invalid),
            "public key" => {
                if let Ok(key) = RsaPublicKey::from_public_key_der(der) {
                    return Ok(Self::Rsa(key));
                }
                if let Ok(key) = p256::PublicKey::from_public_key_der(der) {
                    return Ok(Self::P256(key));
                }
                p384::PublicKey::from_public_key_der(der)
                    .map(Self::P384)
                    .map_err(|_| KeyError::InvalidKey("unsupported or malformed PKIX public key".to_string()))
            }
            _ => Err(KeyError::UnsupportedKeyType(block.label.clone())),
        }
    }

    /// Builds a key from its JWK representation.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyError> {
        match jwk.kty.as_str() {
            "RSA" => {
                let n = decode_member(jwk.n.as_deref(), "n")?;
                let e = decode_member(jwk.e.as_deref(), "e")?;
                RsaPublicKey::new(BigUint::from_bytes_be(&n), BigUint::from_bytes_be(&e))
                    .map(Self::Rsa)
                    .map_err(KeyError::invalid)
            }
            "EC" => {
                let x = decode_member(jwk.x.as_deref(), "x")?;
                let y = decode_member(jwk.y.as_deref(), "y")?;
                let mut point = Vec::with_capacity(1 + x.len() + y.len());
                point.push(0x04);
                point.extend_from_slice(&x);
                point.extend_from_slice(&y);
                match jwk.crv.as_deref() {
                    Some(CURVE_P256) => p256::PublicKey::from_sec1_bytes(&point)
                        .map(Self::P256)
                        .map_err(KeyError::invalid),
                    Some(CURVE_P384) => p384::PublicKey::from_sec1_bytes(&point)
                        .map(Self::P384)
                        .map_err(KeyError::invalid),
                    other => Err(KeyError::UnsupportedKeyType(format!(
                        "EC curve {}",
                        other.unwrap_or("<missing>")
                    ))),
                }
            }
            other => Err(KeyError::UnsupportedKeyType(other.to_string())),
        }
    }

    /// JWK representation with `use=sig`.
    ///
    /// `alg` is advertised when known; EC keys always advertise theirs.
    pub fn to_jwk(&self, kid: &str, alg: Option<Algorithm>) -> Result<Jwk, KeyError> {
        let jwk = match self {
            Self::Rsa(key) => Jwk {
                kty: "RSA".to_string(),
                n: Some(URL_SAFE_NO_PAD.encode(key.n().to_bytes_be())),
                e: Some(URL_SAFE_NO_PAD.encode(key.e().to_bytes_be())),
                alg: alg.map(algorithm_name),
                ..Jwk::default()
            },
            Self::P256(key) => {
                let point = key.to_encoded_point(false);
                ec_jwk(CURVE_P256, Algorithm::ES256, point.x(), point.y())?
            }
            Self::P384(key) => {
                let point = key.to_encoded_point(false);
                ec_jwk(CURVE_P384, Algorithm::ES384, point.x(), point.y())?
            }
        };
        Ok(Jwk {
            kid: kid.to_string(),
            use_: Some("sig".to_string()),
            ..jwk
        })
    }

    /// Converts the key for use with `jsonwebtoken`.
    pub fn decoding_key(&self) -> Result<DecodingKey, KeyError> {
        let jwk = self.to_jwk("", None)?;
        match self {
            Self::Rsa(_) => DecodingKey::from_rsa_components(
                jwk.n.as_deref().unwrap_or_default(),
                jwk.e.as_deref().unwrap_or_default(),
            ),
            Self::P256(_) | Self::P384(_) => DecodingKey::from_ec_components(
                jwk.x.as_deref().unwrap_or_default(),
                jwk.y.as_deref().unwrap_or_default(),
            ),
        }
        .map_err(KeyError::invalid)
    }

    /// Signature algorithms this key can verify.
    pub fn algorithms(&self) -> Vec<Algorithm> {
        match self {
            Self::Rsa(_) => vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
            ],
            Self::P256(_) => vec![Algorithm::ES256],
            Self::P384(_) => vec![Algorithm::ES384],
        }
    }
}

fn decode_member(value: Option<&str>, name: &str) -> Result<Vec<u8>, KeyError> {
    let value = value.ok_or_else(|| KeyError::InvalidKey(format!("JWK member '{name}' missing")))?;
    URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| KeyError::InvalidKey(format!("JWK member '{name}': {e}")))
}

fn ec_jwk<T: AsRef<[u8]>>(
    crv: &str,
    alg: Algorithm,
    x: Option<&T>,
    y: Option<&T>,
) -> Result<Jwk, KeyError> {
    let (Some(x), Some(y)) = (x, y) else {
        return Err(KeyError::InvalidKey("EC point has no affine coordinates".to_string()));
    };
    Ok(Jwk {
        kty: "EC".to_string(),
        crv: Some(crv.to_string()),
        x: Some(URL_SAFE_NO_PAD.encode(x.as_ref())),
        y: Some(URL_SAFE_NO_PAD.encode(y.as_ref())),
        alg: Some(algorithm_name(alg)),
        ..Jwk::default()
    })
}

pub(crate) fn algorithm_name(alg: Algorithm) -> String {
    format!("{alg:?}")
}
