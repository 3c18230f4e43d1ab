//! Token issuance and verification.
//!
//! This module provides:
//!
//! - Claim sets, type tags and OIDC claim shaping
//! - JWT encoding and decoding with the signing key
//! - The Token Service for access tokens, codes, refresh tokens and ID tokens
//! - Access-token validation against the key set

pub mod claims;
pub mod jwt;
pub mod service;
pub mod validator;

pub use claims::{Audience, ClaimTemplate, Claims, TokenType};
pub use jwt::{JwtError, JwtService};
pub use service::{AuthCodeGrant, RefreshGrant, TokenConfig, TokenService, at_hash};
pub use validator::AccessTokenValidator;
