//! # authd-core
//!
//! OpenID Connect / OAuth 2.0 identity provider engine.
//!
//! This crate provides:
//! - Signed, self-contained access tokens, authorization codes, refresh
//!   tokens and ID tokens
//! - The authorization endpoint state machine and the token endpoint grant
//!   dispatcher
//! - A cached key set of local and remote verification keys
//! - Role mapping from user ids and groups
//! - Axum handlers for the protocol endpoints
//!
//! ## Overview
//!
//! There is no token table. Every code and token carries its own grant
//! state and is trusted when its signature, issuer, type tag and expiry
//! check out. Users, clients and second-factor keys come from collaborator
//! stores behind the traits in [`storage`].
//!
//! ## Modules
//!
//! - [`config`] - Identity provider configuration
//! - [`keys`] - Signing key and public key material (PEM, JWK)
//! - [`keyset`] - Cached `kid -> public key` map from configured sources
//! - [`token`] - Claims, JWT codec, token service and access-token validation
//! - [`oauth`] - PKCE, scopes, client authentication, authorize and token flows
//! - [`roles`] - Role-mapping rules
//! - [`storage`] - Collaborator store traits
//! - [`embedded`] - In-memory collaborator stores from configuration
//! - [`otp`] - TOTP second factor
//! - [`secret`] - Password and client-secret hashing
//! - [`http`] - Axum HTTP handlers

pub mod config;
pub mod embedded;
pub mod error;
pub mod http;
pub mod keys;
pub mod keyset;
pub mod oauth;
pub mod otp;
pub mod roles;
pub mod secret;
pub mod storage;
pub mod token;

pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, ErrorCategory};
pub use http::{AuthState, api_router, browser_router};
pub use keys::{KeyError, SigningKey};
pub use keyset::{KeySetConfig, KeySetError, KeySetProvider};
pub use oauth::{AuthorizationEndpoint, TokenEndpoint};
pub use roles::RoleMappings;
pub use token::{AccessTokenValidator, TokenService};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;
