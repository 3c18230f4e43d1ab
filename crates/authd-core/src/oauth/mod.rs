//! OAuth 2.0 / OpenID Connect protocol flows.
//!
//! This module provides:
//!
//! - PKCE (RFC 7636) challenge verification
//! - Scope intersection
//! - Client authentication for the token endpoint
//! - The authorization endpoint state machine
//! - The token endpoint grant dispatcher
//! - Optional single-use enforcement for authorization codes

pub mod authorize;
pub mod client_auth;
pub mod pkce;
pub mod scope;
pub mod seen_code;
pub mod token;

pub use authorize::{AuthorizationEndpoint, AuthorizeOutcome, AuthorizeRequest};
pub use client_auth::{ClientCredentials, authenticate_client, parse_basic_auth};
pub use pkce::{PkceChallengeMethod, PkceError};
pub use scope::{has_scope, intersect_scope};
pub use seen_code::{InMemorySeenCodes, SeenCodeCheck};
pub use token::{GrantType, TokenEndpoint, TokenRequest, TokenResponse};
