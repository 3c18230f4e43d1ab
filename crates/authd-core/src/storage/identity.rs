//! Identity store trait: people, passwords and login sessions.

use async_trait::async_trait;
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;

use super::{Person, SessionStatus};
use crate::AuthResult;

/// Authentication of end users and management of their login sessions.
///
/// Sessions live in cookies named after the session name. Implementations
/// decide what the cookie carries; the core only reads [`SessionStatus`].
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Checks a user id and password.
    ///
    /// Returns the normalized subject on success and `None` on any
    /// credential mismatch, unknown users included.
    ///
    /// # Errors
    ///
    /// Returns an error only if the backend itself fails.
    async fn authenticate(&self, user_id: &str, password: &str) -> AuthResult<Option<String>>;

    /// Profile attributes of a subject, or `None` if unknown.
    async fn lookup(&self, subject: &str) -> AuthResult<Option<Person>>;

    /// Reads the session stored under `session_name`.
    async fn is_session_active(
        &self,
        jar: &CookieJar,
        session_name: &str,
    ) -> AuthResult<SessionStatus>;

    /// Starts a session for `user_id` and returns the jar carrying its cookie.
    ///
    /// When `two_factor_required` is set the session stays unverified until
    /// [`verify_session`](Self::verify_session) is called.
    async fn save_session(
        &self,
        jar: CookieJar,
        auth_time: OffsetDateTime,
        user_id: &str,
        session_name: &str,
        two_factor_required: bool,
    ) -> AuthResult<CookieJar>;

    /// Marks the second factor of the session under `session_name` as verified.
    async fn verify_session(&self, jar: CookieJar, session_name: &str) -> AuthResult<CookieJar>;

    /// Ends the session under `session_name` and returns the jar that
    /// removes its cookie. Without a session this is a no-op.
    async fn end_session(&self, jar: CookieJar, session_name: &str) -> AuthResult<CookieJar>;
}
