use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::secret::{verify_password, verify_password_unknown_user};
use crate::storage::{IdentityStore, Person, SessionStatus};
use crate::{AuthError, AuthResult};

/// A configured user: profile attributes plus credentials.
#[derive(Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AuthenticPerson {
    #[serde(flatten)]
    pub person: Person,

    /// Argon2 or bcrypt hash of the password.
    #[serde(default)]
    pub password_hash: String,

    /// `otpauth://totp/...` URI of the user's second factor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp_key_uri: Option<String>,
}

impl fmt::Debug for AuthenticPerson {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticPerson")
            .field("person", &self.person)
            .field("password_hash", &"***")
            .field("otp_key_uri", &self.otp_key_uri.as_ref().map(|_| "***"))
            .finish()
    }
}

#[derive(Debug, Clone)]
struct Session {
    session_name: String,
    user_id: String,
    auth_time: OffsetDateTime,
    two_factor_required: bool,
    verified: bool,
}

/// Users from configuration with in-memory login sessions.
///
/// The session cookie carries a random id; everything else stays on the
/// server.
pub struct EmbeddedIdentityStore {
    users: HashMap<String, AuthenticPerson>,
    sessions: DashMap<String, Session>,
    session_ttl: time::Duration,
}

impl EmbeddedIdentityStore {
    pub fn new(users: HashMap<String, AuthenticPerson>, session_ttl: Duration) -> Self {
        let users = users
            .into_iter()
            .map(|(id, user)| (id.to_lowercase(), user))
            .collect();
        Self {
            users,
            sessions: DashMap::new(),
            session_ttl: time::Duration::try_from(session_ttl).unwrap_or(time::Duration::MAX),
        }
    }

    /// Number of stored sessions, expired ones included until pruned.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn is_expired(&self, session: &Session, now: OffsetDateTime) -> bool {
        session.auth_time.saturating_add(self.session_ttl) <= now
    }

    fn session_id<'a>(jar: &'a CookieJar, session_name: &str) -> Option<&'a str> {
        jar.get(session_name)
            .map(Cookie::value)
            .filter(|value| !value.is_empty())
    }

    fn prune(&self, now: OffsetDateTime) {
        self.sessions
            .retain(|_, session| !self.is_expired(session, now));
    }
}

fn new_session_id() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[async_trait]
impl IdentityStore for EmbeddedIdentityStore {
    async fn authenticate(&self, user_id: &str, password: &str) -> AuthResult<Option<String>> {
        let user_id = user_id.trim().to_lowercase();
        match self.users.get(&user_id) {
            Some(user) if verify_password(password, &user.password_hash) => Ok(Some(user_id)),
            Some(_) => {
                tracing::info!(user_id = %user_id, "Password comparison failed");
                Ok(None)
            }
            None => {
                verify_password_unknown_user(password);
                tracing::info!(user_id = %user_id, "Unknown user");
                Ok(None)
            }
        }
    }

    async fn lookup(&self, subject: &str) -> AuthResult<Option<Person>> {
        Ok(self
            .users
            .get(&subject.to_lowercase())
            .map(|user| user.person.clone()))
    }

    async fn is_session_active(
        &self,
        jar: &CookieJar,
        session_name: &str,
    ) -> AuthResult<SessionStatus> {
        let Some(id) = Self::session_id(jar, session_name) else {
            return Ok(SessionStatus::inactive());
        };
        let Some(session) = self.sessions.get(id) else {
            return Ok(SessionStatus::inactive());
        };
        if session.session_name != session_name
            || self.is_expired(&session, OffsetDateTime::now_utc())
        {
            return Ok(SessionStatus::inactive());
        }
        Ok(SessionStatus {
            subject: session.user_id.clone(),
            active: true,
            verified: !session.two_factor_required || session.verified,
        })
    }

    async fn save_session(
        &self,
        jar: CookieJar,
        auth_time: OffsetDateTime,
        user_id: &str,
        session_name: &str,
        two_factor_required: bool,
    ) -> AuthResult<CookieJar> {
        let now = OffsetDateTime::now_utc();
        self.prune(now);
        if let Some(previous) = Self::session_id(&jar, session_name) {
            self.sessions.remove(previous);
        }

        let id = new_session_id();
        self.sessions.insert(
            id.clone(),
            Session {
                session_name: session_name.to_string(),
                user_id: user_id.to_lowercase(),
                auth_time,
                two_factor_required,
                verified: false,
            },
        );
        tracing::debug!(
            user_id = %user_id,
            session_name = %session_name,
            two_factor_required,
            "Session saved"
        );

        let cookie = Cookie::build((session_name.to_string(), id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(self.session_ttl)
            .build();
        Ok(jar.add(cookie))
    }

    async fn verify_session(&self, jar: CookieJar, session_name: &str) -> AuthResult<CookieJar> {
        let id = Self::session_id(&jar, session_name)
            .ok_or_else(|| AuthError::unauthorized("no session"))?;
        let mut session = self
            .sessions
            .get_mut(id)
            .filter(|session| session.session_name == session_name)
            .ok_or_else(|| AuthError::unauthorized("no session"))?;
        session.verified = true;
        drop(session);
        Ok(jar)
    }

    async fn end_session(&self, jar: CookieJar, session_name: &str) -> AuthResult<CookieJar> {
        let Some(id) = Self::session_id(&jar, session_name) else {
            return Ok(jar);
        };
        if let Some((_, session)) = self
            .sessions
            .remove_if(id, |_, session| session.session_name == session_name)
        {
            tracing::debug!(
                user_id = %session.user_id,
                session_name = %session_name,
                "Session ended"
            );
        }
        Ok(jar.remove(Cookie::build((session_name.to_string(), "")).path("/")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::hash_password;

    fn store(session_ttl: Duration) -> EmbeddedIdentityStore {
        let mut users = HashMap::new();
        users.insert(
            "Alice".to_string(),
            AuthenticPerson {
                person: Person {
                    given_name: "Alice".to_string(),
                    groups: vec!["eng".to_string()],
                    ..Person::default()
                },
                password_hash: hash_password("wonderland").unwrap(),
                otp_key_uri: None,
            },
        );
        users.insert(
            "bob".to_string(),
            AuthenticPerson {
                password_hash: bcrypt::hash("builder", 4).unwrap(),
                ..AuthenticPerson::default()
            },
        );
        EmbeddedIdentityStore::new(users, session_ttl)
    }

    #[tokio::test]
    async fn test_authenticate() {
        let store = store(Duration::from_secs(60));
        assert_eq!(
            store.authenticate("ALICE", "wonderland").await.unwrap(),
            Some("alice".to_string())
        );
        assert_eq!(
            store.authenticate("bob", "builder").await.unwrap(),
            Some("bob".to_string())
        );
        assert_eq!(store.authenticate("alice", "Wonderland").await.unwrap(), None);
        assert_eq!(store.authenticate("mallory", "wonderland").await.unwrap(), None);
        assert_eq!(
            store.authenticate("mallory", "authd-unknown-user").await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_lookup() {
        let store = store(Duration::from_secs(60));
        let person = store.lookup("Alice").await.unwrap().unwrap();
        assert_eq!(person.given_name, "Alice");
        assert!(store.lookup("mallory").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = store(Duration::from_secs(60));
        let jar = CookieJar::new();
        assert_eq!(
            store.is_session_active(&jar, "_auth").await.unwrap(),
            SessionStatus::inactive()
        );

        let jar = store
            .save_session(jar, OffsetDateTime::now_utc(), "alice", "_auth", false)
            .await
            .unwrap();
        let cookie = jar.get("_auth").unwrap();
        assert!(cookie.http_only().unwrap_or(false));
        assert_eq!(cookie.value().len(), 43);

        let status = store.is_session_active(&jar, "_auth").await.unwrap();
        assert!(status.is_authenticated());
        assert_eq!(status.subject, "alice");

        // other session names are independent
        assert!(!store.is_session_active(&jar, "_other").await.unwrap().active);
    }

    #[tokio::test]
    async fn test_end_session() {
        let store = store(Duration::from_secs(60));
        let jar = store
            .save_session(CookieJar::new(), OffsetDateTime::now_utc(), "alice", "_auth", false)
            .await
            .unwrap();
        let stale = jar.clone();
        assert_eq!(store.session_count(), 1);

        let other = store.end_session(jar.clone(), "_other").await.unwrap();
        assert!(store.is_session_active(&other, "_auth").await.unwrap().active);

        let jar = store.end_session(jar, "_auth").await.unwrap();
        assert_eq!(store.session_count(), 0);
        assert!(jar.get("_auth").is_none());
        assert!(!store.is_session_active(&stale, "_auth").await.unwrap().active);

        let jar = store.end_session(CookieJar::new(), "_auth").await.unwrap();
        assert!(jar.get("_auth").is_none());
    }

    #[tokio::test]
    async fn test_two_factor_session_needs_verification() {
        let store = store(Duration::from_secs(60));
        let jar = store
            .save_session(CookieJar::new(), OffsetDateTime::now_utc(), "alice", "_auth", true)
            .await
            .unwrap();

        let status = store.is_session_active(&jar, "_auth").await.unwrap();
        assert!(status.active);
        assert!(!status.verified);

        let jar = store.verify_session(jar, "_auth").await.unwrap();
        assert!(store.is_session_active(&jar, "_auth").await.unwrap().is_authenticated());
    }

    #[tokio::test]
    async fn test_expired_session_is_inactive() {
        let store = store(Duration::from_secs(60));
        let long_ago = OffsetDateTime::now_utc() - time::Duration::minutes(2);
        let jar = store
            .save_session(CookieJar::new(), long_ago, "alice", "_auth", false)
            .await
            .unwrap();
        assert!(!store.is_session_active(&jar, "_auth").await.unwrap().active);
    }

    #[tokio::test]
    async fn test_new_session_replaces_previous() {
        let store = store(Duration::from_secs(60));
        let jar = store
            .save_session(CookieJar::new(), OffsetDateTime::now_utc(), "alice", "_auth", false)
            .await
            .unwrap();
        let first = jar.get("_auth").unwrap().value().to_string();
        let jar = store
            .save_session(jar, OffsetDateTime::now_utc(), "bob", "_auth", false)
            .await
            .unwrap();

        assert_ne!(jar.get("_auth").unwrap().value(), first);
        assert_eq!(store.session_count(), 1);
        assert_eq!(store.is_session_active(&jar, "_auth").await.unwrap().subject, "bob");
    }

    #[tokio::test]
    async fn test_verify_without_session_fails() {
        let store = store(Duration::from_secs(60));
        let err = store
            .verify_session(CookieJar::new(), "_auth")
            .await
            .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 401);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let user = AuthenticPerson {
            password_hash: "$argon2id$secret".to_string(),
            otp_key_uri: Some("otpauth://totp/x?secret=ABC".to_string()),
            ..AuthenticPerson::default()
        };
        let debug = format!("{user:?}");
        assert!(!debug.contains("argon2id"));
        assert!(!debug.contains("otpauth"));
    }
}
