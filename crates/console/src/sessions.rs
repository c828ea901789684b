//! In-memory cookie sessions with flash messages.
//!
//! A session exists for every browser that has visited the console, logged
//! in or not, so flash messages survive a redirect to the login page. Only
//! the `{id, username}` payload of a logged-in user is stored, together with
//! how that user authenticated.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use tessera_core::models::user::{AuthType, SessionPayload};
use tessera_core::notify::{Notice, Notifier};
use tracing::debug;

pub const SESSION_COOKIE_NAME: &str = "tessera_session";

/// Generate a random session token (64 hex characters).
pub fn generate_session_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// `Set-Cookie` value for `token`, valid for `max_age_secs`.
pub fn session_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}")
}

#[derive(Debug, Clone)]
struct SessionRecord {
    payload: Option<SessionPayload>,
    origin: AuthType,
    flash: Vec<Notice>,
    expires_at: DateTime<Utc>,
}

/// Session records keyed by token.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionStore {
    pub fn new(timeout_minutes: u32) -> Self {
        Self {
            ttl: Duration::minutes(i64::from(timeout_minutes)),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn max_age_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// Start an anonymous session and return its token.
    pub fn create(&self) -> String {
        let token = generate_session_token();
        let record = SessionRecord {
            payload: None,
            origin: AuthType::Local,
            flash: Vec::new(),
            expires_at: Utc::now() + self.ttl,
        };
        self.write().insert(token.clone(), record);
        token
    }

    /// Whether `token` names a live session. Live sessions get their expiry
    /// pushed back; expired ones are removed.
    pub fn touch(&self, token: &str) -> bool {
        let now = Utc::now();
        let mut sessions = self.write();
        match sessions.get_mut(token) {
            Some(record) if record.expires_at > now => {
                record.expires_at = now + self.ttl;
                true
            }
            Some(_) => {
                sessions.remove(token);
                debug!("expired session removed");
                false
            }
            None => false,
        }
    }

    /// Bind `payload` to a fresh token, replacing the session `previous`.
    /// `origin` records whether the login was local or through SAML.
    ///
    /// Pending flash messages move to the new session. Returns the new token.
    pub fn login(&self, previous: &str, payload: SessionPayload, origin: AuthType) -> String {
        let token = generate_session_token();
        let mut sessions = self.write();
        let flash = sessions
            .remove(previous)
            .map(|record| record.flash)
            .unwrap_or_default();
        sessions.insert(
            token.clone(),
            SessionRecord {
                payload: Some(payload),
                origin,
                flash,
                expires_at: Utc::now() + self.ttl,
            },
        );
        token
    }

    /// Drop the payload but keep the session, so a flash can follow.
    pub fn logout(&self, token: &str) -> Option<SessionPayload> {
        self.write()
            .get_mut(token)
            .and_then(|record| record.payload.take())
    }

    pub fn payload(&self, token: &str) -> Option<SessionPayload> {
        self.read()
            .get(token)
            .and_then(|record| record.payload.clone())
    }

    /// The logged-in payload and how it authenticated.
    pub fn identity(&self, token: &str) -> Option<(SessionPayload, AuthType)> {
        self.read().get(token).and_then(|record| {
            record
                .payload
                .clone()
                .map(|payload| (payload, record.origin))
        })
    }

    pub fn flash(&self, token: &str, notice: Notice) {
        if let Some(record) = self.write().get_mut(token) {
            record.flash.push(notice);
        }
    }

    /// Take the pending flash messages, oldest first.
    pub fn take_flash(&self, token: &str) -> Vec<Notice> {
        self.write()
            .get_mut(token)
            .map(|record| std::mem::take(&mut record.flash))
            .unwrap_or_default()
    }

    /// Remove every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, record| record.expires_at > now);
        before - sessions.len()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A notifier that flashes into the session `token`.
    pub fn notifier<'a>(&'a self, token: &'a str) -> SessionNotifier<'a> {
        SessionNotifier { store: self, token }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, SessionRecord>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct SessionNotifier<'a> {
    store: &'a SessionStore,
    token: &'a str,
}

impl Notifier for SessionNotifier<'_> {
    fn notify(&self, notice: Notice) {
        self.store.flash(self.token, notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::notify::NoticeLevel;

    fn payload() -> SessionPayload {
        SessionPayload {
            id: "1".into(),
            username: "admin".into(),
        }
    }

    #[test]
    fn generate_session_token_is_64_hex_chars() {
        let token = generate_session_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_session_token());
    }

    #[test]
    fn new_session_is_anonymous() {
        let store = SessionStore::new(30);
        let token = store.create();
        assert!(store.touch(&token));
        assert_eq!(store.payload(&token), None);
        assert!(!store.touch("unknown"));
    }

    #[test]
    fn login_rotates_token_and_keeps_flash() {
        let store = SessionStore::new(30);
        let anon = store.create();
        store.notifier(&anon).success("welcome");

        let token = store.login(&anon, payload(), AuthType::Local);
        assert_ne!(token, anon);
        assert!(!store.touch(&anon));
        assert_eq!(store.payload(&token), Some(payload()));

        let flash = store.take_flash(&token);
        assert_eq!(flash.len(), 1);
        assert_eq!(flash[0].level, NoticeLevel::Success);
        assert!(store.take_flash(&token).is_empty());
    }

    #[test]
    fn identity_carries_login_origin() {
        let store = SessionStore::new(30);
        let anon = store.create();
        assert_eq!(store.identity(&anon), None);

        let token = store.login(&anon, payload(), AuthType::Saml);
        assert_eq!(store.identity(&token), Some((payload(), AuthType::Saml)));
        store.logout(&token);
        assert_eq!(store.identity(&token), None);
    }

    #[test]
    fn logout_keeps_session_for_flash() {
        let store = SessionStore::new(30);
        let anon = store.create();
        let token = store.login(&anon, payload(), AuthType::Local);

        assert_eq!(store.logout(&token), Some(payload()));
        assert!(store.touch(&token));
        assert_eq!(store.payload(&token), None);
        assert_eq!(store.logout(&token), None);
    }

    #[test]
    fn expired_sessions_are_dropped() {
        let store = SessionStore::new(0);
        let token = store.create();
        assert!(!store.touch(&token));
        assert!(store.is_empty());

        store.create();
        store.create();
        assert_eq!(store.purge_expired(), 2);
    }

    #[test]
    fn session_cookie_format() {
        let cookie = session_cookie("abc", 60);
        assert_eq!(
            cookie,
            "tessera_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=60"
        );
    }
}
