//! Session registry: opaque cookie tokens mapped to participant identity.
//!
//! The registry enforces ban, eject and expiry policy independently of the
//! game roster. Expiry is evaluated lazily when a token is validated; the
//! optional sweeper only bounds memory.
//!
//! Lock order: registry, then game. Nothing in the game ever calls back into
//! the registry, so the order cannot invert.

pub mod request;

use crate::clock::{Clock, SystemClock};
use crate::state::GameState;
use crate::types::*;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sessions live for an hour from creation unless configured otherwise
pub const DEFAULT_SESSION_TTL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("user {0} is banned")]
    BannedUser(Username),
    #[error("address {0} is banned")]
    BannedAddress(String),
    #[error("username {0} is held by another address")]
    UsernameTaken(Username),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: SessionToken,
    pub username: Username,
    pub ip: String,
    pub browser: String,
    pub created_at: DateTime<Utc>,
    pub banned: bool,
    pub ejected: bool,
    /// Role flags to restore when an ejected participant comes back
    pub roles: Roles,
    pub values: HashMap<String, serde_json::Value>,
}

impl Session {
    fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }

    fn is_live(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        !self.banned && !self.is_expired(now, ttl)
    }
}

/// Result of a successful join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admission {
    pub token: SessionToken,
    pub roles: Roles,
    /// True when an existing session for the username was reused
    pub rejoined: bool,
}

/// 32 random bytes, URL-safe base64
fn generate_token() -> SessionToken {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Debug, Default)]
struct Registry {
    sessions: HashMap<SessionToken, Session>,
    banned_users: HashSet<Username>,
    banned_ips: HashSet<String>,
}

impl Registry {
    /// The live session for `username`, provided it was opened from `ip`
    fn claim_live_session(
        &mut self,
        username: &str,
        ip: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Option<&mut Session>, SessionError> {
        match self
            .sessions
            .values_mut()
            .find(|s| s.username == username && s.is_live(now, ttl))
        {
            Some(session) if session.ip != ip => {
                Err(SessionError::UsernameTaken(username.to_string()))
            }
            found => Ok(found),
        }
    }
}

pub struct SessionRegistry {
    registry: RwLock<Registry>,
    game: GameState,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    /// Disabled in testing mode, where many players share one address
    ip_bans: bool,
}

impl SessionRegistry {
    pub fn new(game: GameState, ttl: Duration) -> Self {
        Self::with_clock(game, ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(game: GameState, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            game,
            clock,
            ttl,
            ip_bans: true,
        }
    }

    pub fn with_ip_bans(mut self, enabled: bool) -> Self {
        self.ip_bans = enabled;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn check_bans(&self, registry: &Registry, username: &str, ip: &str) -> Result<(), SessionError> {
        if registry.banned_users.contains(username) {
            return Err(SessionError::BannedUser(username.to_string()));
        }
        if self.ip_bans && registry.banned_ips.contains(ip) {
            return Err(SessionError::BannedAddress(ip.to_string()));
        }
        Ok(())
    }

    fn insert_session(
        &self,
        registry: &mut Registry,
        username: &str,
        ip: &str,
        browser: &str,
        roles: Roles,
    ) -> SessionToken {
        let token = generate_token();
        registry.sessions.insert(
            token.clone(),
            Session {
                token: token.clone(),
                username: username.to_string(),
                ip: ip.to_string(),
                browser: browser.to_string(),
                created_at: self.clock.now(),
                banned: false,
                ejected: false,
                roles,
                values: HashMap::new(),
            },
        );
        tracing::info!(username, ip, browser, "Session created");
        token
    }

    /// Create a session, or hand back the existing token when the username
    /// already has a live one opened from the same address
    pub async fn create_session(
        &self,
        username: &str,
        ip: &str,
        browser: &str,
    ) -> Result<SessionToken, SessionError> {
        let now = self.clock.now();
        let mut registry = self.registry.write().await;
        self.check_bans(&registry, username, ip)?;

        if let Some(existing) = registry.claim_live_session(username, ip, now, self.ttl)? {
            tracing::debug!(username, "Reusing live session");
            return Ok(existing.token.clone());
        }
        Ok(self.insert_session(&mut registry, username, ip, browser, Roles::PLAYER))
    }

    /// Join flow: create or reuse the session and put the participant on the
    /// roster. The first participant of an empty roster hosts the game.
    ///
    /// A username held by a live session from another address is refused.
    pub async fn admit(
        &self,
        username: &str,
        ip: &str,
        browser: &str,
    ) -> Result<Admission, SessionError> {
        let now = self.clock.now();
        let mut registry = self.registry.write().await;
        self.check_bans(&registry, username, ip)?;

        let admission = match registry.claim_live_session(username, ip, now, self.ttl)? {
            Some(existing) => {
                existing.ejected = false;
                Admission {
                    token: existing.token.clone(),
                    roles: existing.roles,
                    rejoined: true,
                }
            }
            None => {
                let roles = if self.game.participant_count().await == 0 {
                    Roles::HOST
                } else {
                    Roles::PLAYER
                };
                Admission {
                    token: self.insert_session(&mut registry, username, ip, browser, roles),
                    roles,
                    rejoined: false,
                }
            }
        };

        self.game
            .add_participant(
                username,
                admission.roles.is_admin,
                admission.roles.is_spectator,
                ip,
            )
            .await;
        tracing::info!(
            username,
            is_host = admission.roles.is_admin,
            rejoined = admission.rejoined,
            "Participant admitted"
        );
        Ok(admission)
    }

    /// The live session behind a token, if any
    pub async fn lookup(&self, token: &str) -> Option<Session> {
        let now = self.clock.now();
        self.registry
            .read()
            .await
            .sessions
            .get(token)
            .filter(|s| s.is_live(now, self.ttl))
            .cloned()
    }

    /// Resolve the username behind a token presented from `ip`.
    ///
    /// An ejected (but not banned) session is put back on the roster here.
    pub async fn validate(&self, token: &str, ip: &str) -> Option<Username> {
        let now = self.clock.now();
        let mut registry = self.registry.write().await;
        if self.ip_bans && registry.banned_ips.contains(ip) {
            return None;
        }

        let session = registry.sessions.get_mut(token)?;
        if !session.is_live(now, self.ttl) {
            return None;
        }

        let username = session.username.clone();
        if session.ejected {
            session.ejected = false;
            let (roles, session_ip) = (session.roles, session.ip.clone());
            self.game
                .add_participant(&username, roles.is_admin, roles.is_spectator, &session_ip)
                .await;
            tracing::info!(username = %username, "Ejected participant re-admitted");
        }
        Some(username)
    }

    pub async fn is_logged_in(&self, token: Option<&str>, ip: &str) -> bool {
        match token {
            Some(token) => self.validate(token, ip).await.is_some(),
            None => false,
        }
    }

    /// True if the token's session, the username or the address is banned
    pub async fn is_banned(&self, token: Option<&str>, username: Option<&str>, ip: &str) -> bool {
        let registry = self.registry.read().await;
        if let Some(session) = token.and_then(|t| registry.sessions.get(t)) {
            if session.banned {
                return true;
            }
        }
        if username.is_some_and(|u| registry.banned_users.contains(u)) {
            return true;
        }
        self.ip_bans && registry.banned_ips.contains(ip)
    }

    /// Bar a username for good and take them off the roster.
    ///
    /// The addresses the user played from are barred as well, except those
    /// shared with someone else's live session.
    pub async fn ban(&self, username: &str) -> bool {
        let now = self.clock.now();
        let mut registry = self.registry.write().await;
        let registry = &mut *registry;
        let newly_banned = registry.banned_users.insert(username.to_string());

        let mut addresses = HashSet::new();
        for session in registry.sessions.values_mut() {
            if session.username == username {
                session.banned = true;
                addresses.insert(session.ip.clone());
            }
        }
        let found = !addresses.is_empty();

        for ip in addresses {
            let shared = registry
                .sessions
                .values()
                .any(|s| s.ip == ip && s.username != username && s.is_live(now, self.ttl));
            if shared {
                tracing::info!(username, ip = %ip, "Address shared, not barring it");
            } else {
                registry.banned_ips.insert(ip);
            }
        }

        let removed = self.game.remove_participant(username).await.is_some();
        tracing::warn!(username, sessions = found, "Participant banned");
        newly_banned || found || removed
    }

    /// Take a participant off the roster but keep their session, so the
    /// next request they make puts them back
    pub async fn eject(&self, username: &str) -> bool {
        let mut registry = self.registry.write().await;
        let removed = self.game.remove_participant(username).await;

        let mut found = false;
        for session in registry
            .sessions
            .values_mut()
            .filter(|s| s.username == username && !s.banned)
        {
            session.ejected = true;
            if let Some(p) = &removed {
                session.roles = Roles::from(p);
            }
            found = true;
        }

        tracing::warn!(username, sessions = found, "Participant ejected");
        found || removed.is_some()
    }

    /// Log out: forget the session entirely
    pub async fn clear_session(&self, token: &str) -> Option<Session> {
        let removed = self.registry.write().await.sessions.remove(token);
        if let Some(s) = &removed {
            tracing::info!(username = %s.username, "Session cleared");
        }
        removed
    }

    /// Address of the live session holding `username`, if there is one
    pub async fn username_in_use(&self, username: &str) -> Option<String> {
        let now = self.clock.now();
        self.registry
            .read()
            .await
            .sessions
            .values()
            .find(|s| s.username == username && s.is_live(now, self.ttl))
            .map(|s| s.ip.clone())
    }

    /// Drop expired sessions. Banned ones stay so the flag keeps applying.
    pub async fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut registry = self.registry.write().await;
        let before = registry.sessions.len();
        registry
            .sessions
            .retain(|_, s| s.banned || !s.is_expired(now, self.ttl));
        before - registry.sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    pub async fn set_value(&self, token: &str, key: &str, value: serde_json::Value) -> bool {
        let now = self.clock.now();
        let mut registry = self.registry.write().await;
        match registry.sessions.get_mut(token) {
            Some(s) if s.is_live(now, self.ttl) => {
                s.values.insert(key.to_string(), value);
                true
            }
            _ => false,
        }
    }

    pub async fn get_value(&self, token: &str, key: &str) -> Option<serde_json::Value> {
        self.lookup(token).await?.values.get(key).cloned()
    }

    pub async fn remove_value(&self, token: &str, key: &str) -> bool {
        let now = self.clock.now();
        let mut registry = self.registry.write().await;
        match registry.sessions.get_mut(token) {
            Some(s) if s.is_live(now, self.ttl) => s.values.remove(key).is_some(),
            _ => false,
        }
    }
}
