use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use base64::Engine;
use crate::tprintln;

pub type SessionToken = String;

/// Provider-issued proof of authentication for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub token: SessionToken,
    pub identity_id: String,
    pub email: String,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl Session {
    pub fn is_expired(&self) -> bool { self.expires_at <= Instant::now() }

    pub fn expires_in(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

fn gen_id() -> String {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    let _ = getrandom::getrandom(&mut buf);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf)
}

/// Token table owned by the identity directory.
pub struct SessionManager {
    pub ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, Session>>,
    user_index: RwLock<HashMap<String, HashSet<SessionToken>>>,
    /// Retired tokens, kept until the expiry they were issued with.
    revoked: RwLock<HashMap<SessionToken, Instant>>,
}

impl Default for SessionManager {
    fn default() -> Self { Self::with_ttl(Duration::from_secs(60 * 60)) }
}

impl SessionManager {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
            user_index: RwLock::new(HashMap::new()),
            revoked: RwLock::new(HashMap::new()),
        }
    }

    pub fn issue(&self, identity_id: &str, email: &str) -> Session {
        let now = Instant::now();
        let sess = Session {
            session_id: gen_id(),
            token: gen_id(),
            identity_id: identity_id.to_string(),
            email: email.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        self.sessions.write().insert(sess.token.clone(), sess.clone());
        self.user_index
            .write()
            .entry(identity_id.to_string())
            .or_default()
            .insert(sess.token.clone());
        tprintln!("session.issue identity={} sid={} ttl_secs={}", identity_id, sess.session_id, self.ttl.as_secs());
        sess
    }

    pub fn validate(&self, token: &str) -> Option<Session> {
        if self.revoked.read().contains_key(token) { return None; }
        let mut expired = false;
        let out = {
            let map = self.sessions.read();
            match map.get(token) {
                Some(s) if !s.is_expired() => Some(s.clone()),
                Some(_) => { expired = true; None }
                None => None,
            }
        };
        if expired {
            self.drop_token(token);
        }
        out
    }

    /// Rotate the token of a live session and extend its expiry.
    pub fn refresh(&self, token: &str) -> Option<Session> {
        let old = self.validate(token)?;
        let retired_until = old.expires_at;
        let now = Instant::now();
        let fresh = Session { token: gen_id(), issued_at: now, expires_at: now + self.ttl, ..old };
        {
            let mut map = self.sessions.write();
            map.remove(token);
            map.insert(fresh.token.clone(), fresh.clone());
        }
        {
            let mut idx = self.user_index.write();
            let set = idx.entry(fresh.identity_id.clone()).or_default();
            set.remove(token);
            set.insert(fresh.token.clone());
        }
        self.revoked.write().insert(token.to_string(), retired_until);
        tprintln!("session.refresh identity={} sid={}", fresh.identity_id, fresh.session_id);
        Some(fresh)
    }

    pub fn logout(&self, token: &str) -> bool {
        match self.drop_token(token) {
            Some(sess) => {
                self.revoked.write().insert(sess.token, sess.expires_at);
                true
            }
            None => false,
        }
    }

    pub fn revoke_identity(&self, identity_id: &str) -> Vec<SessionToken> {
        let tokens: Vec<SessionToken> = self
            .user_index
            .write()
            .remove(identity_id)
            .map(|s| s.into_iter().collect())
            .unwrap_or_default();
        {
            let mut s = self.sessions.write();
            let mut r = self.revoked.write();
            for t in tokens.iter() {
                if let Some(sess) = s.remove(t) {
                    r.insert(t.clone(), sess.expires_at);
                }
            }
        }
        tprintln!("session.revoke identity={} count={}", identity_id, tokens.len());
        tokens
    }

    /// Remove every expired session, returning what was dropped. Revoked
    /// tokens past their original expiry are forgotten too.
    pub fn purge_expired(&self) -> Vec<Session> {
        let now = Instant::now();
        self.revoked.write().retain(|_, until| *until > now);
        let expired: Vec<SessionToken> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.is_expired())
            .map(|s| s.token.clone())
            .collect();
        expired.iter().filter_map(|t| self.drop_token(t)).collect()
    }

    pub fn active_count(&self) -> usize { self.sessions.read().len() }

    pub fn revoked_count(&self) -> usize { self.revoked.read().len() }

    fn drop_token(&self, token: &str) -> Option<Session> {
        let sess = self.sessions.write().remove(token)?;
        if let Some(set) = self.user_index.write().get_mut(&sess.identity_id) {
            set.remove(token);
        }
        Some(sess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_validate_logout() {
        let sm = SessionManager::default();
        let s = sm.issue("p1", "jane@example.com");
        assert_eq!(sm.validate(&s.token).map(|v| v.identity_id), Some("p1".to_string()));
        assert!(sm.logout(&s.token));
        assert!(sm.validate(&s.token).is_none());
        assert!(!sm.logout(&s.token));
    }

    #[test]
    fn zero_ttl_sessions_expire_immediately() {
        let sm = SessionManager::with_ttl(Duration::ZERO);
        let s = sm.issue("p1", "jane@example.com");
        assert!(s.is_expired());
        assert!(sm.validate(&s.token).is_none());
        assert_eq!(sm.active_count(), 0);
    }

    #[test]
    fn refresh_rotates_token() {
        let sm = SessionManager::default();
        let s = sm.issue("d1", "dr.johnson@example.com");
        let fresh = sm.refresh(&s.token).expect("live session");
        assert_ne!(fresh.token, s.token);
        assert_eq!(fresh.session_id, s.session_id);
        assert!(sm.validate(&s.token).is_none());
        assert!(sm.validate(&fresh.token).is_some());
    }

    #[test]
    fn revoke_identity_drops_all_tokens() {
        let sm = SessionManager::default();
        let a = sm.issue("p1", "jane@example.com");
        let b = sm.issue("p1", "jane@example.com");
        let other = sm.issue("p2", "robert@example.com");
        let revoked = sm.revoke_identity("p1");
        assert_eq!(revoked.len(), 2);
        assert!(sm.validate(&a.token).is_none());
        assert!(sm.validate(&b.token).is_none());
        assert!(sm.validate(&other.token).is_some());
    }

    #[test]
    fn purge_expired_returns_dropped_sessions() {
        let sm = SessionManager::with_ttl(Duration::ZERO);
        sm.issue("p1", "jane@example.com");
        sm.issue("p2", "robert@example.com");
        assert_eq!(sm.purge_expired().len(), 2);
        assert_eq!(sm.active_count(), 0);
    }

    #[test]
    fn purge_forgets_revoked_tokens_once_they_would_have_expired() {
        let sm = SessionManager::with_ttl(Duration::from_millis(300));
        let a = sm.issue("p1", "jane@example.com");
        let b = sm.issue("p2", "robert@example.com");
        let fresh = sm.refresh(&b.token).expect("live session");
        assert!(sm.logout(&a.token));
        assert_eq!(sm.revoked_count(), 2);

        // Still within the original lifetime: retired tokens stay blocked.
        sm.purge_expired();
        assert_eq!(sm.revoked_count(), 2);
        assert!(sm.validate(&b.token).is_none());

        std::thread::sleep(Duration::from_millis(350));
        sm.purge_expired();
        assert_eq!(sm.revoked_count(), 0);
        assert!(sm.validate(&a.token).is_none());
        assert!(sm.validate(&fresh.token).is_none());
    }
}
