use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::principal::UserRecord;
use crate::messages::Messages;
use crate::tprintln;

/// Per-browser state kept between requests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionData {
    #[serde(default)]
    pub region_endpoint: Option<String>,
    #[serde(default)]
    pub region_name: Option<String>,
    /// Id of the unscoped token obtained at login; used for tenant listing and switching.
    #[serde(default)]
    pub unscoped_token: Option<String>,
    #[serde(default)]
    pub user: Option<UserRecord>,
    pub csrf_token: String,
    #[serde(default)]
    pub messages: Messages,
}

impl SessionData {
    /// Empty session with a fresh CSRF token. If the random source fails the token
    /// stays empty, which `validate_csrf` rejects.
    pub fn new() -> Self {
        Self { csrf_token: gen_id().unwrap_or_default(), ..Default::default() }
    }

    /// Replace the CSRF token, as done whenever the session changes hands.
    pub fn rotate_csrf(&mut self) -> Result<(), getrandom::Error> {
        self.csrf_token = gen_id()?;
        Ok(())
    }

    /// Drop everything tied to the logged-in identity. Region choice, CSRF token
    /// and pending messages survive so the next page can explain what happened.
    pub fn clear_auth(&mut self) {
        self.user = None;
        self.unscoped_token = None;
    }

    /// Forget everything and start over with a fresh CSRF token.
    pub fn flush(&mut self) {
        *self = SessionData::new();
    }
}

#[derive(Debug)]
struct SessionEntry {
    data: SessionData,
    expires_at: Instant,
}

pub(crate) fn gen_id() -> Result<String, getrandom::Error> {
    // 256-bit random token base64url without padding
    let mut buf = [0u8; 32];
    getrandom::getrandom(&mut buf)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

/// In-process session store keyed by the session cookie value.
#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<RwLock<HashMap<String, SessionEntry>>>,
    pub ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self { Self::new(Duration::from_secs(60 * 60)) }
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), ttl }
    }

    /// Start a new empty session and return its id.
    pub fn create(&self) -> Result<(String, SessionData), getrandom::Error> {
        let data = SessionData::new();
        let sid = self.insert(data.clone())?;
        Ok((sid, data))
    }

    fn insert(&self, data: SessionData) -> Result<String, getrandom::Error> {
        let sid = gen_id()?;
        self.entries.write().insert(sid.clone(), SessionEntry { data, expires_at: Instant::now() + self.ttl });
        tprintln!("session.create ttl_secs={} live={}", self.ttl.as_secs(), self.len());
        Ok(sid)
    }

    /// Move `data` to a fresh id and drop `old_sid`. The old cookie stops working.
    pub fn cycle(&self, old_sid: &str, data: SessionData) -> Result<String, getrandom::Error> {
        let sid = self.insert(data)?;
        self.destroy(old_sid);
        Ok(sid)
    }

    /// Snapshot of a live session; expired sessions are dropped on sight.
    pub fn load(&self, sid: &str) -> Option<SessionData> {
        let now = Instant::now();
        let mut expired = false;
        let out = {
            let map = self.entries.read();
            match map.get(sid) {
                Some(ent) if ent.expires_at > now => Some(ent.data.clone()),
                Some(_) => { expired = true; None }
                None => None,
            }
        };
        if expired {
            self.entries.write().remove(sid);
            tracing::debug!(target: "session", "session expired");
        }
        out
    }

    /// Store `data` under `sid` and push its expiry out by one TTL. Only live
    /// sessions are updated; an id destroyed meanwhile stays gone. Returns whether
    /// the session was still live.
    pub fn save(&self, sid: &str, data: SessionData) -> bool {
        let expires_at = Instant::now() + self.ttl;
        match self.entries.write().get_mut(sid) {
            Some(ent) => {
                ent.data = data;
                ent.expires_at = expires_at;
                true
            }
            None => false,
        }
    }

    pub fn destroy(&self, sid: &str) -> bool {
        self.entries.write().remove(sid).is_some()
    }

    /// Remove expired sessions; returns how many were dropped.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut map = self.entries.write();
        let before = map.len();
        map.retain(|_, ent| ent.expires_at > now);
        before - map.len()
    }

    pub fn len(&self) -> usize { self.entries.read().len() }
    pub fn is_empty(&self) -> bool { self.entries.read().is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_load_save_destroy() {
        let store = SessionStore::default();
        let (sid, mut data) = store.create().unwrap();
        assert!(!data.csrf_token.is_empty());
        data.region_name = Some("East".into());
        assert!(store.save(&sid, data.clone()));
        assert_eq!(store.load(&sid), Some(data));
        assert!(store.destroy(&sid));
        assert_eq!(store.load(&sid), None);
    }

    #[test]
    fn save_does_not_revive_destroyed_session() {
        let store = SessionStore::default();
        let (sid, mut data) = store.create().unwrap();
        data.unscoped_token = Some("tok".into());
        store.destroy(&sid);
        assert!(!store.save(&sid, data));
        assert_eq!(store.load(&sid), None);
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_ids_are_never_inserted_by_save() {
        let store = SessionStore::default();
        assert!(!store.save("made-up", SessionData::new()));
        assert!(store.is_empty());
    }

    #[test]
    fn cycle_moves_data_to_new_id() {
        let store = SessionStore::default();
        let (old, mut data) = store.create().unwrap();
        data.region_name = Some("East".into());
        let new = store.cycle(&old, data.clone()).unwrap();
        assert_ne!(new, old);
        assert_eq!(store.load(&old), None);
        assert_eq!(store.load(&new), Some(data));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn rotate_csrf_changes_token() {
        let mut d = SessionData::new();
        let before = d.csrf_token.clone();
        d.rotate_csrf().unwrap();
        assert_ne!(d.csrf_token, before);
        assert!(!d.csrf_token.is_empty());
    }

    #[test]
    fn expired_sessions_are_not_loaded() {
        let store = SessionStore::new(Duration::from_millis(0));
        let (sid, _) = store.create().unwrap();
        assert_eq!(store.load(&sid), None);
        assert!(store.is_empty());
        let (_sid2, _) = store.create().unwrap();
        assert_eq!(store.sweep(), 1);
    }

    #[test]
    fn clear_auth_keeps_region_and_messages() {
        let mut d = SessionData::new();
        let csrf = d.csrf_token.clone();
        d.region_endpoint = Some("http://ks/v2.0".into());
        d.unscoped_token = Some("tok".into());
        d.messages.error("bad");
        d.clear_auth();
        assert_eq!(d.unscoped_token, None);
        assert_eq!(d.region_endpoint.as_deref(), Some("http://ks/v2.0"));
        assert_eq!(d.messages.len(), 1);
        assert_eq!(d.csrf_token, csrf);
        d.flush();
        assert_eq!(d.region_endpoint, None);
        assert_ne!(d.csrf_token, csrf);
    }
}
