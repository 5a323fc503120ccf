use chrono::Utc;
use dashmap::DashMap;

/// Live login session. Lost on restart; a token whose session is gone is refused.
#[derive(Debug, Clone)]
pub struct Session {
    pub employee_code: String,
    /// Unix seconds, same as the token's `exp`.
    pub exp: i64,
    /// Hash of the last attendance photo committed from this session.
    pub last_capture: Option<String>,
}

/// 会话缓存：sid -> Session
#[derive(Default)]
pub struct SessionCache {
    sessions: DashMap<String, Session>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expired sessions are dropped on every login.
    pub fn open(&self, sid: &str, employee_code: &str, exp: i64) {
        self.prune(Utc::now().timestamp());
        self.sessions.insert(
            sid.to_owned(),
            Session {
                employee_code: employee_code.to_owned(),
                exp,
                last_capture: None,
            },
        );
    }

    pub fn is_live(&self, sid: &str, employee_code: &str) -> bool {
        self.is_live_at(sid, employee_code, Utc::now().timestamp())
    }

    fn is_live_at(&self, sid: &str, employee_code: &str, now: i64) -> bool {
        self.sessions
            .get(sid)
            .is_some_and(|s| s.employee_code == employee_code && s.exp > now)
    }

    /// Removes sessions whose token has expired at `now`.
    pub fn prune(&self, now: i64) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.exp > now);
        before - self.sessions.len()
    }

    pub fn close(&self, sid: &str) -> bool {
        self.sessions.remove(sid).is_some()
    }

    /// Ends every session of `employee_code` except `keep`.
    pub fn close_others(&self, employee_code: &str, keep: &str) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|sid, s| sid == keep || s.employee_code != employee_code);
        before - self.sessions.len()
    }

    /// `true` when `hash` is the capture this session last committed.
    pub fn is_repeat_capture(&self, sid: &str, hash: &str) -> bool {
        self.sessions
            .get(sid)
            .is_some_and(|s| s.last_capture.as_deref() == Some(hash))
    }

    /// Called only after the punch carrying `hash` has been committed.
    pub fn record_capture(&self, sid: &str, hash: String) {
        if let Some(mut s) = self.sessions.get_mut(sid) {
            s.last_capture = Some(hash);
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    const LATER: i64 = i64::MAX;

    #[test]
    fn closed_sessions_are_not_live() {
        let cache = SessionCache::new();
        cache.open("s1", "AL0001", LATER);
        assert!(cache.is_live("s1", "AL0001"));
        assert!(!cache.is_live("s1", "AL0002"));
        assert!(cache.close("s1"));
        assert!(!cache.is_live("s1", "AL0001"));
        assert!(!cache.close("s1"));
    }

    #[test]
    fn capture_guard_is_per_session() {
        let cache = SessionCache::new();
        cache.open("s1", "AL0001", LATER);
        cache.open("s2", "AL0001", LATER);
        assert!(!cache.is_repeat_capture("s1", "h1"));
        cache.record_capture("s1", "h1".into());
        assert!(cache.is_repeat_capture("s1", "h1"));
        assert!(!cache.is_repeat_capture("s1", "h2"));
        assert!(!cache.is_repeat_capture("s2", "h1"));
    }

    #[test]
    fn password_change_ends_other_sessions() {
        let cache = SessionCache::new();
        cache.open("s1", "AL0001", LATER);
        cache.open("s2", "AL0001", LATER);
        cache.open("s3", "AL0002", LATER);
        assert_eq!(cache.close_others("AL0001", "s1"), 1);
        assert!(cache.is_live("s1", "AL0001"));
        assert!(!cache.is_live("s2", "AL0001"));
        assert!(cache.is_live("s3", "AL0002"));
    }

    #[test]
    fn expired_sessions_are_refused_and_pruned() {
        let cache = SessionCache::new();
        let now = Utc::now().timestamp();
        cache.open("old", "AL0001", now - 10);
        assert!(!cache.is_live("old", "AL0001"));
        assert!(cache.is_live_at("old", "AL0001", now - 20));
        cache.open("new", "AL0001", now + 3600);
        assert_eq!(cache.sessions.len(), 1);
        assert!(cache.is_live("new", "AL0001"));
        assert_eq!(cache.prune(now + 3600), 1);
        assert!(cache.sessions.is_empty());
    }
}
