// BSD 3-Clause License
// Copyright (c) 2025, LABGATE
//
//! Per-browser-session credential and connection state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::store::{MemoryStore, SessionStore};
use super::types::{Session, SessionRecord, UpstreamToken};
use crate::scenario::{CommandResult, ScenarioAction};
use crate::security::short_id;

/// Timestamps further in the future than this are considered corrupt.
const CLOCK_SKEW_ALLOWANCE_SECS: i64 = 1;

/// Session and token bookkeeping on top of a [`SessionStore`].
///
/// Unknown session ids are never an error: reads return `None` and writes
/// are dropped.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    idle_timeout: chrono::Duration,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, idle_timeout: Duration) -> Self {
        Self {
            store,
            idle_timeout: chrono::Duration::from_std(idle_timeout)
                .unwrap_or_else(|_| chrono::Duration::days(365 * 100)),
        }
    }

    pub fn in_memory(idle_timeout: Duration) -> Self {
        Self::new(Arc::new(MemoryStore::new()), idle_timeout)
    }

    pub fn idle_timeout(&self) -> chrono::Duration {
        self.idle_timeout
    }

    /// Start a fresh session under `id`, replacing any existing record.
    pub fn create(&self, id: &str) -> Session {
        let record = SessionRecord::new(id);
        let session = record.session.clone();
        self.store.set(record);
        info!("Created new session: {}...", short_id(id));
        info!(target: "security", "SESSION_CREATED: {}", id);
        session
    }

    pub fn get(&self, id: &str) -> Option<Session> {
        let session = self.store.get(id).map(|r| r.session);
        if session.is_none() {
            debug!("Session not found: {}...", short_id(id));
        }
        session
    }

    pub fn exists(&self, id: &str) -> bool {
        self.store.get(id).is_some()
    }

    /// Refresh the last-activity timestamp.
    pub fn touch(&self, id: &str) -> bool {
        let now = Utc::now();
        self.store
            .update(id, &mut |record| record.session.last_activity = now)
    }

    /// Store the role's token, returning the one it replaced so the caller
    /// can invalidate it upstream. Unknown sessions drop the token.
    pub fn store_token(
        &self,
        id: &str,
        role: &str,
        token: UpstreamToken,
    ) -> Option<UpstreamToken> {
        let mut token = Some(token);
        let mut replaced = None;
        let stored = self.store.update(id, &mut |record| {
            if let Some(token) = token.take() {
                replaced = record.tokens.insert(role.to_string(), token);
            }
        });
        if stored {
            info!("Stored token for {} in session {}...", role, short_id(id));
            info!(target: "security", "TOKEN_STORED: session={}, role={}", id, role);
        } else {
            debug!("Dropped token for {}: session {}... unknown", role, short_id(id));
        }
        replaced
    }

    pub fn get_token(&self, id: &str, role: &str) -> Option<UpstreamToken> {
        self.store
            .get(id)
            .and_then(|mut record| record.tokens.remove(role))
    }

    pub fn remove_token(&self, id: &str, role: &str) -> Option<UpstreamToken> {
        let mut removed = None;
        self.store
            .update(id, &mut |record| removed = record.tokens.remove(role));
        if removed.is_some() {
            info!("Removed token for {} in session {}...", role, short_id(id));
            info!(target: "security", "TOKEN_REMOVED: session={}, role={}", id, role);
        }
        removed
    }

    /// Mark a role as connected. Returns `true` only when the role was not
    /// already connected.
    pub fn add_connection(&self, id: &str, role: &str) -> bool {
        let mut added = false;
        self.store.update(id, &mut |record| {
            added = record.session.active_connections.insert(role.to_string());
        });
        if added {
            info!("Added active connection {} to session {}...", role, short_id(id));
            info!(target: "security", "CONNECTION_ADDED: session={}, role={}", id, role);
        }
        added
    }

    pub fn remove_connection(&self, id: &str, role: &str) -> bool {
        let mut removed = false;
        self.store.update(id, &mut |record| {
            removed = record.session.active_connections.remove(role);
        });
        if removed {
            info!("Removed active connection {} from session {}...", role, short_id(id));
            info!(target: "security", "CONNECTION_REMOVED: session={}, role={}", id, role);
        }
        removed
    }

    pub fn active_connections(&self, id: &str) -> Vec<String> {
        self.get(id)
            .map(|s| s.active_connections.into_iter().collect())
            .unwrap_or_default()
    }

    /// Cache the latest result of a scenario action on the session.
    pub fn record_result(
        &self,
        id: &str,
        scenario: &str,
        action: ScenarioAction,
        result: CommandResult,
    ) -> bool {
        let mut result = Some(result);
        self.store.update(id, &mut |record| {
            if let Some(result) = result.take() {
                record
                    .session
                    .scenario_results
                    .entry(scenario.to_string())
                    .or_default()
                    .insert(action, result);
            }
        })
    }

    /// Clear tokens, connections and cached results in one step. Returns the
    /// tokens that were dropped so the caller can invalidate them upstream.
    pub fn reset(&self, id: &str) -> Vec<(String, UpstreamToken)> {
        let mut tokens = Vec::new();
        self.store.update(id, &mut |record| {
            tokens = record.tokens.drain().collect();
            record.session.active_connections.clear();
            record.session.scenario_results.clear();
        });
        if !tokens.is_empty() {
            info!(target: "security", "SESSION_RESET: session={}, tokens={}", id, tokens.len());
        }
        tokens
    }

    /// Remove every session idle for longer than the timeout.
    pub fn sweep_expired(&self) -> Vec<SessionRecord> {
        self.sweep_expired_at(Utc::now())
    }

    pub fn sweep_expired_at(&self, now: DateTime<Utc>) -> Vec<SessionRecord> {
        let timeout = self.idle_timeout;
        let expired = self
            .store
            .sweep(&|record| is_expired(&record.session, now, timeout));

        for record in &expired {
            info!("Cleaned up expired session: {}...", short_id(record.id()));
            info!(target: "security", "SESSION_EXPIRED: {}", record.id());
        }
        if !expired.is_empty() {
            info!("Cleaned up {} expired sessions", expired.len());
        }
        expired
    }

    pub fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> =
            self.store.list().into_iter().map(|r| r.session).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        sessions
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

fn is_expired(session: &Session, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
    let age = now.signed_duration_since(session.last_activity);
    if age < -chrono::Duration::seconds(CLOCK_SKEW_ALLOWANCE_SECS) {
        warn!(
            "Session {}... has last_activity in the future, treating as expired",
            short_id(&session.id)
        );
        return true;
    }
    age > timeout
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn manager(timeout_secs: u64) -> SessionManager {
        SessionManager::in_memory(Duration::from_secs(timeout_secs))
    }

    fn backdate(manager: &SessionManager, id: &str, secs: i64) {
        manager.store.update(id, &mut |record| {
            record.session.last_activity = Utc::now() - chrono::Duration::seconds(secs);
        });
    }

    #[test]
    fn test_create_and_get() {
        let m = manager(60);
        let session = m.create("s1");
        assert_eq!(session.id, "s1");
        assert!(session.active_connections.is_empty());
        assert!(m.get("s1").is_some());
        assert!(m.get("s2").is_none());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn test_add_connection_is_idempotent() {
        let m = manager(60);
        m.create("s1");
        assert!(m.add_connection("s1", "victim"));
        assert!(!m.add_connection("s1", "victim"));
        assert!(!m.add_connection("s1", "victim"));
        assert!(m.add_connection("s1", "attacker"));
        assert_eq!(m.active_connections("s1"), vec!["attacker", "victim"]);
    }

    #[test]
    fn test_concurrent_add_connection_no_duplicates() {
        let m = Arc::new(manager(60));
        m.create("s1");

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let m = m.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.add_connection("s1", "victim");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(m.active_connections("s1"), vec!["victim"]);
    }

    #[test]
    fn test_unknown_session_is_noop() {
        let m = manager(60);
        assert!(!m.touch("ghost"));
        assert!(m.store_token("ghost", "victim", UpstreamToken::new("t", "mysql")).is_none());
        assert!(m.get_token("ghost", "victim").is_none());
        assert!(m.remove_token("ghost", "victim").is_none());
        assert!(!m.add_connection("ghost", "victim"));
        assert!(!m.remove_connection("ghost", "victim"));
        assert!(m.reset("ghost").is_empty());
        assert!(m.is_empty());
    }

    #[test]
    fn test_store_token_returns_replaced() {
        let m = manager(60);
        m.create("s1");
        assert!(m.store_token("s1", "victim", UpstreamToken::new("first", "mysql")).is_none());
        let replaced = m.store_token("s1", "victim", UpstreamToken::new("second", "mysql"));
        assert_eq!(replaced.map(|t| t.token).as_deref(), Some("first"));
        assert_eq!(m.get_token("s1", "victim").unwrap().token, "second");
    }

    #[test]
    fn test_token_lifecycle() {
        let m = manager(60);
        m.create("s1");
        m.store_token("s1", "victim", UpstreamToken::new("abc", "mysql"));

        assert_eq!(m.get_token("s1", "victim").unwrap().token, "abc");
        assert!(m.get_token("s1", "attacker").is_none());

        let removed = m.remove_token("s1", "victim").unwrap();
        assert_eq!(removed.token, "abc");
        assert!(m.get_token("s1", "victim").is_none());
        assert!(m.remove_token("s1", "victim").is_none());
    }

    #[test]
    fn test_reset_returns_tokens() {
        let m = manager(60);
        m.create("s1");
        m.store_token("s1", "victim", UpstreamToken::new("a", "mysql"));
        m.store_token("s1", "attacker", UpstreamToken::new("b", "mysql"));
        m.add_connection("s1", "victim");
        m.record_result("s1", "apt28-part1", ScenarioAction::Start, CommandResult::timed_out(5));

        let mut tokens = m.reset("s1");
        tokens.sort_by(|a, b| a.0.cmp(&b.0));
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].0, "attacker");

        let session = m.get("s1").unwrap();
        assert!(session.active_connections.is_empty());
        assert!(session.scenario_results.is_empty());
        assert!(m.get_token("s1", "victim").is_none());
    }

    #[test]
    fn test_sweep_expired() {
        let m = manager(60);
        m.create("fresh");
        m.create("stale");
        m.create("ancient");
        m.store_token("stale", "victim", UpstreamToken::new("t", "mysql"));
        backdate(&m, "stale", 61);
        backdate(&m, "ancient", 3 * 24 * 3600);

        let now = Utc::now();
        let removed = m.sweep_expired_at(now);
        let mut ids: Vec<&str> = removed.iter().map(|r| r.id()).collect();
        ids.sort();
        assert_eq!(ids, vec!["ancient", "stale"]);

        // Tokens leave with the record.
        let stale = removed.iter().find(|r| r.id() == "stale").unwrap();
        assert!(stale.tokens.contains_key("victim"));
        assert!(m.get_token("stale", "victim").is_none());

        for session in m.list() {
            assert!(now.signed_duration_since(session.last_activity) <= m.idle_timeout());
        }
    }

    #[test]
    fn test_sweep_treats_future_timestamp_as_expired() {
        let m = manager(60);
        m.create("skewed");
        backdate(&m, "skewed", -3600);
        let removed = m.sweep_expired();
        assert_eq!(removed.len(), 1);
        assert!(m.is_empty());
    }

    #[test]
    fn test_touch_keeps_session_alive() {
        let m = manager(60);
        m.create("s1");
        backdate(&m, "s1", 120);
        assert!(m.touch("s1"));
        assert!(m.sweep_expired().is_empty());
    }
}
