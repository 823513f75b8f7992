//! Session store: one ordered message log per session id.
//!
//! The map lock is held only for lookup and insertion. Each session carries
//! its own async mutex, which the orchestrator holds for a whole submission
//! so that submissions to one session are serialized while different
//! sessions proceed in parallel.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use docqa_core::config::SessionConfig;
use docqa_core::types::{Message, Role};
use tracing::{debug, info, warn};

use crate::error::ChatError;
use crate::types::SessionSummary;

/// When sessions may be dropped. `None` means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub idle_timeout: Option<Duration>,
    pub max_sessions: Option<usize>,
}

impl ExpiryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            idle_timeout: (config.idle_timeout_minutes > 0)
                .then(|| Duration::from_secs(config.idle_timeout_minutes * 60)),
            max_sessions: (config.max_sessions > 0).then_some(config.max_sessions),
        }
    }
}

/// The conversation log of one session.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            messages: Vec::new(),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Append with the next position. Messages are never reordered or removed.
    fn push(&mut self, role: Role, content: &str) -> Message {
        let mut message = Message::new(role, content);
        message.position = self.messages.len() as u64;
        self.last_active_at = message.created_at;
        self.messages.push(message.clone());
        message
    }
}

#[derive(Debug, Clone, Copy)]
struct Activity {
    last_active: Instant,
    last_active_at: DateTime<Utc>,
    message_count: usize,
}

/// Shared handle to one session. Cloning the `Arc` never copies the log.
#[derive(Debug)]
pub struct SessionHandle {
    session_id: String,
    created_at: DateTime<Utc>,
    log: tokio::sync::Mutex<Session>,
    activity: Mutex<Activity>,
}

impl SessionHandle {
    fn new(session_id: &str) -> Self {
        let session = Session::new(session_id);
        Self {
            session_id: session_id.to_string(),
            created_at: session.created_at,
            activity: Mutex::new(Activity {
                last_active: Instant::now(),
                last_active_at: session.last_active_at,
                message_count: 0,
            }),
            log: tokio::sync::Mutex::new(session),
        }
    }

    /// Acquire exclusive access to the log, waiting for any submission in
    /// flight on this session.
    pub async fn lock(&self) -> SessionGuard<'_> {
        let guard = self.log.lock().await;
        self.touch(None);
        SessionGuard {
            handle: self,
            session: guard,
        }
    }

    /// Whether a submission currently holds this session.
    pub fn is_busy(&self) -> bool {
        self.log.try_lock().is_err()
    }

    /// Whether anyone outside the store holds or is waiting for this
    /// session. Handles are only cloned under the map lock, so the count is
    /// exact while that lock is held.
    fn in_use(self: &Arc<Self>) -> bool {
        Arc::strong_count(self) > 1 || self.is_busy()
    }

    pub fn summary(&self) -> SessionSummary {
        let activity = self.activity();
        SessionSummary {
            session_id: self.session_id.clone(),
            message_count: activity.message_count,
            created_at: self.created_at,
            last_active_at: activity.last_active_at,
        }
    }

    fn activity(&self) -> Activity {
        match self.activity.lock() {
            Ok(a) => *a,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn touch(&self, message_count: Option<usize>) {
        let mut activity = match self.activity.lock() {
            Ok(a) => a,
            Err(poisoned) => poisoned.into_inner(),
        };
        activity.last_active = Instant::now();
        activity.last_active_at = Utc::now();
        if let Some(count) = message_count {
            activity.message_count = count;
        }
    }
}

/// Exclusive access to a session log.
pub struct SessionGuard<'a> {
    handle: &'a SessionHandle,
    session: tokio::sync::MutexGuard<'a, Session>,
}

impl SessionGuard<'_> {
    pub fn messages(&self) -> &[Message] {
        &self.session.messages
    }

    pub fn append(&mut self, role: Role, content: &str) -> Message {
        let message = self.session.push(role, content);
        self.handle.touch(Some(self.session.messages.len()));
        message
    }

    /// Append a user turn followed by its assistant turn.
    pub fn append_exchange(&mut self, question: &str, answer: &str) -> (Message, Message) {
        let user = self.session.push(Role::User, question);
        let assistant = self.session.push(Role::Assistant, answer);
        self.handle.touch(Some(self.session.messages.len()));
        (user, assistant)
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Arc<SessionHandle>>>,
    policy: ExpiryPolicy,
}

impl SessionStore {
    pub fn new(policy: ExpiryPolicy) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            policy,
        }
    }

    fn map(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<SessionHandle>>>, ChatError> {
        self.sessions
            .lock()
            .map_err(|e| ChatError::Storage(format!("session map lock poisoned: {}", e)))
    }

    /// Return the session for `session_id`, creating it on first reference.
    ///
    /// Repeated calls return the same handle until the session is deleted or
    /// evicted.
    pub fn get_or_create(&self, session_id: &str) -> Result<Arc<SessionHandle>, ChatError> {
        let mut sessions = self.map()?;
        if let Some(handle) = sessions.get(session_id) {
            return Ok(Arc::clone(handle));
        }

        if let Some(max) = self.policy.max_sessions {
            while sessions.len() >= max {
                match least_recently_active(&sessions) {
                    Some(victim) => {
                        sessions.remove(&victim);
                        info!(session_id = %victim, "Evicted least recently active session");
                    }
                    None => {
                        warn!(max, "Session limit reached but every session is busy");
                        break;
                    }
                }
            }
        }

        let handle = Arc::new(SessionHandle::new(session_id));
        sessions.insert(session_id.to_string(), Arc::clone(&handle));
        debug!(session_id, "Created session");
        Ok(handle)
    }

    pub fn get(&self, session_id: &str) -> Result<Option<Arc<SessionHandle>>, ChatError> {
        Ok(self.map()?.get(session_id).cloned())
    }

    /// Append one message, creating the session if needed.
    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, ChatError> {
        let handle = self.get_or_create(session_id)?;
        let mut guard = handle.lock().await;
        Ok(guard.append(role, content))
    }

    /// Ordered messages of an existing session.
    pub async fn transcript(&self, session_id: &str) -> Result<Vec<Message>, ChatError> {
        let handle = self
            .get(session_id)?
            .ok_or_else(|| ChatError::SessionNotFound(session_id.to_string()))?;
        let guard = handle.lock().await;
        Ok(guard.messages().to_vec())
    }

    /// Summaries ordered by most recent activity first.
    pub fn list(&self) -> Result<Vec<SessionSummary>, ChatError> {
        let mut summaries: Vec<SessionSummary> =
            self.map()?.values().map(|h| h.summary()).collect();
        summaries.sort_by(|a, b| {
            b.last_active_at
                .cmp(&a.last_active_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(summaries)
    }

    /// Remove a session. Returns `false` for an unknown id and
    /// `SessionBusy` while a submission holds or is waiting for it.
    pub fn delete(&self, session_id: &str) -> Result<bool, ChatError> {
        let mut sessions = self.map()?;
        match sessions.get(session_id) {
            None => return Ok(false),
            Some(handle) if handle.in_use() => {
                return Err(ChatError::SessionBusy(session_id.to_string()));
            }
            Some(_) => {}
        }
        sessions.remove(session_id);
        info!(session_id, "Deleted session");
        Ok(true)
    }

    /// Drop sessions idle longer than the policy allows. Busy sessions are
    /// kept. Returns how many were removed.
    pub fn evict_expired(&self) -> Result<usize, ChatError> {
        let Some(idle_timeout) = self.policy.idle_timeout else {
            return Ok(0);
        };
        let mut sessions = self.map()?;
        let before = sessions.len();
        sessions.retain(|_, handle| {
            handle.in_use() || handle.activity().last_active.elapsed() <= idle_timeout
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            info!(evicted, remaining = sessions.len(), "Evicted idle sessions");
        }
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        self.map().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn least_recently_active(sessions: &HashMap<String, Arc<SessionHandle>>) -> Option<String> {
    sessions
        .iter()
        .filter(|(_, h)| !h.in_use())
        .min_by_key(|(_, h)| h.activity().last_active)
        .map(|(id, _)| id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Identity ----

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SessionStore::default();
        let a = store.get_or_create("s1").unwrap();
        let b = store.get_or_create("s1").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_distinct_ids_distinct_sessions() {
        let store = SessionStore::default();
        let a = store.get_or_create("s1").unwrap();
        let b = store.get_or_create("s2").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 2);
    }

    // ---- Append ----

    #[tokio::test]
    async fn test_append_assigns_positions() {
        let store = SessionStore::default();
        let m0 = store.append("s", Role::User, "q1").await.unwrap();
        let m1 = store.append("s", Role::Assistant, "a1").await.unwrap();
        assert_eq!(m0.position, 0);
        assert_eq!(m1.position, 1);

        let transcript = store.transcript("s").await.unwrap();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "q1");
        assert_eq!(transcript[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_no_cross_session_visibility() {
        let store = SessionStore::default();
        store.append("a", Role::User, "only in a").await.unwrap();
        store.get_or_create("b").unwrap();
        assert!(store.transcript("b").await.unwrap().is_empty());
        assert_eq!(store.transcript("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_exchange_updates_summary() {
        let store = SessionStore::default();
        let handle = store.get_or_create("s").unwrap();
        {
            let mut guard = handle.lock().await;
            let (u, a) = guard.append_exchange("q", "a");
            assert_eq!((u.position, a.position), (0, 1));
            assert_eq!(u.role, Role::User);
            assert_eq!(a.role, Role::Assistant);
        }
        let summaries = store.list().unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].message_count, 2);
    }

    #[tokio::test]
    async fn test_transcript_unknown_session() {
        let store = SessionStore::default();
        assert!(matches!(
            store.transcript("nope").await,
            Err(ChatError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_appends_to_one_session() {
        let store = Arc::new(SessionStore::default());
        let mut tasks = Vec::new();
        for i in 0..50 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                store.append("shared", Role::User, &format!("m{i}")).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }
        let transcript = store.transcript("shared").await.unwrap();
        assert_eq!(transcript.len(), 50);
        for (i, m) in transcript.iter().enumerate() {
            assert_eq!(m.position, i as u64);
        }
    }

    // ---- Busy tracking ----

    #[tokio::test]
    async fn test_is_busy_while_locked() {
        let store = SessionStore::default();
        let handle = store.get_or_create("s").unwrap();
        assert!(!handle.is_busy());
        let guard = handle.lock().await;
        assert!(handle.is_busy());
        drop(guard);
        assert!(!handle.is_busy());
    }

    // ---- List / delete ----

    #[tokio::test]
    async fn test_list_most_recent_first() {
        let store = SessionStore::default();
        store.append("old", Role::User, "x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append("new", Role::User, "y").await.unwrap();
        let ids: Vec<_> = store.list().unwrap().into_iter().map(|s| s.session_id).collect();
        assert_eq!(ids, vec!["new", "old"]);
    }

    #[test]
    fn test_delete() {
        let store = SessionStore::default();
        let first = Arc::downgrade(&store.get_or_create("s").unwrap());
        assert!(store.delete("s").unwrap());
        assert!(!store.delete("s").unwrap());
        assert!(store.get("s").unwrap().is_none());
        assert!(first.upgrade().is_none());

        let second = store.get_or_create("s").unwrap();
        assert_eq!(Arc::strong_count(&second), 2);
    }

    #[tokio::test]
    async fn test_delete_refuses_locked_session() {
        let store = SessionStore::default();
        let handle = store.get_or_create("s").unwrap();
        let guard = handle.lock().await;
        assert!(matches!(store.delete("s"), Err(ChatError::SessionBusy(_))));
        drop(guard);
        drop(handle);
        assert!(store.delete("s").unwrap());
    }

    #[tokio::test]
    async fn test_delete_refuses_session_with_queued_submission() {
        let store = SessionStore::default();
        let holder = store.get_or_create("s").unwrap();
        let guard = holder.lock().await;

        let waiting = store.get_or_create("s").unwrap();
        assert!(matches!(store.delete("s"), Err(ChatError::SessionBusy(_))));
        drop(guard);
        drop(holder);
        // `waiting` has not locked yet but still pins the session.
        assert!(!waiting.is_busy());
        assert!(matches!(store.delete("s"), Err(ChatError::SessionBusy(_))));
        drop(waiting);
        assert!(store.delete("s").unwrap());
    }

    // ---- Expiry ----

    #[test]
    fn test_policy_from_config() {
        let config = SessionConfig {
            idle_timeout_minutes: 30,
            max_sessions: 100,
            ..Default::default()
        };
        let policy = ExpiryPolicy::from_config(&config);
        assert_eq!(policy.idle_timeout, Some(Duration::from_secs(1800)));
        assert_eq!(policy.max_sessions, Some(100));

        let unbounded = ExpiryPolicy::from_config(&SessionConfig::default());
        assert_eq!(unbounded, ExpiryPolicy::unbounded());
    }

    #[test]
    fn test_unbounded_policy_never_evicts() {
        let store = SessionStore::default();
        for i in 0..20 {
            store.get_or_create(&format!("s{i}")).unwrap();
        }
        assert_eq!(store.evict_expired().unwrap(), 0);
        assert_eq!(store.len(), 20);
    }

    #[tokio::test]
    async fn test_evict_idle_sessions() {
        let store = SessionStore::new(ExpiryPolicy {
            idle_timeout: Some(Duration::from_millis(30)),
            max_sessions: None,
        });
        store.get_or_create("stale").unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.get_or_create("fresh").unwrap();

        assert_eq!(store.evict_expired().unwrap(), 1);
        assert!(store.get("stale").unwrap().is_none());
        assert!(store.get("fresh").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_busy_session_is_not_evicted() {
        let store = SessionStore::new(ExpiryPolicy {
            idle_timeout: Some(Duration::from_millis(10)),
            max_sessions: None,
        });
        let handle = store.get_or_create("busy").unwrap();
        let _guard = handle.lock().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.evict_expired().unwrap(), 0);
        assert!(store.get("busy").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_max_sessions_skips_session_with_waiting_submission() {
        let store = SessionStore::new(ExpiryPolicy {
            idle_timeout: None,
            max_sessions: Some(2),
        });
        // "a" is least recently active but a submission is queued on it.
        let queued = store.get_or_create("a").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.get_or_create("b").unwrap();

        let c = store.get_or_create("c").unwrap();
        assert!(store.get("a").unwrap().is_some());
        assert!(store.get("b").unwrap().is_none());
        assert_eq!(store.len(), 2);

        let mut guard = queued.lock().await;
        guard.append(Role::User, "still recorded");
        drop(guard);
        assert_eq!(store.transcript("a").await.unwrap().len(), 1);
        drop(c);
    }

    #[tokio::test]
    async fn test_idle_eviction_skips_session_with_waiting_submission() {
        let store = SessionStore::new(ExpiryPolicy {
            idle_timeout: Some(Duration::from_millis(10)),
            max_sessions: None,
        });
        let pinned = store.get_or_create("pinned").unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!pinned.is_busy());
        assert_eq!(store.evict_expired().unwrap(), 0);
        drop(pinned);
        assert_eq!(store.evict_expired().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_max_sessions_evicts_least_recent() {
        let store = SessionStore::new(ExpiryPolicy {
            idle_timeout: None,
            max_sessions: Some(2),
        });
        store.get_or_create("a").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.get_or_create("b").unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.append("a", Role::User, "keeps a warm").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        store.get_or_create("c").unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.get("b").unwrap().is_none());
        assert!(store.get("a").unwrap().is_some());
        assert!(store.get("c").unwrap().is_some());
    }
}
