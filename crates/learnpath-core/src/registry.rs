//! Isolated sessions for many concurrent learners.
//!
//! Each session sits behind its own mutex, so actions on one session run
//! strictly one after another while different sessions proceed in
//! parallel. The registry map is only locked to insert, look up or remove.
//! Sessions nobody has looked up for a while are dropped by
//! [`SessionRegistry::evict_idle`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::gateway::ModelGateway;
use crate::session::TutorSession;

pub type SessionHandle = Arc<Mutex<TutorSession>>;

struct Entry {
    handle: SessionHandle,
    last_used: Instant,
}

pub struct SessionRegistry {
    gateway: ModelGateway,
    config: SessionConfig,
    sessions: RwLock<HashMap<Uuid, Entry>>,
}

impl SessionRegistry {
    pub fn new(gateway: ModelGateway, config: SessionConfig) -> Self {
        Self {
            gateway,
            config,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new session and return its id and handle.
    pub async fn create(&self) -> (Uuid, SessionHandle) {
        let session = TutorSession::new(self.gateway.clone(), self.config.clone());
        let id = session.id();
        let handle = Arc::new(Mutex::new(session));
        let entry = Entry {
            handle: Arc::clone(&handle),
            last_used: Instant::now(),
        };
        self.sessions.write().await.insert(id, entry);
        tracing::debug!(session = %id, "session created");
        (id, handle)
    }

    /// Look up a session and mark it as used.
    pub async fn get(&self, id: Uuid) -> Option<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.handle))
    }

    /// End a session and drop it from the registry.
    ///
    /// Waits for any in-flight action on that session to finish first.
    pub async fn end(&self, id: Uuid) -> bool {
        let Some(entry) = self.sessions.write().await.remove(&id) else {
            return false;
        };
        entry.handle.lock().await.end();
        true
    }

    /// End and drop every session unused for at least `max_idle`.
    ///
    /// Sessions with an action in flight are kept. Returns how many were
    /// evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            if entry.last_used.elapsed() < max_idle {
                return true;
            }
            match entry.handle.try_lock() {
                Ok(mut session) => {
                    session.end();
                    tracing::info!(session = %id, "idle session evicted");
                    false
                }
                Err(_) => true,
            }
        });
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Stage;
    use crate::test_support::{gateway_with, quiz_json, ScriptedLlm, ScriptedSearch};

    #[tokio::test]
    async fn sessions_are_isolated() {
        let llm = Arc::new(ScriptedLlm::always(&quiz_json(5, "shared")));
        let gw = gateway_with(llm.clone(), Arc::new(ScriptedSearch::empty()));
        let registry = Arc::new(SessionRegistry::new(gw, SessionConfig::default()));

        let topics = ["Rust", "Python basics", "Linear algebra", "Chess"];
        let runs = topics.iter().map(|topic| {
            let registry = Arc::clone(&registry);
            async move {
                let (id, handle) = registry.create().await;
                let mut session = handle.lock().await;
                session.submit_topic(topic).await.unwrap();
                (id, session.state().topic.clone().unwrap())
            }
        });
        let results = futures::future::join_all(runs).await;

        assert_eq!(registry.len().await, 4);
        for ((id, topic), expected) in results.iter().zip(topics) {
            assert_eq!(topic.as_str(), expected);
            let handle = registry.get(*id).await.unwrap();
            let session = handle.lock().await;
            assert_eq!(session.stage(), Stage::AwaitingAnswers);
            assert_eq!(session.state().topic.as_ref().unwrap().as_str(), expected);
        }
        assert_eq!(llm.calls(), 4);
    }

    #[tokio::test]
    async fn ending_removes_session() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let gw = gateway_with(llm, Arc::new(ScriptedSearch::empty()));
        let registry = SessionRegistry::new(gw, SessionConfig::default());

        let (id, handle) = registry.create().await;
        assert!(registry.end(id).await);
        assert!(!registry.end(id).await);
        assert!(registry.get(id).await.is_none());
        assert!(registry.is_empty().await);
        assert_eq!(handle.lock().await.stage(), Stage::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_evicted() {
        let llm = Arc::new(ScriptedLlm::new(Vec::<String>::new()));
        let gw = gateway_with(llm, Arc::new(ScriptedSearch::empty()));
        let registry = SessionRegistry::new(gw, SessionConfig::default());
        let max_idle = Duration::from_secs(30 * 60);

        let (stale_id, stale) = registry.create().await;
        let (kept_id, _) = registry.create().await;
        let (busy_id, busy) = registry.create().await;

        tokio::time::advance(Duration::from_secs(20 * 60)).await;
        assert!(registry.get(kept_id).await.is_some());
        assert_eq!(registry.evict_idle(max_idle).await, 0);

        tokio::time::advance(Duration::from_secs(15 * 60)).await;
        let in_flight = busy.lock().await;
        assert_eq!(registry.evict_idle(max_idle).await, 1);
        drop(in_flight);

        assert!(registry.get(stale_id).await.is_none());
        assert_eq!(stale.lock().await.stage(), Stage::Done);
        assert!(registry.get(kept_id).await.is_some());
        assert!(registry.get(busy_id).await.is_some());
        assert_eq!(registry.len().await, 2);
    }
}
