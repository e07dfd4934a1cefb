//! In-memory session table

use super::types::{Message, Session, StoreStats};
use crate::config::SessionLimits;
use chrono::Utc;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

/// Concurrent session table with per-owner quotas and idle expiry.
///
/// Different sessions never interfere: the table lives behind one
/// `RwLock` and every operation touches a single entry, so concurrent
/// loop runs over different session ids proceed independently.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    limits: SessionLimits,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            limits,
            sweeper: Mutex::new(None),
        }
    }

    pub fn limits(&self) -> &SessionLimits {
        &self.limits
    }

    /// Create a session for `owner_id`, evicting the owner's oldest
    /// session by `updated_at` if the per-owner quota is already full.
    pub async fn create(
        &self,
        owner_id: impl Into<String>,
        metadata: HashMap<String, Value>,
    ) -> Session {
        let owner_id = owner_id.into();
        let mut sessions = self.sessions.write().await;

        while self.owner_count(&sessions, &owner_id) >= self.limits.max_sessions_per_user {
            let oldest = sessions
                .values()
                .filter(|s| s.owner_id == owner_id)
                .min_by_key(|s| s.updated_at)
                .map(|s| s.id.clone());
            match oldest {
                Some(id) => {
                    tracing::debug!(session = %id, owner = %owner_id, "evicting oldest session for quota");
                    sessions.remove(&id);
                }
                None => break,
            }
        }

        let session = Session::new(owner_id, metadata);
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    /// Fetch a session, refreshing its `updated_at`
    pub async fn get(&self, id: &str) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(id)?;
        session.updated_at = Utc::now();
        Some(session.clone())
    }

    /// Append a message, trimming the oldest beyond the per-session cap.
    /// Returns false if the session is unknown.
    pub async fn append_message(&self, id: &str, message: Message) -> bool {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return false;
        };

        session.messages.push(message);
        let cap = self.limits.max_messages_per_session;
        if session.messages.len() > cap {
            let excess = session.messages.len() - cap;
            session.messages.drain(0..excess);
        }
        session.updated_at = Utc::now();
        true
    }

    pub async fn delete(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Delete every session idle longer than the configured lifetime
    pub async fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.limits.max_session_age()).unwrap_or_default();
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .values()
            .filter(|s| s.updated_at < cutoff)
            .map(|s| s.id.clone())
            .collect();

        for id in &expired {
            sessions.remove(id);
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "swept expired sessions");
        }
        expired.len()
    }

    pub async fn stats(&self) -> StoreStats {
        let sessions = self.sessions.read().await;
        let owners: HashSet<&str> = sessions.values().map(|s| s.owner_id.as_str()).collect();
        StoreStats {
            total_sessions: sessions.len(),
            total_owners: owners.len(),
        }
    }

    /// Snapshot of every session, for the persistence layer
    pub async fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Reinsert a persisted session wholesale, preserving its id,
    /// timestamps, and message order.
    pub async fn restore(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// Run the expiry sweeper on a background task at half the session
    /// lifetime. Stopped by [`SessionStore::stop_sweeper`].
    pub async fn start_sweeper(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }

        let store = Arc::clone(self);
        let interval = self.limits.sweep_interval();
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.sweep_expired().await;
            }
        }));
    }

    pub async fn stop_sweeper(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
    }

    fn owner_count(&self, sessions: &HashMap<String, Session>, owner_id: &str) -> usize {
        sessions
            .values()
            .filter(|s| s.owner_id == owner_id)
            .count()
    }
}
