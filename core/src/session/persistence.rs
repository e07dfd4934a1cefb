//! On-disk session records, one JSON file per session

use super::store::SessionStore;
use super::types::Session;
use crate::config::PersistenceSettings;
use crate::error::{PersistenceError, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Persists sessions from a [`SessionStore`] to a directory of JSON
/// files and reloads them across restarts.
///
/// Storage failures after startup are logged, never fatal: losing a
/// flush degrades durability, not availability.
pub struct SessionPersistence {
    store: Arc<SessionStore>,
    storage_dir: PathBuf,
    settings: PersistenceSettings,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl SessionPersistence {
    pub fn new(store: Arc<SessionStore>, settings: PersistenceSettings) -> Self {
        let storage_dir = settings.storage_dir();
        Self {
            store,
            storage_dir,
            settings,
            flusher: Mutex::new(None),
        }
    }

    pub fn storage_dir(&self) -> &PathBuf {
        &self.storage_dir
    }

    /// Create the storage directory, load persisted sessions into the
    /// store, and start the periodic flush task. An unwritable storage
    /// directory is the one fatal persistence error.
    pub async fn initialize(self: &Arc<Self>) -> Result<usize> {
        tokio::fs::create_dir_all(&self.storage_dir)
            .await
            .map_err(|e| PersistenceError::StorageUnavailable {
                path: self.storage_dir.display().to_string(),
                message: e.to_string(),
            })?;

        let loaded = self.load().await?;

        let mut flusher = self.flusher.lock().await;
        if flusher.is_none() {
            let this = Arc::clone(self);
            let interval = self.settings.flush_interval();
            *flusher = Some(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if let Err(e) = this.flush().await {
                        tracing::warn!("periodic session flush failed: {}", e);
                    }
                }
            }));
        }

        Ok(loaded)
    }

    /// Read every `.json` record in the storage directory into the
    /// store. Stale records are deleted, corrupt ones skipped with a
    /// warning; neither aborts the load.
    pub async fn load(&self) -> Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.storage_dir).await.map_err(|e| {
            PersistenceError::StorageUnavailable {
                path: self.storage_dir.display().to_string(),
                message: e.to_string(),
            }
        })?;

        let max_age =
            chrono::Duration::from_std(self.settings.max_file_age()).unwrap_or_default();
        let cutoff = Utc::now() - max_age;
        let mut loaded = 0usize;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            PersistenceError::StorageUnavailable {
                path: self.storage_dir.display().to_string(),
                message: e.to_string(),
            }
        })? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let contents = match tokio::fs::read_to_string(&path).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "unreadable session record: {}", e);
                    continue;
                }
            };

            let session: Session = match serde_json::from_str(&contents) {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "corrupt session record skipped: {}", e);
                    continue;
                }
            };

            if session.updated_at < cutoff {
                tracing::debug!(session = %session.id, "deleting stale session record");
                if let Err(e) = tokio::fs::remove_file(&path).await {
                    tracing::warn!(path = %path.display(), "failed to delete stale record: {}", e);
                }
                continue;
            }

            self.store.restore(session).await;
            loaded += 1;
        }

        if loaded > 0 {
            tracing::info!(count = loaded, "restored persisted sessions");
        }
        Ok(loaded)
    }

    /// Write every live session to its own record. A failure on one
    /// record is logged and does not stop the rest.
    pub async fn flush(&self) -> Result<usize> {
        let sessions = self.store.snapshot().await;
        let mut written = 0usize;

        for session in &sessions {
            match self.write_record(session).await {
                Ok(()) => written += 1,
                Err(e) => tracing::warn!(session = %session.id, "session flush failed: {}", e),
            }
        }

        tracing::debug!(count = written, "flushed sessions to disk");
        Ok(written)
    }

    /// Stop the flush timer and write a final snapshot
    pub async fn shutdown(&self) -> Result<usize> {
        if let Some(handle) = self.flusher.lock().await.take() {
            handle.abort();
        }
        self.flush().await
    }

    async fn write_record(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string_pretty(session).map_err(|e| {
            PersistenceError::Serialization {
                id: session.id.clone(),
                message: e.to_string(),
            }
        })?;
        let path = self.record_path(&session.id);
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.storage_dir.join(format!("{}.json", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionLimits;
    use crate::session::Message;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn settings(dir: &TempDir) -> PersistenceSettings {
        PersistenceSettings {
            storage_dir: Some(dir.path().to_path_buf()),
            flush_interval_secs: 3600,
            max_file_age_secs: 3600,
        }
    }

    fn store() -> Arc<SessionStore> {
        Arc::new(SessionStore::new(SessionLimits::default()))
    }

    #[tokio::test]
    async fn flush_then_load_restores_sessions_intact() {
        let dir = TempDir::new().unwrap();

        let source = store();
        let session = source.create("alice", HashMap::new()).await;
        source
            .append_message(&session.id, Message::user("hello"))
            .await;
        source
            .append_message(&session.id, Message::assistant("hi"))
            .await;

        let persistence = Arc::new(SessionPersistence::new(
            Arc::clone(&source),
            settings(&dir),
        ));
        assert_eq!(persistence.flush().await.unwrap(), 1);

        let target = store();
        let persistence = Arc::new(SessionPersistence::new(Arc::clone(&target), settings(&dir)));
        assert_eq!(persistence.load().await.unwrap(), 1);

        let restored = target.get(&session.id).await.unwrap();
        assert_eq!(restored.owner_id, "alice");
        assert_eq!(restored.messages.len(), 2);
        assert_eq!(restored.messages[0].content(), "hello");
    }

    #[tokio::test]
    async fn load_skips_corrupt_records() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("bad.json"), "{not json")
            .await
            .unwrap();

        let target = store();
        let session = Session::new("alice".to_string(), HashMap::new());
        tokio::fs::write(
            dir.path().join(format!("{}.json", session.id)),
            serde_json::to_string(&session).unwrap(),
        )
        .await
        .unwrap();

        let persistence = Arc::new(SessionPersistence::new(Arc::clone(&target), settings(&dir)));
        assert_eq!(persistence.load().await.unwrap(), 1);
        assert!(target.get(&session.id).await.is_some());
    }

    #[tokio::test]
    async fn load_deletes_stale_records() {
        let dir = TempDir::new().unwrap();

        let mut session = Session::new("alice".to_string(), HashMap::new());
        session.updated_at = Utc::now() - chrono::Duration::seconds(7200);
        let path = dir.path().join(format!("{}.json", session.id));
        tokio::fs::write(&path, serde_json::to_string(&session).unwrap())
            .await
            .unwrap();

        let target = store();
        let persistence = Arc::new(SessionPersistence::new(Arc::clone(&target), settings(&dir)));
        assert_eq!(persistence.load().await.unwrap(), 0);

        assert!(!path.exists());
        assert!(target.get(&session.id).await.is_none());
    }

    #[tokio::test]
    async fn load_ignores_non_json_files() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "hello")
            .await
            .unwrap();

        let target = store();
        let persistence = Arc::new(SessionPersistence::new(Arc::clone(&target), settings(&dir)));
        assert_eq!(persistence.load().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn initialize_fails_when_storage_dir_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocked = dir.path().join("blocked");
        tokio::fs::write(&blocked, "x").await.unwrap();

        let persistence = Arc::new(SessionPersistence::new(
            store(),
            PersistenceSettings {
                storage_dir: Some(blocked),
                flush_interval_secs: 3600,
                max_file_age_secs: 3600,
            },
        ));

        let err = persistence.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::Persistence(PersistenceError::StorageUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn repeated_flush_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let source = store();
        let session = source.create("alice", HashMap::new()).await;

        let persistence = Arc::new(SessionPersistence::new(
            Arc::clone(&source),
            settings(&dir),
        ));
        persistence.flush().await.unwrap();
        persistence.flush().await.unwrap();

        let mut count = 0;
        let mut entries = tokio::fs::read_dir(dir.path()).await.unwrap();
        while let Some(_) = entries.next_entry().await.unwrap() {
            count += 1;
        }
        assert_eq!(count, 1);

        let target = store();
        let persistence = Arc::new(SessionPersistence::new(Arc::clone(&target), settings(&dir)));
        assert_eq!(persistence.load().await.unwrap(), 1);
        assert!(target.get(&session.id).await.is_some());
    }
}
