//! Session registry
//!
//! Maps canonical session ids to live interpreter channels. Keys are always
//! stored canonicalized and every operation canonicalizes before looking up.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::channel::{ChannelSpawner, InteractiveChannel};
use crate::error::Result;

/// Session id that disables sessions and selects one-shot evaluation.
pub const NO_SESSION: &str = "none";

/// Wrap `id` in `marker` unless it already is wrapped.
pub fn canonicalize(id: &str, marker: char) -> String {
    let wrapped = id.len() >= 2 * marker.len_utf8() && id.starts_with(marker) && id.ends_with(marker);
    if wrapped {
        id.to_string()
    } else {
        format!("{marker}{id}{marker}")
    }
}

/// A live interpreter bound to a session id.
pub struct Session {
    id: String,
    handle_id: Uuid,
    created_at: DateTime<Utc>,
    channel: Arc<dyn InteractiveChannel>,
    eval_lock: Mutex<()>,
}

impl Session {
    fn new(id: String, channel: Arc<dyn InteractiveChannel>) -> Self {
        Self {
            id,
            handle_id: Uuid::new_v4(),
            created_at: Utc::now(),
            channel,
            eval_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Unique per spawned interpreter; a respawned session gets a new one.
    pub fn handle_id(&self) -> Uuid {
        self.handle_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn channel(&self) -> Arc<dyn InteractiveChannel> {
        self.channel.clone()
    }

    /// Serializes evaluations on this session.
    pub async fn lock(&self) -> MutexGuard<'_, ()> {
        self.eval_lock.lock().await
    }

    pub async fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            handle_id: self.handle_id,
            created_at: self.created_at,
            alive: self.channel.is_alive().await,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("handle_id", &self.handle_id)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Snapshot of a session for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub handle_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub alive: bool,
}

/// Thread-safe registry of interpreter sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<BTreeMap<String, Arc<Session>>>>,
    spawner: Arc<dyn ChannelSpawner>,
    marker: char,
}

impl SessionRegistry {
    pub fn new(spawner: Arc<dyn ChannelSpawner>, marker: char) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(BTreeMap::new())),
            spawner,
            marker,
        }
    }

    pub fn canonicalize(&self, id: &str) -> String {
        canonicalize(id, self.marker)
    }

    pub async fn lookup(&self, id: &str) -> Option<Arc<Session>> {
        let key = self.canonicalize(id);
        self.sessions.read().await.get(&key).cloned()
    }

    /// Insert a session for `id` unless one is already registered.
    /// Returns `false` and keeps the existing entry in that case.
    pub async fn register(&self, id: &str, channel: Arc<dyn InteractiveChannel>) -> bool {
        let key = self.canonicalize(id);
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&key) {
            return false;
        }
        sessions.insert(key.clone(), Arc::new(Session::new(key, channel)));
        true
    }

    /// Drop the entry for `id` if its interpreter is no longer running.
    pub async fn cleanse(&self, id: &str) {
        let key = self.canonicalize(id);
        let Some(session) = self.sessions.read().await.get(&key).cloned() else {
            return;
        };
        if session.channel.is_alive().await {
            return;
        }

        let mut sessions = self.sessions.write().await;
        // Only remove the handle we inspected; a replacement may have landed.
        if sessions
            .get(&key)
            .is_some_and(|current| current.handle_id == session.handle_id)
        {
            sessions.remove(&key);
            tracing::warn!("Session {} is no longer alive; removed", key);
        }
    }

    /// Resolve `id` to a live session, starting one if needed.
    ///
    /// `"none"` disables sessions and yields `Ok(None)`. A missing id falls
    /// back to `fallback`, usually the name of the calling document.
    pub async fn ensure(&self, id: Option<&str>, fallback: &str) -> Result<Option<String>> {
        let id = id.unwrap_or(fallback);
        if id == NO_SESSION {
            return Ok(None);
        }

        let key = self.canonicalize(id);
        self.cleanse(&key).await;
        if self.lookup(&key).await.is_some() {
            return Ok(Some(key));
        }

        let channel = self.spawner.spawn(&key).await?;
        if !self.register(&key, channel.clone()).await {
            // Lost a race with a concurrent ensure.
            channel.terminate().await;
        } else {
            tracing::info!("Session {} started", key);
        }
        Ok(Some(key))
    }

    /// Terminate and drop one session. Returns whether it existed.
    pub async fn remove(&self, id: &str) -> bool {
        let key = self.canonicalize(id);
        let removed = self.sessions.write().await.remove(&key);
        match removed {
            Some(session) => {
                session.channel.terminate().await;
                tracing::info!("Session {} removed", key);
                true
            }
            None => false,
        }
    }

    /// Terminate every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = {
            let mut map = self.sessions.write().await;
            std::mem::take(&mut *map).into_values().collect()
        };
        for session in sessions {
            session.channel.terminate().await;
            tracing::debug!("Session {} terminated", session.id);
        }
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut infos = Vec::with_capacity(sessions.len());
        for session in sessions {
            infos.push(session.info().await);
        }
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
