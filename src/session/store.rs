//! Session store: volatile per-identity conversation state.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::model::Session;

/// Repository of live sessions keyed by identity.
///
/// Concurrent turns for different identities are safe. Two turns for the
/// *same* identity are not serialized: each reads, computes and writes on
/// its own, so the later write wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, identity: &str) -> Option<Session>;

    async fn set(&self, session: Session);

    /// Returns whether a session was removed.
    async fn delete(&self, identity: &str) -> bool;

    /// Remove sessions idle for longer than `max_idle`. Returns how many were removed.
    async fn expire_idle(&self, max_idle: Duration) -> usize;

    async fn len(&self) -> usize;
}

/// In-memory store behind a `RwLock<HashMap>`.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, identity: &str) -> Option<Session> {
        self.sessions.read().await.get(identity).cloned()
    }

    async fn set(&self, session: Session) {
        debug!(identity = %session.identity, flow = %session.flow, "Session stored");
        self.sessions
            .write()
            .await
            .insert(session.identity.clone(), session);
    }

    async fn delete(&self, identity: &str) -> bool {
        let removed = self.sessions.write().await.remove(identity).is_some();
        if removed {
            debug!(identity, "Session deleted");
        }
        removed
    }

    async fn expire_idle(&self, max_idle: Duration) -> usize {
        let max_idle = chrono::Duration::from_std(max_idle).unwrap_or(chrono::Duration::MAX);
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_idle(now, max_idle));
        let expired = before - sessions.len();

        if expired > 0 {
            info!(count = expired, "Expired idle sessions");
        }
        expired
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Spawn a background task that periodically evicts idle sessions.
pub fn spawn_expiry_task(
    store: Arc<dyn SessionStore>,
    max_idle: Duration,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            store.expire_idle(max_idle).await;
        }
    })
}
