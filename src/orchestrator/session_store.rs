//! Session store implementations: an in-memory `DashMap`-backed store used
//! by default and in tests, and a `SQLite`-backed store for durability
//! across process restarts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::database::DatabaseConnection;
use crate::domain_types::{ContextId, TaskId, TimeoutMs};
use crate::orchestrator::traits::{SessionSnapshot, SessionStore, SessionStoreError, TaskSnapshot};

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// Default in-memory implementation of [`SessionStore`].
///
/// A background task sweeps expired entries periodically; reads also check
/// expiry so a miss is returned promptly even between sweeps.
pub struct InMemorySessionStore {
    sessions: DashMap<ContextId, Entry<SessionSnapshot>>,
    tasks: DashMap<TaskId, Entry<TaskSnapshot>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            tasks: DashMap::new(),
        }
    }

    /// Spawns a background sweep that evicts expired sessions and tasks
    /// every `interval`. The returned handle may be dropped to stop it.
    pub fn spawn_ttl_sweep(self: &std::sync::Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Instant::now();
                store.sessions.retain(|_, entry| entry.expires_at > now);
                store.tasks.retain(|_, entry| entry.expires_at > now);
            }
        })
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, context_id: ContextId) -> Result<Option<SessionSnapshot>, SessionStoreError> {
        let now = Instant::now();
        Ok(self.sessions.get(&context_id).and_then(|entry| {
            (entry.expires_at > now).then(|| entry.value.clone())
        }))
    }

    async fn put(
        &self,
        context_id: ContextId,
        snapshot: SessionSnapshot,
        ttl: TimeoutMs,
    ) -> Result<(), SessionStoreError> {
        self.sessions.insert(
            context_id,
            Entry {
                value: snapshot,
                expires_at: Instant::now() + ttl.as_duration(),
            },
        );
        Ok(())
    }

    async fn delete(&self, context_id: ContextId) -> Result<(), SessionStoreError> {
        self.sessions.remove(&context_id);
        Ok(())
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskSnapshot>, SessionStoreError> {
        let now = Instant::now();
        Ok(self
            .tasks
            .get(&task_id)
            .and_then(|entry| (entry.expires_at > now).then(|| entry.value.clone())))
    }

    async fn put_task(
        &self,
        task_id: TaskId,
        snapshot: TaskSnapshot,
        ttl: TimeoutMs,
    ) -> Result<(), SessionStoreError> {
        self.tasks.insert(
            task_id,
            Entry {
                value: snapshot,
                expires_at: Instant::now() + ttl.as_duration(),
            },
        );
        Ok(())
    }
}

/// SQLite-backed implementation of [`SessionStore`], for durability across
/// process restarts. Reuses `DatabaseConnection` for pool management and
/// embedded migrations.
pub struct SqliteSessionStore {
    db: DatabaseConnection,
}

impl SqliteSessionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, context_id: ContextId) -> Result<Option<SessionSnapshot>, SessionStoreError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT snapshot, expires_at FROM sessions WHERE context_id = ?1",
        )
        .bind(context_id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| SessionStoreError::Unavailable {
            reason: e.to_string(),
        })?;

        let Some((snapshot_json, expires_at)) = row else {
            return Ok(None);
        };

        let expires_at: DateTime<Utc> = expires_at.parse().map_err(|_| SessionStoreError::Unavailable {
            reason: "corrupt expires_at timestamp".to_string(),
        })?;
        if expires_at <= Utc::now() {
            return Ok(None);
        }

        let snapshot: SessionSnapshot = serde_json::from_str(&snapshot_json)?;
        Ok(Some(snapshot))
    }

    async fn put(
        &self,
        context_id: ContextId,
        snapshot: SessionSnapshot,
        ttl: TimeoutMs,
    ) -> Result<(), SessionStoreError> {
        let snapshot_json = serde_json::to_string(&snapshot)?;
        let now = Utc::now();
        let expires_at = now + chrono::Duration::milliseconds(ttl.as_u64() as i64);

        sqlx::query(
            "INSERT INTO sessions (context_id, snapshot, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(context_id) DO UPDATE SET
               snapshot = excluded.snapshot,
               expires_at = excluded.expires_at,
               updated_at = excluded.updated_at",
        )
        .bind(context_id.to_string())
        .bind(snapshot_json)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| {
            warn!(error = %e, "session store write failed");
            SessionStoreError::Unavailable {
                reason: e.to_string(),
            }
        })?;

        debug!(%context_id, "session persisted");
        Ok(())
    }

    async fn delete(&self, context_id: ContextId) -> Result<(), SessionStoreError> {
        sqlx::query("DELETE FROM sessions WHERE context_id = ?1")
            .bind(context_id.to_string())
            .execute(self.db.pool())
            .await
            .map_err(|e| SessionStoreError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn get_task(&self, task_id: TaskId) -> Result<Option<TaskSnapshot>, SessionStoreError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT snapshot, expires_at FROM tasks WHERE task_id = ?1")
                .bind(task_id.to_string())
                .fetch_optional(self.db.pool())
                .await
                .map_err(|e| SessionStoreError::Unavailable {
                    reason: e.to_string(),
                })?;

        let Some((snapshot_json, expires_at)) = row else {
            return Ok(None);
        };
        let expires_at: DateTime<Utc> = expires_at.parse().map_err(|_| SessionStoreError::Unavailable {
            reason: "corrupt expires_at timestamp".to_string(),
        })?;
        if expires_at <= Utc::now() {
            return Ok(None);
        }
        let snapshot: TaskSnapshot = serde_json::from_str(&snapshot_json)?;
        Ok(Some(snapshot))
    }

    async fn put_task(
        &self,
        task_id: TaskId,
        snapshot: TaskSnapshot,
        ttl: TimeoutMs,
    ) -> Result<(), SessionStoreError> {
        let snapshot_json = serde_json::to_string(&snapshot)?;
        let now = Utc::now();
        let expires_at = now + chrono::Duration::milliseconds(ttl.as_u64() as i64);

        sqlx::query(
            "INSERT INTO tasks (task_id, snapshot, expires_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(task_id) DO UPDATE SET
               snapshot = excluded.snapshot,
               expires_at = excluded.expires_at,
               updated_at = excluded.updated_at",
        )
        .bind(task_id.to_string())
        .bind(snapshot_json)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| SessionStoreError::Unavailable {
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
