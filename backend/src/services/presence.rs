//! Ephemeral presence records for admitted channel connections.
//!
//! Keyed by `(actor, instance)`; created by the handshake, deleted by the
//! disconnect hook, and only ever touched by the owning connection.

use std::collections::HashMap;

use async_trait::async_trait;
use bb8_redis::redis::AsyncCommands;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::auth::Subject;
use crate::db::redis::RedisPool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    /// Subject string of the connected actor.
    pub actor: String,
    /// Client-declared connection instance identifier.
    pub instance_id: String,
    pub remote_addr: String,
    pub connected_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    /// Rooms this connection was joined to at admission.
    pub rooms: Vec<String>,
}

impl PresenceRecord {
    pub fn new(
        subject: &Subject,
        instance_id: String,
        remote_addr: String,
        rooms: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            actor: subject.to_string(),
            instance_id,
            remote_addr,
            connected_at: now,
            last_seen_at: now,
            rooms,
        }
    }

    pub fn key(&self) -> String {
        format!("presence:{}:{}", self.actor, self.instance_id)
    }
}

#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn record(&self, record: &PresenceRecord, ttl_seconds: u64) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<PresenceRecord>>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

pub struct RedisPresenceStore {
    pool: RedisPool,
}

impl RedisPresenceStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn record(&self, record: &PresenceRecord, ttl_seconds: u64) -> anyhow::Result<()> {
        let span = tracing::debug_span!("redis_record_presence", actor = %record.actor);
        let _enter = span.enter();

        let mut conn = self.pool.get().await?;
        let payload = serde_json::to_string(record)?;
        conn.set_ex::<_, _, ()>(record.key(), payload, ttl_seconds)
            .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<PresenceRecord>> {
        let mut conn = self.pool.get().await?;
        let payload: Option<String> = conn.get(key).await?;
        match payload {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        let span = tracing::debug_span!("redis_remove_presence", key);
        let _enter = span.enter();

        let mut conn = self.pool.get().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Process-local fallback used when no Redis URL is configured, and by
/// tests. Entries live until the disconnect hook removes them.
#[derive(Default)]
pub struct MemoryPresenceStore {
    entries: RwLock<HashMap<String, PresenceRecord>>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn record(&self, record: &PresenceRecord, _ttl_seconds: u64) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .insert(record.key(), record.clone());
        Ok(())
    }

    async fn get(&self, key: &str) -> anyhow::Result<Option<PresenceRecord>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
