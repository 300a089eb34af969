use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::connection::DbPool;
use crate::models::session::Session;
use crate::types::{SessionId, UserId};

const SESSION_COLUMNS: &str =
    "id, user_id, scopes, secret_hash, created_at, updated_at, expires_at";

/// Keyed access to session records. The session manager only ever touches
/// sessions through this seam.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session) -> anyhow::Result<()>;

    async fn find_by_id(&self, id: &SessionId) -> anyhow::Result<Option<Session>>;

    /// Lookup by `(id, hash(secret))`. A miss covers both "never existed"
    /// and "secret was already rotated".
    async fn find_by_id_and_hash(
        &self,
        id: &SessionId,
        secret_hash: &str,
    ) -> anyhow::Result<Option<Session>>;

    /// Replaces the secret hash and expiry, conditioned on the previously
    /// read hash. Returns `false` when another writer rotated first.
    async fn rotate_secret(
        &self,
        id: &SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;

    /// Returns `false` when the row was already gone.
    async fn delete(&self, id: &SessionId) -> anyhow::Result<bool>;

    async fn list_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Session>>;

    async fn delete_for_user(&self, user_id: &UserId) -> anyhow::Result<u64>;
}

pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO sessions (id, user_id, scopes, secret_hash, created_at, updated_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.scopes)
        .bind(&session.secret_hash)
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.expires_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(session)
    }

    async fn find_by_id_and_hash(
        &self,
        id: &SessionId,
        secret_hash: &str,
    ) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE id = $1 AND secret_hash = $2",
            SESSION_COLUMNS
        ))
        .bind(id)
        .bind(secret_hash)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(session)
    }

    async fn rotate_secret(
        &self,
        id: &SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE sessions \
             SET secret_hash = $1, expires_at = $2, updated_at = $3 \
             WHERE id = $4 AND secret_hash = $5",
        )
        .bind(new_hash)
        .bind(expires_at)
        .bind(Utc::now())
        .bind(id)
        .bind(expected_hash)
        .execute(&*self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &SessionId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_for_user(&self, user_id: &UserId) -> anyhow::Result<Vec<Session>> {
        let sessions = sqlx::query_as::<_, Session>(&format!(
            "SELECT {} FROM sessions WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(sessions)
    }

    async fn delete_for_user(&self, user_id: &UserId) -> anyhow::Result<u64> {
        let result = sqlx::query("DELETE FROM sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&*self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
