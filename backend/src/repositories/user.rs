use async_trait::async_trait;
use uuid::Uuid;

use crate::db::connection::DbPool;
use crate::models::user::{IdentityLink, User};
use crate::types::UserId;

const USER_COLUMNS: &str =
    "id, username, email, password_hash, full_name, role, created_at, updated_at";

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: &UserId) -> anyhow::Result<Option<User>>;

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>>;

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;

    /// Login lookup: matches either the username or the email column.
    async fn find_by_username_or_email(&self, identity: &str) -> anyhow::Result<Option<User>>;

    async fn insert(&self, user: &User) -> anyhow::Result<()>;

    async fn find_identity(
        &self,
        provider: &str,
        provider_subject: &str,
    ) -> anyhow::Result<Option<IdentityLink>>;

    async fn link_identity(
        &self,
        user_id: &UserId,
        provider: &str,
        provider_subject: &str,
    ) -> anyhow::Result<()>;
}

pub struct PgUserStore {
    pool: DbPool,
}

impl PgUserStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: &UserId) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_username(&self, username: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1",
            USER_COLUMNS
        ))
        .bind(username)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE email = $1",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_username_or_email(&self, identity: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE username = $1 OR email = $1",
            USER_COLUMNS
        ))
        .bind(identity)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: &User) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, full_name, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }

    async fn find_identity(
        &self,
        provider: &str,
        provider_subject: &str,
    ) -> anyhow::Result<Option<IdentityLink>> {
        let link = sqlx::query_as::<_, IdentityLink>(
            "SELECT id, user_id, provider, provider_subject, created_at \
             FROM identity_links WHERE provider = $1 AND provider_subject = $2",
        )
        .bind(provider)
        .bind(provider_subject)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(link)
    }

    async fn link_identity(
        &self,
        user_id: &UserId,
        provider: &str,
        provider_subject: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO identity_links (id, user_id, provider, provider_subject, created_at) \
             VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(provider)
        .bind(provider_subject)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}
