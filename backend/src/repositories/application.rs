use async_trait::async_trait;

use crate::db::connection::DbPool;
use crate::models::application::Application;

/// Read-only lookup of installed application records and their verification
/// keys.
#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str) -> anyhow::Result<Option<Application>>;
}

pub struct PgApplicationStore {
    pool: DbPool,
}

impl PgApplicationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApplicationStore for PgApplicationStore {
    async fn find_by_identifier(&self, identifier: &str) -> anyhow::Result<Option<Application>> {
        let application = sqlx::query_as::<_, Application>(
            "SELECT id, identifier, name, public_key, enabled, created_at \
             FROM applications WHERE identifier = $1",
        )
        .bind(identifier)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(application)
    }
}
