//! Installed application records.
//!
//! Applications authenticate with tokens they sign themselves; this record
//! holds the public half used for verification plus the enablement flag.
//! Read-only from the auth subsystem's perspective.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::ApplicationId;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Application {
    pub id: ApplicationId,
    /// Stable external identifier carried in `APP:`/`APP_WORKER:` subjects.
    pub identifier: String,
    pub name: String,
    /// PEM-encoded RSA public key for verifying this application's tokens.
    pub public_key: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}
