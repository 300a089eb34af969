//! Pre-upgrade authorization for channel connections.
//!
//! Runs once per connection attempt, before the HTTP upgrade completes.
//! Refusing here sends a 4xx on the upgrade request, so an unauthorized
//! client never holds an open socket. The token is decoded without
//! verification only to learn which actor class and key to verify against;
//! nothing from that decode is trusted until the real verification passes.

use serde::Deserialize;
use uuid::Uuid;

use crate::auth::token::TokenCodec;
use crate::auth::Subject;
use crate::error::{AppError, AuthError};
use crate::services::presence::PresenceRecord;
use crate::state::AppState;

/// Presence entries outlive a quiet connection for this long; every accepted
/// inbound event rewrites the record and pushes the deadline out.
pub const PRESENCE_TTL_SECONDS: u64 = 3600;

#[derive(Debug, Deserialize)]
pub struct HandshakeParams {
    pub token: String,
    /// Client-chosen identifier distinguishing concurrent connections of the
    /// same actor.
    pub instance_id: String,
    /// Folder the user wants notifications for.
    pub folder_id: Option<String>,
    /// Comma-separated task identifiers an application resubscribes to.
    pub handled_task_ids: Option<String>,
}

impl HandshakeParams {
    fn handled_tasks(&self) -> Vec<&str> {
        self.handled_task_ids
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|task| !task.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A connection that passed verification, with the rooms it is entitled to
/// and the presence record already written.
#[derive(Debug)]
pub struct AdmittedActor {
    pub subject: Subject,
    pub instance_id: String,
    pub rooms: Vec<String>,
    pub presence_key: String,
}

impl AdmittedActor {
    /// Registry key for this connection's sender handle.
    pub fn connection_id(&self) -> String {
        format!("{}#{}", self.subject, self.instance_id)
    }
}

pub async fn authorize(
    state: &AppState,
    params: &HandshakeParams,
    remote_addr: String,
) -> Result<AdmittedActor, AppError> {
    if params.instance_id.trim().is_empty() {
        return Err(AppError::BadRequest(
            "instance_id must not be empty".to_string(),
        ));
    }

    let unverified = TokenCodec::decode_unsafe(&params.token)?;
    let subject = unverified.subject()?;

    let rooms = match &subject {
        Subject::User(user_id) => {
            let claims = state.codec.verify_user(&params.token)?;
            state.sessions.verify_with_access_token(&claims).await?;
            let mut rooms = vec![format!("user:{user_id}")];
            if let Some(folder_id) = params.folder_id.as_deref() {
                rooms.push(format!("folder:{folder_id}"));
            }
            rooms
        }
        Subject::App(identifier) => {
            let application = fetch_enabled_application(state, identifier).await?;
            state
                .codec
                .verify_app(&params.token, &application.public_key)?;
            app_rooms(identifier, params)
        }
        Subject::AppWorker(identifier) => {
            state.codec.verify_worker(&params.token)?;
            fetch_enabled_application(state, identifier).await?;
            app_rooms(identifier, params)
        }
    };

    let instance_id = if Uuid::parse_str(&params.instance_id).is_ok() {
        params.instance_id.clone()
    } else {
        // Non-UUID instance ids are accepted but namespaced so a client
        // cannot collide with another actor's presence key.
        format!("{}-{}", params.instance_id, Uuid::new_v4())
    };

    let presence = PresenceRecord::new(&subject, instance_id.clone(), remote_addr, rooms.clone());
    state.presence.record(&presence, PRESENCE_TTL_SECONDS).await?;

    Ok(AdmittedActor {
        subject,
        instance_id,
        rooms,
        presence_key: presence.key(),
    })
}

fn app_rooms(identifier: &str, params: &HandshakeParams) -> Vec<String> {
    let mut rooms = vec![format!("app:{identifier}")];
    for task in params.handled_tasks() {
        rooms.push(format!("task:{identifier}:{task}"));
    }
    rooms
}

async fn fetch_enabled_application(
    state: &AppState,
    identifier: &str,
) -> Result<crate::models::application::Application, AppError> {
    let application = state
        .applications
        .find_by_identifier(identifier)
        .await?
        .ok_or(AuthError::Unauthorized)?;
    if !application.enabled {
        return Err(AuthError::Unauthorized.into());
    }
    Ok(application)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(handled: Option<&str>) -> HandshakeParams {
        HandshakeParams {
            token: "unused".to_string(),
            instance_id: "inst".to_string(),
            folder_id: None,
            handled_task_ids: handled.map(str::to_string),
        }
    }

    #[test]
    fn handled_tasks_split_and_trimmed() {
        let params = params(Some("build, deploy ,,test"));
        assert_eq!(params.handled_tasks(), vec!["build", "deploy", "test"]);
    }

    #[test]
    fn app_rooms_include_task_resubscriptions() {
        let params = params(Some("encode"));
        assert_eq!(
            app_rooms("transcoder", &params),
            vec!["app:transcoder", "task:transcoder:encode"]
        );
    }
}
