use std::sync::Arc;

use crate::auth::token::TokenCodec;
use crate::config::Config;
use crate::repositories::{ApplicationStore, UserStore};
use crate::services::auth::AuthService;
use crate::services::presence::PresenceStore;
use crate::services::session::SessionService;
use crate::services::sso::SsoService;
use crate::ws::rooms::RoomRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub codec: Arc<TokenCodec>,
    pub sessions: Arc<SessionService>,
    pub auth: Arc<AuthService>,
    pub sso: Arc<SsoService>,
    pub users: Arc<dyn UserStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub presence: Arc<dyn PresenceStore>,
    pub rooms: Arc<RoomRegistry>,
}
