pub mod application;
pub mod session;
pub mod user;

pub use application::{ApplicationStore, PgApplicationStore};
pub use session::{PgSessionStore, SessionStore};
pub use user::{PgUserStore, UserStore};
