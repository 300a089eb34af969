pub mod auth;
pub mod presence;
pub mod session;
pub mod sso;
