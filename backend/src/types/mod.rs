mod id;

pub use id::{ApplicationId, SessionId, UserId};
