pub mod password;
pub mod secret;
