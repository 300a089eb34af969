//! Typed token subjects.
//!
//! A token's `sub` claim encodes actor type + actor id (`USER:<id>`,
//! `APP:<identifier>`, `APP_WORKER:<identifier>`). The prefix decides which
//! verification material applies, so parsing happens exactly once and every
//! consumer matches on the variant.

use std::fmt;

use crate::error::AuthError;
use crate::types::UserId;

/// Actor identity carried in a token's `sub` claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subject {
    User(UserId),
    App(String),
    AppWorker(String),
}

impl Subject {
    /// Parses a subject string into its typed variant.
    pub fn parse(s: &str) -> Result<Self, AuthError> {
        let (prefix, rest) = s.split_once(':').ok_or(AuthError::TokenInvalid)?;
        if rest.is_empty() {
            return Err(AuthError::TokenInvalid);
        }
        match prefix {
            "USER" => rest
                .parse::<UserId>()
                .map(Subject::User)
                .map_err(|_| AuthError::TokenInvalid),
            "APP" => Ok(Subject::App(rest.to_string())),
            "APP_WORKER" => Ok(Subject::AppWorker(rest.to_string())),
            _ => Err(AuthError::TokenInvalid),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::User(id) => write!(f, "USER:{}", id),
            Subject::App(identifier) => write!(f, "APP:{}", identifier),
            Subject::AppWorker(identifier) => write!(f, "APP_WORKER:{}", identifier),
        }
    }
}
