//! Typed ID wrappers for compile-time type safety.
//!
//! These types wrap UUID strings to prevent accidental mixing of different
//! entity IDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Macro to generate typed ID wrappers with common trait implementations.
macro_rules! typed_id {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
        #[sqlx(transparent)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            /// Parses and validates a UUID-shaped identifier.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(|u| Self(u.to_string()))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

// Define all typed IDs
typed_id!(UserId, "Unique identifier for a user.");
typed_id!(SessionId, "Unique identifier for a session.");
typed_id!(ApplicationId, "Unique identifier for an installed application record.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_non_uuid() {
        assert!("not-a-uuid".parse::<SessionId>().is_err());
    }

    #[test]
    fn parse_roundtrips_display() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().expect("valid uuid");
        assert_eq!(parsed, id);
    }
}
