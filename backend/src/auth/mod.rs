pub mod subject;
pub mod token;

pub use subject::Subject;
pub use token::{AccessClaims, TokenCodec, AUDIENCE_ACCESS};
