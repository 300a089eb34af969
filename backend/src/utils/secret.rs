//! Refresh-secret generation, hashing, and composite token encoding.
//!
//! A refresh token on the wire is `<sessionId>:<urlsafe-base64(secret)>` with
//! trailing `=` padding stripped. Only the SHA-512 digest of the secret is
//! ever persisted server-side.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha512};

use crate::error::AuthError;
use crate::types::SessionId;

/// Default secret length in bytes.
pub const SECRET_LEN: usize = 32;

const DELIMITER: char = ':';

/// Generates cryptographically secure random bytes.
pub fn generate_secret(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// One-way digest of a secret, hex encoded. Used only for equality
/// comparison against the stored session hash.
pub fn hash_secret(secret: &[u8]) -> String {
    let digest = Sha512::digest(secret);
    hex::encode(digest)
}

/// Encodes `(id, secret)` into the composite wire format.
pub fn encode_composite(id: &SessionId, secret: &[u8]) -> String {
    format!("{}{}{}", id, DELIMITER, URL_SAFE_NO_PAD.encode(secret))
}

/// Decodes a composite refresh token back into `(id, secret)`.
///
/// Fails with `MalformedToken` when the delimiter is absent, the id is not a
/// syntactically valid identifier, or the secret segment does not decode
/// after padding normalization.
pub fn decode_composite(token: &str) -> Result<(SessionId, Vec<u8>), AuthError> {
    let (id_part, secret_part) = token
        .split_once(DELIMITER)
        .ok_or(AuthError::MalformedToken)?;

    let id: SessionId = id_part.parse().map_err(|_| AuthError::MalformedToken)?;

    // Tolerate clients that kept the `=` padding.
    let normalized = secret_part.trim_end_matches('=');
    let secret = URL_SAFE_NO_PAD
        .decode(normalized)
        .map_err(|_| AuthError::MalformedToken)?;

    Ok((id, secret))
}
