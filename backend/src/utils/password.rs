//! Argon2 hashing for password-based accounts.
//!
//! Only user passwords go through argon2; refresh secrets use the plain
//! SHA-512 digest in [`super::secret`] because they must support keyed
//! `(id, hash)` lookups. The salted, memory-hard construction here exists
//! to slow offline guessing against a leaked `password_hash` column.

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

/// Hashes a password with a fresh random salt, returning the PHC string
/// stored on the user row.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| anyhow::anyhow!("password hashing failed: {err}"))?;
    Ok(hash.to_string())
}

/// Checks a candidate password against a stored PHC hash.
///
/// A mismatch is `Ok(false)`, not an error; only an unparseable stored hash
/// or a backend failure propagates, so callers can treat `Err` as a server
/// fault rather than a credential problem.
pub fn verify_password(password: &str, stored: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored)
        .map_err(|err| anyhow::anyhow!("stored password hash does not parse: {err}"))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(anyhow::anyhow!("password verification failed: {err}")),
    }
}
