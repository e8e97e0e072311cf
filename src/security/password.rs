//! Password hashing and verification.
//!
//! Centralizes Argon2 handling. Both operations run on the blocking pool so
//! the command dispatch loop never stalls on KDF work; the caller may be
//! gone by the time a verification finishes, in which case the result is
//! simply dropped.

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use zeroize::Zeroizing;

use crate::config::AuthConfig;

/// KDF cost parameters, bounded by config validation.
#[derive(Debug, Clone, Copy)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl From<&AuthConfig> for KdfParams {
    fn from(auth: &AuthConfig) -> Self {
        Self {
            memory_kib: auth.kdf_memory_kib,
            iterations: auth.kdf_iterations,
        }
    }
}

fn argon2(params: KdfParams) -> Result<Argon2<'static>, argon2::password_hash::Error> {
    let params = Params::new(params.memory_kib, params.iterations, 1, None)
        .map_err(|_| argon2::password_hash::Error::ParamNameInvalid)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password (non-blocking).
#[must_use = "password hash must be used"]
pub async fn hash_password(
    password: String,
    params: KdfParams,
) -> Result<String, argon2::password_hash::Error> {
    tokio::task::spawn_blocking(move || {
        let password = Zeroizing::new(password);
        let salt = SaltString::generate(&mut OsRng);
        Ok(argon2(params)?
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    })
    .await
    .expect("spawn_blocking failed")
}

/// Verify a password against a stored hash (non-blocking, constant-time).
#[must_use = "password verification result must be checked"]
pub async fn verify_password(
    password: String,
    hash: String,
) -> Result<bool, argon2::password_hash::Error> {
    tokio::task::spawn_blocking(move || {
        let password = Zeroizing::new(password);
        let parsed_hash = PasswordHash::new(&hash)?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    })
    .await
    .expect("spawn_blocking failed")
}
