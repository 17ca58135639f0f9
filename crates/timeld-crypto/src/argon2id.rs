//! Argon2id key derivation.
//!
//! Activation codes carry only ~20 bits of entropy, so the key that seals an
//! activation token is stretched with Argon2id to make offline guessing of
//! the code expensive within the token's short lifetime.

use argon2::{Algorithm, Argon2, Params, Version};

use crate::{CryptoError, Result};

/// Argon2id parameters for activation-code keys.
/// m=19 MiB, t=2 iterations, p=1 lane.
pub const CODE_M_COST: u32 = 19456;
pub const CODE_T_COST: u32 = 2;
pub const CODE_P_COST: u32 = 1;
pub const KEY_LEN: usize = 32;

/// Salt length in bytes.
pub const SALT_LEN: usize = 16;

/// Derive a 32-byte key from an activation code.
pub fn derive_code_key(code: &[u8], salt: &[u8]) -> Result<[u8; KEY_LEN]> {
    let params = Params::new(CODE_M_COST, CODE_T_COST, CODE_P_COST, Some(KEY_LEN))
        .map_err(|e| CryptoError::Argon2(e.to_string()))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(code, salt, &mut output)
        .map_err(|e| CryptoError::Argon2(e.to_string()))?;

    Ok(output)
}

/// Generate a random salt for Argon2id.
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut salt);
    salt
}
