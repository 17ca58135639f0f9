//! ChaCha20-Poly1305 AEAD encryption (RFC 8439).
//!
//! Used to seal activation tokens under a key derived from the emailed code.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::{CryptoError, Result};

/// Nonce size for ChaCha20-Poly1305 (96 bits = 12 bytes).
pub const NONCE_SIZE: usize = 12;

/// Key size for ChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Authentication tag size (128 bits = 16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encrypt data with ChaCha20-Poly1305.
///
/// Returns ciphertext with the 16-byte authentication tag appended.
pub fn encrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Aead)
}

/// Decrypt data with ChaCha20-Poly1305.
///
/// Fails if the tag does not authenticate `ciphertext` and `aad` under `key`.
pub fn decrypt(
    key: &[u8; KEY_SIZE],
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Aead)
}

/// Generate a random nonce.
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce);
    nonce
}

/// Encrypt under a fresh random nonce, returning `nonce || ciphertext`.
pub fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let nonce = generate_nonce();
    let ciphertext = encrypt(key, &nonce, plaintext, aad)?;
    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a `nonce || ciphertext` blob produced by [`seal`].
pub fn open(key: &[u8; KEY_SIZE], sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::InvalidInput(format!(
            "sealed payload too short: {} bytes",
            sealed.len()
        )));
    }
    let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
    let mut nonce_arr = [0u8; NONCE_SIZE];
    nonce_arr.copy_from_slice(nonce);
    decrypt(key, &nonce_arr, ciphertext, aad)
}
