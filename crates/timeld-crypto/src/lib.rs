//! # timeld-crypto
//!
//! Cryptographic primitives for the timeld gateway.
//!
//! The suite is fixed; there is no algorithm negotiation.
//!
//! ## Modules
//!
//! - [`blake3`]: Domain-separated BLAKE3 key derivation
//! - [`ed25519`]: Ed25519 signing and verification (RFC 8032)
//! - [`chacha20`]: ChaCha20-Poly1305 AEAD encryption (RFC 8439)
//! - [`argon2id`]: Key derivation from low-entropy secrets (activation codes)

pub mod argon2id;
pub mod blake3;
pub mod chacha20;
pub mod ed25519;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Ed25519 signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// AEAD encryption or decryption failed (authentication tag mismatch).
    #[error("AEAD operation failed")]
    Aead,

    /// Invalid key length.
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    /// Argon2id hashing failed.
    #[error("argon2id error: {0}")]
    Argon2(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
