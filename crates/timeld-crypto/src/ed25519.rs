//! Ed25519 signing and verification (RFC 8032).
//!
//! Used for:
//! - Activation tokens signed by the gateway
//! - Access tokens signed by account keys minted at activation
//!
//! This module wraps `ed25519-dalek` with gateway-specific constructors.

use ed25519_dalek::{Signer, Verifier};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// An Ed25519 signing key (private key). Zeroized on drop by `ed25519-dalek`.
pub struct SigningKey {
    inner: ed25519_dalek::SigningKey,
}

impl Clone for SigningKey {
    fn clone(&self) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(&self.inner.to_bytes()),
        }
    }
}

/// An Ed25519 verification key (public key).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyingKey {
    inner: ed25519_dalek::VerifyingKey,
}

/// An Ed25519 signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl SigningKey {
    /// Generate a new random signing key.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            inner: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Create a signing key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self {
            inner: ed25519_dalek::SigningKey::from_bytes(bytes),
        }
    }

    /// Derive a signing key from a master secret under a BLAKE3 context.
    pub fn derive(context: &str, secret: &[u8]) -> Self {
        let seed = Zeroizing::new(crate::blake3::derive_key(context, secret));
        Self::from_bytes(&seed)
    }

    /// Parse a hex-encoded 32-byte signing key.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = Zeroizing::new(
            hex::decode(encoded).map_err(|e| CryptoError::InvalidInput(e.to_string()))?,
        );
        let seed: [u8; 32] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: 32,
                    actual: bytes.len(),
                })?;
        Ok(Self::from_bytes(&seed))
    }

    /// Hex encoding of the secret bytes, zeroized when dropped.
    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.inner.to_bytes()))
    }

    /// Get the corresponding verifying key.
    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey {
            inner: self.inner.verifying_key(),
        }
    }

    /// Sign a message.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            inner: self.inner.sign(message),
        }
    }
}

impl VerifyingKey {
    /// Create a verifying key from raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let inner = ed25519_dalek::VerifyingKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Parse a hex-encoded verifying key.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let bytes = hex::decode(encoded).map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 32,
                actual: bytes.len(),
            })?;
        Self::from_bytes(&arr)
    }

    /// Get the raw bytes of this verifying key.
    pub fn to_bytes(&self) -> [u8; 32] {
        self.inner.to_bytes()
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.inner.as_bytes())
    }

    /// Verify a signature on a message.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<()> {
        self.inner
            .verify(message, &signature.inner)
            .map_err(|_| CryptoError::SignatureVerification)
    }
}

impl Signature {
    /// Create a signature from raw bytes.
    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            inner: ed25519_dalek::Signature::from_bytes(bytes),
        }
    }

    /// Create a signature from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength {
                expected: 64,
                actual: bytes.len(),
            })?;
        Ok(Self::from_bytes(&arr))
    }

    /// Get the raw bytes of this signature.
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKey")
            .field("public", &self.verifying_key())
            .finish()
    }
}
