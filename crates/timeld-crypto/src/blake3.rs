//! Domain-separated BLAKE3 key derivation for the gateway.
//!
//! Signing keys, gateway identities and key ids are all derived with
//! [`derive_key`] under one of the registered [`contexts`].

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const ACTIVATION_SIGNING_KEY: &str = "timeld v1 activation-signing-key";
    pub const GATEWAY_IDENTITY: &str = "timeld v1 gateway-identity";
    pub const ACCOUNT_KEY_ID: &str = "timeld v1 account-key-id";
}

/// Derive a key using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string
/// * `key_material` - The input key material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}
