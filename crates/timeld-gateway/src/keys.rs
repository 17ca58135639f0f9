//! Transport-key minting.

use std::future::Future;

use timeld_crypto::blake3::{self, contexts};
use timeld_crypto::ed25519::SigningKey;
use timeld_types::{AccountName, TransportKey};
use tracing::debug;

use crate::Result;

/// Mints transport credentials for accounts.
pub trait KeyProvider: Send + Sync + 'static {
    fn mint(&self, account: &AccountName) -> impl Future<Output = Result<TransportKey>> + Send;
}

/// Mints a fresh Ed25519 key per activation.
#[derive(Clone, Debug)]
pub struct LocalKeyProvider {
    endpoint: String,
}

impl LocalKeyProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

/// Key record id for a public key: `account.<8 hex>`.
pub fn key_id(account: &AccountName, public_key: &[u8; 32]) -> String {
    let digest = blake3::derive_key(contexts::ACCOUNT_KEY_ID, public_key);
    format!("{account}.{}", hex::encode(&digest[..4]))
}

impl KeyProvider for LocalKeyProvider {
    async fn mint(&self, account: &AccountName) -> Result<TransportKey> {
        let key = SigningKey::generate();
        let public_key = key.verifying_key().to_bytes();
        let key_id = key_id(account, &public_key);
        debug!(account = %account, key_id = %key_id, "Minted transport key");
        Ok(TransportKey {
            key_id,
            account: account.to_string(),
            public_key,
            secret: key.to_hex().to_string(),
            endpoint: self.endpoint.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mint_key() {
        let account = AccountName::new("acme").expect("name");
        let provider = LocalKeyProvider::new("wss://relay.example.org");
        let key = provider.mint(&account).await.expect("mint");

        assert!(key.key_id.starts_with("acme."));
        assert_eq!(key.key_id.len(), "acme.".len() + 8);
        assert_eq!(key.endpoint, "wss://relay.example.org");

        let signing = SigningKey::from_hex(&key.secret).expect("secret is hex");
        assert_eq!(signing.verifying_key().to_bytes(), key.public_key);
    }

    #[tokio::test]
    async fn test_keys_are_fresh() {
        let account = AccountName::new("acme").expect("name");
        let provider = LocalKeyProvider::new("local");
        let a = provider.mint(&account).await.expect("mint");
        let b = provider.mint(&account).await.expect("mint");
        assert_ne!(a.key_id, b.key_id);
    }
}
