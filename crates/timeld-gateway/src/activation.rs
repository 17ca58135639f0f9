//! Activation codes and account-key activation.

use rand::Rng;
use serde::Serialize;
use timeld_crypto::blake3::contexts;
use timeld_crypto::ed25519::{SigningKey, VerifyingKey};
use timeld_replica::Replica;
use timeld_types::ids::validate_email;
use timeld_types::{
    unix_now, AccountName, TransportKey, ACTIVATION_CODE_MAX, ACTIVATION_CODE_MIN,
    ACTIVATION_TTL_SECS,
};
use tracing::info;

use crate::accounts::AccountStore;
use crate::keys::KeyProvider;
use crate::notify::Notifier;
use crate::token::{self, ActivationClaims, Expiring};
use crate::{GatewayError, Result};

/// A sealed activation token and the code that opens it.
///
/// Only the token may be returned to the requesting client; the code
/// travels through the [`Notifier`].
#[derive(Clone, Debug, Serialize)]
pub struct Activation {
    pub token: String,
    pub code: u32,
}

/// Issues and verifies activation tokens and activates account keys.
pub struct CredentialService<R, N, K> {
    accounts: AccountStore<R>,
    signing_key: SigningKey,
    notifier: N,
    keys: K,
}

impl<R: Replica, N: Notifier, K: KeyProvider> CredentialService<R, N, K> {
    /// The signing key is derived from the gateway secret.
    pub fn new(accounts: AccountStore<R>, secret: &[u8], notifier: N, keys: K) -> Self {
        Self {
            accounts,
            signing_key: SigningKey::derive(contexts::ACTIVATION_SIGNING_KEY, secret),
            notifier,
            keys,
        }
    }

    /// Public half of the activation signing key.
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Sign an activation token for `email` on `account` and seal it under a
    /// fresh code.
    ///
    /// An account with registered emails only accepts one of them; an
    /// account with none (or no account yet) accepts any valid email.
    pub async fn issue_activation(&self, account: &AccountName, email: &str) -> Result<Activation> {
        let email = validate_email(email)?;
        if let Some(existing) = self.accounts.account(account, false).await? {
            if !existing.accepts_email(&email) {
                return Err(GatewayError::Unauthorized(format!(
                    "email not registered for account '{account}'"
                )));
            }
        }

        let claims = ActivationClaims {
            sub: account.to_string(),
            email,
            exp: unix_now() + ACTIVATION_TTL_SECS,
        };
        let signed = token::sign(&claims, &self.signing_key)?;
        let code = rand::thread_rng().gen_range(ACTIVATION_CODE_MIN..=ACTIVATION_CODE_MAX);
        let token = token::seal(&signed, code).await?;
        Ok(Activation { token, code })
    }

    /// Issue an activation and send its code to `email`. Returns only the
    /// sealed token.
    pub async fn request_activation(&self, account: &AccountName, email: &str) -> Result<String> {
        let activation = self.issue_activation(account, email).await?;
        let email = validate_email(email)?;
        self.notifier
            .send_activation_code(&email, activation.code)
            .await?;
        info!(account = %account, "Activation code sent");
        Ok(activation.token)
    }

    /// Check an activation token's signature and expiry.
    pub fn verify(&self, token: &str) -> Result<ActivationClaims> {
        let claims: ActivationClaims = token::verify(token, &self.verifying_key())?;
        claims.check_expiry(unix_now())?;
        Ok(claims)
    }

    /// Activate a transport key for `account` with a verified token.
    ///
    /// Records the token's email on the account (creating it if needed),
    /// mints a key and stores its public record.
    pub async fn activate(&self, account: &AccountName, token: &str) -> Result<TransportKey> {
        let claims = self.verify(token)?;
        if claims.sub != account.as_str() {
            return Err(GatewayError::Unauthorized(format!(
                "token was not issued for account '{account}'"
            )));
        }
        if let Some(existing) = self.accounts.account(account, false).await? {
            if !existing.accepts_email(&claims.email) {
                return Err(GatewayError::Unauthorized(format!(
                    "email not registered for account '{account}'"
                )));
            }
        }

        let key = self.keys.mint(account).await?;
        self.accounts
            .register_key(account, &claims.email, &key)
            .await?;
        info!(account = %account, key_id = %key.key_id, "Account key activated");
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::LocalKeyProvider;
    use crate::notify::MemoryNotifier;
    use crate::testing;
    use timeld_replica::SqliteReplica;

    type Service = CredentialService<SqliteReplica, MemoryNotifier, LocalKeyProvider>;

    fn make_service(accounts: AccountStore<SqliteReplica>, secret: &[u8]) -> (Service, MemoryNotifier) {
        let notifier = MemoryNotifier::new();
        let service = CredentialService::new(
            accounts,
            secret,
            notifier.clone(),
            LocalKeyProvider::new("wss://relay.example.org"),
        );
        (service, notifier)
    }

    fn name(s: &str) -> AccountName {
        AccountName::new(s).expect("name")
    }

    #[tokio::test]
    async fn test_bootstrap_accepts_any_email() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let (service, _) = make_service(gateway.accounts(), &[1u8; 32]);

        let activation = service
            .issue_activation(&name("acme"), "Anyone@Example.com")
            .await
            .expect("bootstrap");
        assert!((ACTIVATION_CODE_MIN..=ACTIVATION_CODE_MAX).contains(&activation.code));

        let signed = token::unseal(&activation.token, activation.code).await.expect("unseal");
        let claims = service.verify(&signed).expect("verify");
        assert_eq!(claims.sub, "acme");
        assert_eq!(claims.email, "anyone@example.com");
        assert!(claims.exp > unix_now());
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_registered_emails_are_enforced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let (service, notifier) = make_service(gateway.accounts(), &[1u8; 32]);

        let sealed = service
            .request_activation(&name("acme"), "a@acme.com")
            .await
            .expect("request");
        let code = notifier.last_code("a@acme.com").expect("code sent");
        let signed = token::unseal(&sealed, code).await.expect("unseal");
        service.activate(&name("acme"), &signed).await.expect("activate");

        assert!(service
            .issue_activation(&name("acme"), "a@acme.com")
            .await
            .is_ok());
        assert!(matches!(
            service.issue_activation(&name("acme"), "b@acme.com").await,
            Err(GatewayError::Unauthorized(_))
        ));
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_invalid_email_is_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let (service, notifier) = make_service(gateway.accounts(), &[1u8; 32]);

        assert!(matches!(
            service.request_activation(&name("acme"), "not-an-email").await,
            Err(GatewayError::BadRequest(_))
        ));
        assert!(notifier.sent().is_empty());
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_and_expired_tokens() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let (service, _) = make_service(gateway.accounts(), &[1u8; 32]);
        let (other, _) = make_service(gateway.accounts(), &[2u8; 32]);

        let foreign = other
            .issue_activation(&name("acme"), "a@acme.com")
            .await
            .expect("issue");
        let foreign = token::unseal(&foreign.token, foreign.code).await.expect("unseal");
        assert!(matches!(
            service.verify(&foreign),
            Err(GatewayError::Unauthorized(_))
        ));

        let expired = ActivationClaims {
            sub: "acme".to_string(),
            email: "a@acme.com".to_string(),
            exp: unix_now() - 1,
        };
        let expired = token::sign(
            &expired,
            &SigningKey::derive(contexts::ACTIVATION_SIGNING_KEY, &[1u8; 32]),
        )
        .expect("sign");
        assert!(matches!(
            service.verify(&expired),
            Err(GatewayError::Unauthorized(_))
        ));
        assert!(matches!(
            service.verify("garbage"),
            Err(GatewayError::Unauthorized(_))
        ));
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_activate_checks_account() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let (service, _) = make_service(gateway.accounts(), &[1u8; 32]);

        let activation = service
            .issue_activation(&name("acme"), "a@acme.com")
            .await
            .expect("issue");
        let signed = token::unseal(&activation.token, activation.code).await.expect("unseal");

        assert!(matches!(
            service.activate(&name("fred"), &signed).await,
            Err(GatewayError::Unauthorized(_))
        ));

        let key = service.activate(&name("acme"), &signed).await.expect("activate");
        let account = gateway
            .accounts()
            .account(&name("acme"), false)
            .await
            .expect("get")
            .expect("created by activation");
        assert!(account.keys.contains(&key.key_id));
        assert!(account.emails.contains("a@acme.com"));
        gateway.close().await;
    }
}
