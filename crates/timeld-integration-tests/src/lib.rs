//! Integration test fixtures for the timeld gateway.
//!
//! The tests under `tests/` drive complete flows across the replica,
//! gateway and credential crates on a real on-disk SQLite substrate.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p timeld-integration-tests
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use timeld_gateway::auth::sign_access_token;
use timeld_gateway::token;
use timeld_gateway::{
    CredentialService, Gateway, GatewayOptions, LocalKeyProvider, MemoryNotifier,
};
use timeld_replica::{SqliteReplica, SqliteSubstrate};
use timeld_types::ids::validate_email;
use timeld_types::{AccountName, TransportConfig, TransportKey};

pub const DOMAIN: &str = "timesheets.example.org";
pub const ENDPOINT: &str = "wss://relay.example.org";
pub const SECRET: [u8; 32] = [42u8; 32];

pub type Credentials = CredentialService<SqliteReplica, MemoryNotifier, LocalKeyProvider>;

pub fn options(dir: &Path) -> GatewayOptions {
    GatewayOptions {
        domain: DOMAIN.to_string(),
        data_dir: dir.to_path_buf(),
        identity: timeld_gateway::gateway::gateway_identity(&SECRET),
        genesis: true,
        transport: TransportConfig {
            endpoint: ENDPOINT.to_string(),
            key: Some("gateway-only".to_string()),
        },
        status_timeout: Some(Duration::from_secs(5)),
    }
}

pub async fn gateway(dir: &Path) -> Arc<Gateway<SqliteSubstrate>> {
    Gateway::initialise(SqliteSubstrate::new(), options(dir))
        .await
        .expect("initialise gateway")
}

/// A credential service over the gateway's accounts.
pub fn credentials(gateway: &Gateway<SqliteSubstrate>) -> (Credentials, MemoryNotifier) {
    let notifier = MemoryNotifier::new();
    let service = CredentialService::new(
        gateway.accounts(),
        &SECRET,
        notifier.clone(),
        LocalKeyProvider::new(ENDPOINT),
    );
    (service, notifier)
}

pub fn name(s: &str) -> AccountName {
    AccountName::new(s).expect("account name")
}

/// Run the whole activation flow for `account` and `email`.
pub async fn activate(
    service: &Credentials,
    notifier: &MemoryNotifier,
    account: &str,
    email: &str,
) -> TransportKey {
    let sealed = service
        .request_activation(&name(account), email)
        .await
        .expect("request activation");
    let delivered_to = validate_email(email).expect("valid email");
    let code = notifier.last_code(&delivered_to).expect("code delivered");
    let signed = token::unseal(&sealed, code).await.expect("unseal");
    service
        .activate(&name(account), &signed)
        .await
        .expect("activate")
}

/// A bearer credential for an activated key.
pub fn bearer(key: &TransportKey) -> String {
    format!("Bearer {}", sign_access_token(key, 600).expect("access token"))
}

/// Poll `check` until it holds, for up to a second.
pub async fn eventually<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check().await, "condition not reached");
}
