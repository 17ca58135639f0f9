//! # timeld-gateway
//!
//! The multi-tenant gateway core: lifecycle of per-timesheet tenant domains
//! next to one root domain of accounts, plus the credentials that let
//! clients join those domains directly.
//!
//! - [`gateway`]: the [`Gateway`] owning the root replica and the tenant table
//! - [`accounts`]: account records in the root domain
//! - [`activation`]: activation codes, gateway-signed tokens, key activation
//! - [`auth`]: bearer verification and per-write access control
//! - [`report`]: ordered subject streams for timesheets and projects
//! - [`token`]: compact signed tokens and code-sealed payloads
//! - [`keys`] / [`notify`]: the transport-key and notification collaborators
//!
//! ## Activation flow
//!
//! 1. A client asks for activation of `account` with `email`.
//! 2. The gateway signs `{sub, email, exp}` and seals the token under a
//!    fresh 6-digit code. The sealed token goes back to the client; the
//!    code goes out through the [`Notifier`].
//! 3. The client unseals the token with the code and presents it to
//!    activate a key. The gateway records the email and the new key's
//!    public half on the account and returns the [`TransportKey`].
//! 4. The client signs short-lived access tokens with that key.
//!
//! [`TransportKey`]: timeld_types::TransportKey

pub mod accounts;
pub mod activation;
pub mod auth;
pub mod gateway;
pub mod keys;
pub mod notify;
pub mod report;
pub mod token;
mod watcher;

pub use accounts::AccountStore;
pub use activation::{Activation, CredentialService};
pub use auth::Guard;
pub use gateway::{Gateway, GatewayOptions, TenantConfig};
pub use keys::{KeyProvider, LocalKeyProvider};
pub use notify::{MemoryNotifier, Notifier};

use timeld_crypto::CryptoError;
use timeld_replica::ReplicaError;
use timeld_types::IdError;

/// Gateway error types.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Malformed identifier, email or request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Unregistered email, bad or expired token, or insufficient permission.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Genesis requested against a tombstoned tenant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown owned entity.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("replica error: {0}")]
    Replica(#[from] ReplicaError),

    #[error("cryptographic error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("notification failed: {0}")]
    Notify(String),

    #[error("key provider failed: {0}")]
    KeyProvider(String),
}

impl From<IdError> for GatewayError {
    fn from(e: IdError) -> Self {
        Self::BadRequest(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;
    use std::sync::Arc;

    use timeld_replica::SqliteSubstrate;
    use timeld_types::TransportConfig;

    use crate::{Gateway, GatewayOptions};

    pub fn options(dir: &Path) -> GatewayOptions {
        GatewayOptions {
            domain: "gw.example.org".to_string(),
            data_dir: dir.to_path_buf(),
            identity: "gw-test".to_string(),
            genesis: true,
            transport: TransportConfig {
                endpoint: "wss://relay.example.org".to_string(),
                key: Some("gateway-transport-secret".to_string()),
            },
            status_timeout: Some(std::time::Duration::from_secs(5)),
        }
    }

    pub async fn gateway(dir: &Path) -> Arc<Gateway<SqliteSubstrate>> {
        Gateway::initialise(SqliteSubstrate::new(), options(dir))
            .await
            .expect("initialise gateway")
    }
}
