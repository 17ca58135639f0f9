//! # timeld-types
//!
//! Shared domain types used across the timeld workspace: identifiers,
//! graph subjects and updates, the account view over the root domain, and
//! domain/client configuration.

pub mod account;
pub mod config;
pub mod ids;
pub mod subject;
pub mod vocab;

pub use account::{Account, TransportKey};
pub use config::{ClientConfig, DomainConfig, TransportConfig};
pub use ids::{AccountName, IdError, OwnedId};
pub use subject::{Subject, Update};

/// Lifetime of an activation token in seconds (10 minutes).
pub const ACTIVATION_TTL_SECS: u64 = 10 * 60;

/// Smallest activation code. Codes never start with a zero.
pub const ACTIVATION_CODE_MIN: u32 = 111_111;

/// Largest activation code.
pub const ACTIVATION_CODE_MAX: u32 = 999_999;

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
