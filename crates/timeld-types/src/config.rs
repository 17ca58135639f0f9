//! Domain and client configuration.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Transport settings for joining a domain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct TransportConfig {
    /// Endpoint clients and replicas connect to.
    pub endpoint: String,
    /// Secret transport key. Present only in the gateway's own configs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Configuration used to open or join a replica of one domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Identity of the opening process.
    #[serde(rename = "@id")]
    pub identity: String,
    #[serde(rename = "@domain")]
    pub domain: String,
    /// Whether this replica creates the domain.
    pub genesis: bool,
    /// Shared JSON-LD context.
    #[serde(rename = "@context")]
    pub context: Value,
    pub transport: TransportConfig,
}

/// Configuration handed to clients joining a tenant domain directly.
///
/// Derived from a [`DomainConfig`] with the gateway identity and transport
/// secret removed; clients always join an existing domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
#[ts(export)]
pub struct ClientConfig {
    #[serde(rename = "@domain")]
    pub domain: String,
    pub genesis: bool,
    #[serde(rename = "@context")]
    #[ts(type = "Record<string, unknown>")]
    pub context: Value,
    pub transport: TransportConfig,
}

impl DomainConfig {
    /// The client view of this configuration.
    pub fn for_client(&self) -> ClientConfig {
        ClientConfig {
            domain: self.domain.clone(),
            genesis: false,
            context: self.context.clone(),
            transport: TransportConfig {
                endpoint: self.transport.endpoint.clone(),
                key: None,
            },
        }
    }
}

/// The JSON-LD context shared by every domain of a gateway.
pub fn domain_context(gateway_domain: &str) -> Value {
    json!({
        "@base": format!("https://{gateway_domain}/"),
        "@vocab": format!("https://{gateway_domain}/#"),
    })
}
