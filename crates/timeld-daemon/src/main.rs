//! timeld: the multi-tenant timesheet gateway daemon.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! gateway via JSON-RPC over a Unix socket in the data directory.

mod commands;
mod config;
mod outbox;
mod rpc;

use std::sync::Arc;

use timeld_gateway::{CredentialService, Gateway, Guard, LocalKeyProvider};
use timeld_replica::{SqliteReplica, SqliteSubstrate};
use tracing::{error, info};

use crate::config::GatewayConfig;
use crate::outbox::OutboxNotifier;
use crate::rpc::RpcServer;

/// Credential service as wired in the daemon.
pub type Credentials = CredentialService<SqliteReplica, OutboxNotifier, LocalKeyProvider>;

/// Daemon-wide shared state.
pub struct DaemonState {
    pub config: GatewayConfig,
    pub gateway: Arc<Gateway<SqliteSubstrate>>,
    pub guard: Guard<SqliteSubstrate>,
    pub credentials: Credentials,
}

impl DaemonState {
    /// Open the root domain and wire the services around it.
    pub async fn start(config: GatewayConfig) -> anyhow::Result<Arc<Self>> {
        let data_dir = config.data_dir();
        std::fs::create_dir_all(&data_dir)?;

        let secret = config.load_or_create_secret()?;
        let options = config.gateway_options(secret.as_slice());
        info!(
            domain = %options.domain,
            identity = %options.identity,
            genesis = options.genesis,
            "Opening root domain"
        );
        let gateway = Gateway::initialise(SqliteSubstrate::new(), options).await?;

        let credentials = CredentialService::new(
            gateway.accounts(),
            secret.as_slice(),
            OutboxNotifier::new(config.outbox_path()),
            LocalKeyProvider::new(config.transport.endpoint.clone()),
        );

        Ok(Arc::new(Self {
            guard: Guard::new(gateway.clone()),
            gateway,
            credentials,
            config,
        }))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = GatewayConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("timeld={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("timeld gateway starting");

    // 3. Open the gateway
    let state = DaemonState::start(config).await?;

    // 4. Run the RPC server until shutdown
    let socket_path = state.config.data_dir().join("gateway.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    info!("Gateway shutting down gracefully");
    state.gateway.close().await;

    // Clean up socket file
    let _ = std::fs::remove_file(&socket_path);

    info!("Gateway stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use serde_json::{json, Value};
    use timeld_gateway::auth::sign_access_token;
    use timeld_types::TransportKey;

    use super::*;
    use crate::outbox::OutboxEntry;

    pub async fn state(dir: &Path) -> Arc<DaemonState> {
        let mut config = GatewayConfig::default();
        config.storage.data_dir = dir.to_string_lossy().into_owned();
        config.gateway.domain = "gw.example.org".to_string();
        config.gateway.status_timeout_secs = 5;
        config.transport.endpoint = "wss://relay.example.org".to_string();
        DaemonState::start(config).await.expect("daemon state")
    }

    /// Most recent code the outbox holds for `email`.
    pub fn outbox_code(state: &DaemonState, email: &str) -> u32 {
        std::fs::read_to_string(state.config.outbox_path())
            .expect("outbox")
            .lines()
            .map(|line| serde_json::from_str::<OutboxEntry>(line).expect("entry"))
            .filter(|entry| entry.email == email)
            .last()
            .expect("code for email")
            .code
    }

    /// Activate `account` through the RPC handlers and return a bearer.
    pub async fn bearer(state: &Arc<DaemonState>, account: &str) -> Value {
        let email = format!("{account}@example.com");
        let requested = commands::account::request_activation(
            state,
            &json!({"account": account, "email": email}),
        )
        .await
        .expect("request activation");
        let code = outbox_code(state, &email);
        let key = commands::account::activate(
            state,
            &json!({"account": account, "token": requested["token"], "code": code}),
        )
        .await
        .expect("activate");
        let key: TransportKey = serde_json::from_value(key).expect("transport key");
        json!(format!(
            "Bearer {}",
            sign_access_token(&key, 300).expect("access token")
        ))
    }
}
