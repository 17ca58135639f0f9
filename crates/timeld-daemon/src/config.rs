//! Gateway configuration file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use timeld_gateway::gateway::gateway_identity;
use timeld_gateway::GatewayOptions;
use timeld_types::TransportConfig;
use tracing::info;
use zeroize::Zeroizing;

/// File the generated gateway secret is kept in.
const SECRET_FILE: &str = "gateway.secret";

/// Complete gateway configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub gateway: ServiceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transport: TransportSettings,
    #[serde(default)]
    pub advanced: AdvancedConfig,
}

/// Root domain settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root domain name. Tenant domains live under it.
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Hex-encoded 32-byte gateway secret. Empty = generated on first start.
    #[serde(default)]
    pub secret: String,
    /// Create the root domain here rather than joining an existing one.
    #[serde(default = "default_true")]
    pub genesis: bool,
    /// Outer deadline for replica status waits. 0 = wait forever.
    #[serde(default = "default_status_timeout")]
    pub status_timeout_secs: u64,
}

/// Storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory. Empty = platform default.
    #[serde(default)]
    pub data_dir: String,
}

/// Transport settings handed to replicas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    /// Endpoint clients connect to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// The gateway's own transport key. Never sent to clients.
    #[serde(default)]
    pub key: String,
}

/// Advanced configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvancedConfig {
    /// Log level: "debug" | "info" | "warn" | "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Activation code outbox. Empty = $data_dir/outbox.jsonl.
    #[serde(default)]
    pub outbox_path: String,
}

fn default_domain() -> String {
    "timeld.local".to_string()
}

fn default_true() -> bool {
    true
}

fn default_status_timeout() -> u64 {
    30
}

fn default_endpoint() -> String {
    "ws://localhost:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            secret: String::new(),
            genesis: true,
            status_timeout_secs: default_status_timeout(),
        }
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            key: String::new(),
        }
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            outbox_path: String::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from the default config file location.
    ///
    /// Falls back to defaults if file does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: GatewayConfig = toml::from_str(&content)
                .with_context(|| format!("parsing {}", config_path.display()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Get the data directory path.
    pub fn data_dir(&self) -> PathBuf {
        if self.storage.data_dir.is_empty() {
            Self::default_data_dir()
        } else {
            PathBuf::from(&self.storage.data_dir)
        }
    }

    /// Where activation codes are written for delivery.
    pub fn outbox_path(&self) -> PathBuf {
        if self.advanced.outbox_path.is_empty() {
            self.data_dir().join("outbox.jsonl")
        } else {
            PathBuf::from(&self.advanced.outbox_path)
        }
    }

    pub fn status_timeout(&self) -> Option<Duration> {
        match self.gateway.status_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// The gateway secret: from config if set, else from the data
    /// directory, generating and persisting one on first start.
    pub fn load_or_create_secret(&self) -> anyhow::Result<Zeroizing<[u8; 32]>> {
        if !self.gateway.secret.is_empty() {
            return parse_secret(&self.gateway.secret).context("invalid [gateway] secret");
        }

        let path = self.data_dir().join(SECRET_FILE);
        if path.exists() {
            let content = Zeroizing::new(std::fs::read_to_string(&path)?);
            return parse_secret(content.trim())
                .with_context(|| format!("invalid secret in {}", path.display()));
        }

        let mut secret = Zeroizing::new([0u8; 32]);
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut secret[..]);
        write_secret(&path, &secret)?;
        info!("Generated gateway secret at {:?}", path);
        Ok(secret)
    }

    /// Static options for the gateway core.
    pub fn gateway_options(&self, secret: &[u8]) -> GatewayOptions {
        let key = Some(self.transport.key.clone()).filter(|key| !key.is_empty());
        GatewayOptions {
            domain: self.gateway.domain.clone(),
            data_dir: self.data_dir(),
            identity: gateway_identity(secret),
            genesis: self.gateway.genesis,
            transport: TransportConfig {
                endpoint: self.transport.endpoint.clone(),
                key,
            },
            status_timeout: self.status_timeout(),
        }
    }

    /// Get the config file path.
    fn config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("TIMELD_DATA_DIR") {
            return PathBuf::from(dir).join("config.toml");
        }
        Self::default_data_dir().join("config.toml")
    }

    /// Platform-specific default data directory.
    fn default_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var("TIMELD_DATA_DIR") {
            return PathBuf::from(dir);
        }
        #[cfg(target_os = "macos")]
        {
            dirs_fallback("Library/Application Support/timeld")
        }
        #[cfg(not(target_os = "macos"))]
        {
            dirs_fallback(".timeld")
        }
    }
}

fn parse_secret(hex_str: &str) -> anyhow::Result<Zeroizing<[u8; 32]>> {
    let bytes = Zeroizing::new(hex::decode(hex_str)?);
    let mut secret = Zeroizing::new([0u8; 32]);
    if bytes.len() != secret.len() {
        anyhow::bail!("expected 32 bytes, got {}", bytes.len());
    }
    secret.copy_from_slice(&bytes);
    Ok(secret)
}

fn write_secret(path: &Path, secret: &[u8; 32]) -> anyhow::Result<()> {
    use std::io::Write;

    let encoded = Zeroizing::new(hex::encode(secret));
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(encoded.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

/// Fallback home directory resolution.
fn dirs_fallback(subpath: &str) -> PathBuf {
    std::env::var("HOME")
        .map(|h| PathBuf::from(h).join(subpath))
        .unwrap_or_else(|_| PathBuf::from("/tmp/timeld"))
}
