//! Activation code outbox.
//!
//! The daemon does not send mail itself. Codes are appended as JSON lines
//! to an outbox file that an external mailer drains.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use timeld_gateway::{GatewayError, Notifier};
use timeld_types::unix_now;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

/// One queued activation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub email: String,
    pub code: u32,
    pub issued_at: u64,
}

/// Appends activation codes to a JSON-lines file.
pub struct OutboxNotifier {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl OutboxNotifier {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }
}

impl Notifier for OutboxNotifier {
    async fn send_activation_code(&self, email: &str, code: u32) -> timeld_gateway::Result<()> {
        let entry = OutboxEntry {
            email: email.to_string(),
            code,
            issued_at: unix_now(),
        };
        let mut line = serde_json::to_string(&entry).map_err(notify_error)?;
        line.push('\n');

        // Lines from concurrent requests must not interleave.
        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(notify_error)?;
        file.write_all(line.as_bytes()).await.map_err(notify_error)?;
        file.flush().await.map_err(notify_error)?;
        debug!("Queued activation code in {:?}", self.path);
        Ok(())
    }
}

fn notify_error(e: impl std::fmt::Display) -> GatewayError {
    GatewayError::Notify(e.to_string())
}
