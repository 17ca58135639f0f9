//! Out-of-band delivery of activation codes.

use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::Result;

/// Sends activation codes to email addresses.
///
/// Failures should be reported as [`crate::GatewayError::Notify`].
pub trait Notifier: Send + Sync + 'static {
    fn send_activation_code(&self, email: &str, code: u32)
        -> impl Future<Output = Result<()>> + Send;
}

/// A notifier that keeps every sent code in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<(String, u32)>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(email, code)` sent so far, oldest first.
    pub fn sent(&self) -> Vec<(String, u32)> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// The most recent code sent to `email`.
    pub fn last_code(&self, email: &str) -> Option<u32> {
        self.sent()
            .into_iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, code)| code)
    }
}

impl Notifier for MemoryNotifier {
    async fn send_activation_code(&self, email: &str, code: u32) -> Result<()> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((email.to_string(), code));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_notifier_records_codes() {
        let notifier = MemoryNotifier::new();
        notifier
            .send_activation_code("a@acme.com", 111_111)
            .await
            .expect("send");
        notifier
            .send_activation_code("a@acme.com", 222_222)
            .await
            .expect("send");

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.last_code("a@acme.com"), Some(222_222));
        assert_eq!(notifier.last_code("b@acme.com"), None);
    }
}
