//! Root-domain watcher: keeps the tenant table in step with the
//! `timesheet` references recorded on accounts.

use std::sync::Weak;

use timeld_replica::Substrate;
use timeld_types::Update;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Gateway;

/// Spawn the watcher. It stops on shutdown, when the update channel
/// closes, or once the gateway is dropped.
pub(crate) fn spawn<S: Substrate>(
    gateway: Weak<Gateway<S>>,
    mut updates: broadcast::Receiver<Update>,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Root watcher started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                received = updates.recv() => {
                    let Some(gateway) = gateway.upgrade() else { break };
                    match received {
                        Ok(update) => gateway.on_root_update(&update).await,
                        Err(RecvError::Lagged(missed)) => {
                            warn!(missed, "Root watcher lagged, rescanning");
                            gateway.enliven_all().await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
        info!("Root watcher stopped");
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use timeld_replica::Replica;
    use timeld_types::{vocab, OwnedId, Subject, Update};

    use crate::testing;

    #[tokio::test]
    async fn test_deleted_reference_tombstones_tenant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let id: OwnedId = "acme/ts1".parse().expect("id");
        gateway.resolve_tenant_config(&id).await.expect("create");

        gateway
            .write(Update::deleting(
                Subject::new("acme").with_ref(vocab::TIMESHEET_REF, id.to_string()),
            ))
            .await
            .expect("delete reference");

        for _ in 0..100 {
            if gateway.tombstone_exists(&id).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gateway.tombstone_exists(&id).await);
        assert!(gateway.live_tenant(&id).await.is_none());
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_inserted_reference_opens_tenant() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let id: OwnedId = "acme/ts2".parse().expect("id");

        gateway
            .root()
            .write(Update::inserting(
                Subject::typed("acme", vocab::ACCOUNT).with_ref(vocab::TIMESHEET_REF, id.to_string()),
            ))
            .await
            .expect("insert reference");

        for _ in 0..100 {
            if gateway.live_tenant(&id).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gateway.live_tenant(&id).await.is_some());
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_deleting_unknown_reference_leaves_name_free() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let never: OwnedId = "acme/never".parse().expect("id");
        let marker: OwnedId = "acme/marker".parse().expect("id");

        gateway
            .write(Update::deleting(
                Subject::new("acme").with_ref(vocab::TIMESHEET_REF, never.to_string()),
            ))
            .await
            .expect("delete reference");
        // Updates are handled in order: once the marker is open, the
        // deletion has been seen.
        gateway
            .root()
            .write(Update::inserting(
                Subject::typed("acme", vocab::ACCOUNT)
                    .with_ref(vocab::TIMESHEET_REF, marker.to_string()),
            ))
            .await
            .expect("insert reference");
        for _ in 0..100 {
            if gateway.live_tenant(&marker).await.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(gateway.live_tenant(&marker).await.is_some());

        assert!(!gateway.tombstone_exists(&never).await);
        let created = gateway.resolve_tenant_config(&never).await.expect("create");
        assert!(created.created);
        gateway.close().await;
    }
}
