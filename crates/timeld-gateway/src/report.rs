//! Ordered subject streams for timesheets and projects.
//!
//! Every report starts with the head subject from the root domain, and
//! every timesheet is immediately followed by its entries. Tenant replicas
//! are only opened and read as the stream is drained.

use std::sync::Arc;

use futures_util::stream::{self, BoxStream, StreamExt, TryStreamExt};
use timeld_replica::{Replica, Substrate};
use timeld_types::{vocab, OwnedId, Subject};
use tracing::debug;

use crate::{Gateway, GatewayError, Result};

/// A lazily assembled report.
pub type Report = BoxStream<'static, Result<Subject>>;

impl<S: Substrate> Gateway<S> {
    /// Report on a timesheet or project.
    ///
    /// Fails with `NotFound` unless `id` is a timesheet or project in the
    /// root domain.
    pub async fn report(self: &Arc<Self>, id: &OwnedId) -> Result<Report> {
        let id_str = id.to_string();
        let head = self
            .root()
            .get(&id_str)
            .await?
            .ok_or_else(|| GatewayError::NotFound(format!("'{id}' not found")))?;

        if head.is_type(vocab::TIMESHEET) {
            debug!(timesheet = %id, "Timesheet report");
            return Ok(self.clone().timesheet_block(head, id.clone()));
        }

        if head.is_type(vocab::PROJECT) {
            let timesheets: Vec<Subject> = self
                .root()
                .select(Some(vocab::TIMESHEET))
                .await?
                .into_iter()
                .filter(|ts| ts.refs(vocab::PROJECT_REF).contains(&id_str.as_str()))
                .collect();
            debug!(project = %id, timesheets = timesheets.len(), "Project report");

            let gateway = self.clone();
            let blocks = stream::iter(timesheets).flat_map(move |ts| {
                match ts.id.parse::<OwnedId>() {
                    Ok(ts_id) => gateway.clone().timesheet_block(ts, ts_id),
                    // Not an owned timesheet: nothing to read entries from.
                    Err(_) => stream::once(async move { Ok(ts) }).boxed(),
                }
            });
            return Ok(stream::once(async move { Ok(head) }).chain(blocks).boxed());
        }

        Err(GatewayError::NotFound(format!(
            "'{id}' is not a timesheet or project"
        )))
    }

    /// The timesheet head followed by its entries.
    fn timesheet_block(self: Arc<Self>, head: Subject, ts_id: OwnedId) -> Report {
        stream::once(async move { Ok(head) })
            .chain(self.entries(ts_id))
            .boxed()
    }

    /// Entries of a timesheet, read when first polled.
    ///
    /// Only a live tenant, or one its account records as owned, is read.
    /// Anything else has no entries and is never opened from here.
    fn entries(self: Arc<Self>, ts_id: OwnedId) -> Report {
        stream::once(async move {
            let tenant = match self.live_tenant(&ts_id).await {
                Some(tenant) => tenant,
                None => {
                    let owned = self
                        .accounts()
                        .account(ts_id.account(), false)
                        .await?
                        .is_some_and(|account| account.owns(&ts_id));
                    if !owned || self.tombstone_exists(&ts_id).await {
                        debug!(timesheet = %ts_id, owned, "No tenant to read entries from");
                        return Ok::<_, GatewayError>(Vec::new());
                    }
                    self.open_tenant(&ts_id, false).await?
                }
            };
            let entries = tenant.select(Some(vocab::ENTRY)).await?;
            Ok(entries)
        })
        .map_ok(|entries| stream::iter(entries.into_iter().map(Ok)))
        .try_flatten()
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;
    use timeld_types::Update;

    fn ts(s: &str) -> OwnedId {
        s.parse().expect("owned id")
    }

    async fn ids(report: Report) -> Vec<String> {
        report
            .map(|subject| subject.expect("subject").id)
            .collect()
            .await
    }

    async fn add_entries(gateway: &Gateway<timeld_replica::SqliteSubstrate>, ts_id: &OwnedId, ids: &[&str]) {
        let tenant = gateway.live_tenant(ts_id).await.expect("live tenant");
        let mut update = Update::default();
        for id in ids {
            update = update.insert(Subject::typed(*id, vocab::ENTRY).with("duration", json!(60)));
        }
        tenant.write(update).await.expect("write entries");
    }

    #[tokio::test]
    async fn test_timesheet_report_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let id = ts("acme/ts1");
        gateway.resolve_tenant_config(&id).await.expect("create");
        add_entries(&gateway, &id, &["e2", "e1", "e3"]).await;

        let report = gateway.report(&id).await.expect("report");
        assert_eq!(ids(report).await, vec!["acme/ts1", "e2", "e1", "e3"]);
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_project_report_groups_entries_under_timesheets() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let (ts1, ts2, ts3) = (ts("acme/ts1"), ts("acme/ts2"), ts("acme/ts3"));
        for id in [&ts1, &ts2, &ts3] {
            gateway.resolve_tenant_config(id).await.expect("create");
        }
        add_entries(&gateway, &ts1, &["a1", "a2"]).await;
        add_entries(&gateway, &ts2, &["b1"]).await;
        add_entries(&gateway, &ts3, &["c1"]).await;

        gateway
            .write(
                Update::inserting(Subject::typed("acme/p1", vocab::PROJECT))
                    .insert(Subject::new("acme/ts2").with_ref(vocab::PROJECT_REF, "acme/p1"))
                    .insert(Subject::new("acme/ts1").with_ref(vocab::PROJECT_REF, "acme/p1")),
            )
            .await
            .expect("project");

        let report = gateway.report(&ts("acme/p1")).await.expect("report");
        // Timesheets in root read order; ts3 is not in the project.
        assert_eq!(
            ids(report).await,
            vec!["acme/p1", "acme/ts1", "a1", "a2", "acme/ts2", "b1"]
        );
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_report_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        assert!(matches!(
            gateway.report(&ts("acme/nothing")).await,
            Err(GatewayError::NotFound(_))
        ));

        gateway
            .write(Update::inserting(Subject::typed("acme/x", "Invoice")))
            .await
            .expect("write");
        assert!(matches!(
            gateway.report(&ts("acme/x")).await,
            Err(GatewayError::NotFound(_))
        ));
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_report_never_opens_unowned_timesheet() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let id = ts("acme/ts9");
        // A timesheet head written without going through creation.
        gateway
            .write(Update::inserting(Subject::typed("acme/ts9", vocab::TIMESHEET)))
            .await
            .expect("write head");

        let report = gateway.report(&id).await.expect("report");
        assert_eq!(ids(report).await, vec!["acme/ts9"]);
        assert!(gateway.live_tenant(&id).await.is_none());
        assert!(!id.storage_path(dir.path()).exists());

        // Creation still happens as genesis and records ownership.
        let resolved = gateway.resolve_tenant_config(&id).await.expect("resolve");
        assert!(resolved.created);
        let replica = gateway.live_tenant(&id).await.expect("live");
        assert!(replica.is_genesis().await.expect("genesis flag"));
        let account = gateway
            .accounts()
            .account(id.account(), false)
            .await
            .expect("get")
            .expect("account recorded");
        assert!(account.owns(&id));
        gateway.close().await;
    }

    #[tokio::test]
    async fn test_report_is_lazy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let gateway = testing::gateway(dir.path()).await;
        let id = ts("acme/ts1");
        gateway.resolve_tenant_config(&id).await.expect("create");
        add_entries(&gateway, &id, &["e1"]).await;

        let mut report = gateway.report(&id).await.expect("report");
        let head = report.next().await.expect("head").expect("ok");
        assert_eq!(head.id, "acme/ts1");

        // Entries written before the tenant is read still show up.
        add_entries(&gateway, &id, &["e2"]).await;
        let rest: Vec<String> = report.map(|s| s.expect("subject").id).collect().await;
        assert_eq!(rest, vec!["e1", "e2"]);
        gateway.close().await;
    }
}
