//! Timesheet and project reports.

use std::sync::Arc;

use futures_util::TryStreamExt;
use serde_json::{json, Value};
use timeld_types::{OwnedId, Subject};

use super::{authorization, parse_param};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Report on `{id}`: the head subject, then timesheets and their entries.
pub async fn report(state: &Arc<DaemonState>, params: &Value) -> Result {
    let id: OwnedId = parse_param(params, "id")?;
    state
        .guard
        .verify_user(authorization(params)?, Some(&id))
        .await?;

    let subjects: Vec<Subject> = state.gateway.report(&id).await?.try_collect().await?;
    Ok(json!({ "subjects": subjects }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tenant;
    use crate::testing;

    #[tokio::test]
    async fn test_report_over_rpc() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = testing::state(dir.path()).await;
        let bearer = testing::bearer(&state, "acme").await;

        tenant::tenant_config(&state, &json!({"authorization": bearer, "timesheet": "acme/ts1"}))
            .await
            .expect("create");
        let ids = |value: Value| -> Vec<String> {
            value["subjects"]
                .as_array()
                .expect("subjects")
                .iter()
                .map(|s| s["@id"].as_str().expect("id").to_string())
                .collect()
        };

        let value = report(&state, &json!({"authorization": bearer, "id": "acme/ts1"}))
            .await
            .expect("report");
        assert_eq!(ids(value), vec!["acme/ts1"]);

        let err = report(&state, &json!({"authorization": bearer, "id": "acme/missing"}))
            .await
            .expect_err("missing");
        assert_eq!(err.code, -32004);
        state.gateway.close().await;
    }
}
