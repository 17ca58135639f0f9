//! Tenant configuration and root-domain writes.

use std::sync::Arc;

use serde_json::{json, Value};
use timeld_types::{OwnedId, Update};

use super::{authorization, parse_param, to_value};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Client configuration for `{timesheet}`, creating the tenant domain if
/// the caller's account does not own it yet.
pub async fn tenant_config(state: &Arc<DaemonState>, params: &Value) -> Result {
    let ts_id: OwnedId = parse_param(params, "timesheet")?;
    state
        .guard
        .verify_user(authorization(params)?, Some(&ts_id))
        .await?;

    let config = state.gateway.resolve_tenant_config(&ts_id).await?;
    to_value(&config)
}

/// Apply a checked `{update}` to the root domain.
pub async fn write(state: &Arc<DaemonState>, params: &Value) -> Result {
    let update: Update = params
        .get("update")
        .cloned()
        .ok_or_else(|| RpcError::bad_request("missing 'update' param"))
        .and_then(|v| {
            serde_json::from_value(v)
                .map_err(|e| RpcError::bad_request(&format!("invalid 'update': {e}")))
        })?;
    let account = state
        .guard
        .verify_user(authorization(params)?, None)
        .await?;

    state.guard.check_write(&account, &update).await?;
    state.gateway.write(update).await?;
    Ok(json!({ "ok": true }))
}
