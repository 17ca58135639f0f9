//! Activation and account commands.

use std::sync::Arc;

use serde_json::{json, Value};
use timeld_gateway::token;
use timeld_types::AccountName;
use tracing::debug;

use super::{authorization, parse_param, str_param, to_value};
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// Request an activation code for `{account, email}`.
///
/// The code goes to the outbox; only the sealed token is returned.
pub async fn request_activation(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account: AccountName = parse_param(params, "account")?;
    let email = str_param(params, "email")?;

    let sealed = state.credentials.request_activation(&account, email).await?;
    Ok(json!({ "token": sealed }))
}

/// Activate a transport key with `{account, token, code?}`.
///
/// With `code`, `token` is the sealed token from `request_activation`;
/// without, it is the already unsealed activation token.
pub async fn activate(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account: AccountName = parse_param(params, "account")?;
    let token = str_param(params, "token")?;

    let signed = match params.get("code") {
        None | Some(Value::Null) => token.to_string(),
        Some(code) => {
            let code = code
                .as_u64()
                .and_then(|c| u32::try_from(c).ok())
                .ok_or_else(|| RpcError::bad_request("'code' must be a number"))?;
            token::unseal(token, code).await?
        }
    };

    let key = state.credentials.activate(&account, &signed).await?;
    debug!(account = %account, "Activated over RPC");
    to_value(&key)
}

/// The caller's own account record.
pub async fn get_account(state: &Arc<DaemonState>, params: &Value) -> Result {
    let account = state
        .guard
        .verify_user(authorization(params)?, None)
        .await?;
    to_value(&account)
}
