//! JSON-RPC command handlers.
//!
//! Each handler takes the daemon state and the request params and returns
//! the result value or an [`RpcError`]. Authenticated commands take the
//! bearer credential in `params.authorization`.

pub mod account;
pub mod report;
pub mod tenant;

use std::str::FromStr;

use serde_json::Value;

use crate::rpc::RpcError;

/// A required string parameter.
pub(crate) fn str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str, RpcError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| RpcError::bad_request(&format!("missing '{name}' param")))
}

/// A required parameter parsed from its string form.
pub(crate) fn parse_param<T>(params: &Value, name: &str) -> Result<T, RpcError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    str_param(params, name)?
        .parse()
        .map_err(|e: T::Err| RpcError::bad_request(&format!("invalid '{name}': {e}")))
}

/// The bearer credential.
pub(crate) fn authorization(params: &Value) -> Result<&str, RpcError> {
    str_param(params, "authorization")
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use timeld_types::OwnedId;

    #[test]
    fn test_params() {
        let params = json!({"timesheet": "acme/ts1", "bad": "acme", "n": 1});
        let id: OwnedId = parse_param(&params, "timesheet").expect("parse");
        assert_eq!(id.to_string(), "acme/ts1");

        assert_eq!(
            parse_param::<OwnedId>(&params, "bad").expect_err("not owned").code,
            -32602
        );
        assert_eq!(str_param(&params, "n").expect_err("not a string").code, -32602);
        assert_eq!(authorization(&params).expect_err("missing").code, -32602);
    }
}
