//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC 2.0 calls to the command handlers.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use timeld_gateway::GatewayError;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Stable error name.
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn with_detail(code: i32, message: &str, detail: &str) -> Self {
        Self {
            code,
            message: message.to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Bad request (-32602): missing or malformed params.
    pub fn bad_request(detail: &str) -> Self {
        Self::with_detail(-32602, "BAD_REQUEST", detail)
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::with_detail(-32603, "INTERNAL_ERROR", detail)
    }

    /// Unauthorized (-32001).
    pub fn unauthorized(detail: &str) -> Self {
        Self::with_detail(-32001, "UNAUTHORIZED", detail)
    }

    /// Not found (-32004).
    pub fn not_found(detail: &str) -> Self {
        Self::with_detail(-32004, "NOT_FOUND", detail)
    }

    /// Conflict (-32009).
    pub fn conflict(detail: &str) -> Self {
        Self::with_detail(-32009, "CONFLICT", detail)
    }
}

impl From<GatewayError> for RpcError {
    fn from(err: GatewayError) -> Self {
        match &err {
            GatewayError::BadRequest(detail) => Self::bad_request(detail),
            GatewayError::Unauthorized(detail) => Self::unauthorized(detail),
            GatewayError::NotFound(detail) => Self::not_found(detail),
            GatewayError::Conflict(detail) => Self::conflict(detail),
            _ => {
                warn!("Request failed: {}", err);
                Self::internal_error(&err.to_string())
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);

        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = handle_line(&state, &line).await;
        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse and dispatch one request line.
pub async fn handle_line(state: &Arc<DaemonState>, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) if request.jsonrpc == "2.0" => dispatch_request(state, request).await,
        Ok(request) => RpcResponse::error(request.id, RpcError::invalid_request()),
        Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
    }
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();
    let params = &request.params;

    debug!("Dispatching RPC method: {}", method);

    let result = match method {
        // Activation (no bearer)
        "request_activation" => commands::account::request_activation(state, params).await,
        "activate" => commands::account::activate(state, params).await,

        // Authenticated
        "get_account" => commands::account::get_account(state, params).await,
        "tenant_config" => commands::tenant::tenant_config(state, params).await,
        "write" => commands::tenant::write(state, params).await,
        "report" => commands::report::report(state, params).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
