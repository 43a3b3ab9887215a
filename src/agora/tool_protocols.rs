//! Tool variant implementations.
//!
//! - [`LocalProcedure`]: an in-process Rust function, sync or async. Errors and
//!   panics are captured and never escape the turn.
//! - [`RemoteProcedure`]: forwards the call to a [`RemoteCapability`] keyed by a
//!   method name. [`HttpRpcEndpoint`] is the bundled JSON-RPC 2.0 over HTTP
//!   transport.
//!
//! # Example
//!
//! ```rust,no_run
//! use agora::tool_protocol::{Tool, ToolMetadata, ToolParameter, ToolParameterType};
//! use agora::tool_protocols::HttpRpcEndpoint;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let endpoint = HttpRpcEndpoint::new("http://localhost:8545/rpc")
//!     .with_timeout(Duration::from_secs(5));
//!
//! let tool = Tool::remote(
//!     ToolMetadata::new("funding_rate", "Current perpetual funding rate")
//!         .with_parameter(ToolParameter::new("symbol", ToolParameterType::String).required()),
//!     "market.funding_rate",
//!     Arc::new(endpoint),
//! );
//! assert_eq!(tool.name(), "funding_rate");
//! ```

use crate::agora::tool_protocol::{
    validate_arguments, ToolFailure, ToolInvocationError, ToolMetadata, ToolResult,
};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Type alias for synchronous tool functions.
pub type ToolFunction =
    Arc<dyn Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>> + Send + Sync>;

/// Type alias for asynchronous tool functions.
pub type AsyncToolFunction = Arc<
    dyn Fn(JsonValue) -> BoxFuture<'static, Result<ToolResult, Box<dyn Error + Send + Sync>>>
        + Send
        + Sync,
>;

enum LocalBody {
    Sync(ToolFunction),
    Async(AsyncToolFunction),
}

/// A tool backed by a Rust function running in the caller's task.
pub struct LocalProcedure {
    metadata: ToolMetadata,
    body: LocalBody,
}

impl LocalProcedure {
    pub fn sync(metadata: ToolMetadata, function: ToolFunction) -> Self {
        Self {
            metadata,
            body: LocalBody::Sync(function),
        }
    }

    pub fn asynchronous(metadata: ToolMetadata, function: AsyncToolFunction) -> Self {
        Self {
            metadata,
            body: LocalBody::Async(function),
        }
    }

    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    pub fn is_async(&self) -> bool {
        matches!(self.body, LocalBody::Async(_))
    }

    pub async fn invoke(&self, arguments: JsonValue) -> Result<ToolResult, ToolInvocationError> {
        let name = self.metadata.name.as_str();
        let arguments = validate_arguments(&self.metadata.parameters, arguments)
            .map_err(|msg| ToolInvocationError::new(name, ToolFailure::InvalidArguments(msg)))?;

        let outcome = match &self.body {
            LocalBody::Sync(function) => {
                std::panic::catch_unwind(AssertUnwindSafe(|| function(arguments)))
            }
            LocalBody::Async(function) => {
                // The future is built inside the guard too: a panic while
                // constructing it is just as fatal as one while polling.
                match std::panic::catch_unwind(AssertUnwindSafe(|| function(arguments))) {
                    Ok(future) => AssertUnwindSafe(future).catch_unwind().await,
                    Err(payload) => Err(payload),
                }
            }
        };

        match outcome {
            Ok(result) => settle(name, result),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("tool '{}' panicked: {}", name, message);
                Err(ToolInvocationError::new(name, ToolFailure::Panicked(message)))
            }
        }
    }
}

/// Fold a tool function's return into the uniform error type.
fn settle(
    name: &str,
    result: Result<ToolResult, Box<dyn Error + Send + Sync>>,
) -> Result<ToolResult, ToolInvocationError> {
    match result {
        Ok(result) if result.success => Ok(result),
        Ok(result) => Err(ToolInvocationError::new(
            name,
            ToolFailure::Failed(
                result
                    .error
                    .unwrap_or_else(|| "tool reported failure".to_string()),
            ),
        )),
        Err(e) => Err(ToolInvocationError::new(
            name,
            ToolFailure::Failed(e.to_string()),
        )),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Errors from a remote capability transport.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcError {
    /// Connection, timeout or body read failure.
    Transport(String),
    /// The endpoint answered with a non-success HTTP status.
    Status(u16),
    /// The endpoint answered with a JSON-RPC `error` object.
    Remote { code: i64, message: String },
    /// The response was not a JSON-RPC 2.0 response.
    Malformed(String),
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::Transport(msg) => write!(f, "transport error: {}", msg),
            RpcError::Status(code) => write!(f, "endpoint returned status: {}", code),
            RpcError::Remote { code, message } => {
                write!(f, "remote error {}: {}", code, message)
            }
            RpcError::Malformed(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

impl Error for RpcError {}

/// An external request/response capability addressed by method name.
#[async_trait]
pub trait RemoteCapability: Send + Sync {
    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, RpcError>;
}

/// JSON-RPC 2.0 over HTTP POST.
pub struct HttpRpcEndpoint {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    next_id: AtomicU64,
}

impl HttpRpcEndpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: Duration::from_secs(30),
            next_id: AtomicU64::new(1),
        }
    }

    /// Override the default 30s request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Share a preconfigured client (proxies, pooling).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Pull the `result` out of a JSON-RPC 2.0 response body.
pub(crate) fn parse_rpc_response(body: JsonValue) -> Result<JsonValue, RpcError> {
    if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
        return Err(RpcError::Remote {
            code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
            message: error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error")
                .to_string(),
        });
    }
    match body.get("result") {
        Some(result) => Ok(result.clone()),
        None => Err(RpcError::Malformed(
            "response has neither result nor error".to_string(),
        )),
    }
}

#[async_trait]
impl RemoteCapability for HttpRpcEndpoint {
    async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params
            }))
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RpcError::Status(response.status().as_u16()));
        }

        let body: JsonValue = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;
        parse_rpc_response(body)
    }
}

/// A tool whose work happens behind a [`RemoteCapability`].
pub struct RemoteProcedure {
    metadata: ToolMetadata,
    method: String,
    endpoint: Arc<dyn RemoteCapability>,
}

impl RemoteProcedure {
    pub fn new(
        metadata: ToolMetadata,
        method: impl Into<String>,
        endpoint: Arc<dyn RemoteCapability>,
    ) -> Self {
        Self {
            metadata,
            method: method.into(),
            endpoint,
        }
    }

    pub fn metadata(&self) -> &ToolMetadata {
        &self.metadata
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub async fn invoke(&self, arguments: JsonValue) -> Result<ToolResult, ToolInvocationError> {
        let name = self.metadata.name.as_str();
        let arguments = validate_arguments(&self.metadata.parameters, arguments)
            .map_err(|msg| ToolInvocationError::new(name, ToolFailure::InvalidArguments(msg)))?;

        match self.endpoint.call(&self.method, arguments).await {
            Ok(output) => Ok(ToolResult::success(output)
                .with_metadata("method", JsonValue::String(self.method.clone()))),
            Err(RpcError::Remote { code, message }) => Err(ToolInvocationError::new(
                name,
                ToolFailure::Failed(format!("{} (code {})", message, code)),
            )),
            Err(e) => {
                log::warn!("remote tool '{}' via '{}': {}", name, self.method, e);
                Err(ToolInvocationError::new(
                    name,
                    ToolFailure::Transport(e.to_string()),
                ))
            }
        }
    }
}
