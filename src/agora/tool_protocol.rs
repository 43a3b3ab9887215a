//! Tools an agent may invoke during its turn.
//!
//! A [`Tool`] is a closed variant: either an in-process [`LocalProcedure`] or a
//! [`RemoteProcedure`] forwarded to an external capability. Both validate their
//! arguments against the declared [`ToolParameter`] list and both report every
//! failure as a [`ToolInvocationError`], so the agent loop never needs to know
//! which kind it is calling.
//!
//! ```text
//! Agent → ToolBelt → Tool ─┬─ LocalProcedure  (sync / async Rust fn)
//!                          └─ RemoteProcedure (RemoteCapability, e.g. JSON-RPC over HTTP)
//! ```
//!
//! # Example
//!
//! ```rust
//! use agora::tool_protocol::{
//!     Tool, ToolBelt, ToolMetadata, ToolParameter, ToolParameterType, ToolResult,
//! };
//!
//! let add = Tool::local(
//!     ToolMetadata::new("add", "Adds two numbers")
//!         .with_parameter(ToolParameter::new("a", ToolParameterType::Number).required())
//!         .with_parameter(ToolParameter::new("b", ToolParameterType::Number).required()),
//!     |params| {
//!         let a = params["a"].as_f64().unwrap_or(0.0);
//!         let b = params["b"].as_f64().unwrap_or(0.0);
//!         Ok(ToolResult::success(serde_json::json!({ "result": a + b })))
//!     },
//! );
//!
//! let mut belt = ToolBelt::new();
//! belt.register(add);
//! assert!(belt.contains("add"));
//! ```

use crate::agora::tool_protocols::{
    AsyncToolFunction, LocalProcedure, RemoteCapability, RemoteProcedure, ToolFunction,
};
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Represents the result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the tool execution was successful
    pub success: bool,
    /// The output data from the tool
    pub output: JsonValue,
    /// Optional error message if execution failed
    pub error: Option<String>,
    /// Metadata about the execution (timing, endpoint, etc.)
    pub metadata: HashMap<String, JsonValue>,
}

impl ToolResult {
    /// Convenience constructor for successful tool execution.
    pub fn success(output: JsonValue) -> Self {
        Self {
            success: true,
            output,
            error: None,
            metadata: HashMap::new(),
        }
    }

    /// Convenience constructor for failed tool execution.
    ///
    /// A failed result is reported to the caller as
    /// [`ToolFailure::Failed`], the same as a returned `Err`.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: JsonValue::Null,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Defines the type of a tool parameter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ToolParameterType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ToolParameterType {
    /// Whether `value` is an instance of this type. Integers are accepted
    /// wherever numbers are.
    pub fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            ToolParameterType::String => value.is_string(),
            ToolParameterType::Number => value.is_number(),
            ToolParameterType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false)
            }
            ToolParameterType::Boolean => value.is_boolean(),
            ToolParameterType::Array => value.is_array(),
            ToolParameterType::Object => value.is_object(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolParameterType::String => "string",
            ToolParameterType::Number => "number",
            ToolParameterType::Integer => "integer",
            ToolParameterType::Boolean => "boolean",
            ToolParameterType::Array => "array",
            ToolParameterType::Object => "object",
        }
    }
}

/// Defines a parameter for a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    #[serde(rename = "type")]
    pub param_type: ToolParameterType,
    pub description: Option<String>,
    pub required: bool,
    pub default: Option<JsonValue>,
}

impl ToolParameter {
    pub fn new(name: impl Into<String>, param_type: ToolParameterType) -> Self {
        Self {
            name: name.into(),
            param_type,
            description: None,
            required: false,
            default: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Value used when the caller omits an optional parameter.
    pub fn with_default(mut self, default: JsonValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Name, description and parameter schema of a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolMetadata {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ToolParameter) -> Self {
        self.parameters.push(param);
        self
    }

    /// One prompt line per tool, e.g.
    /// `- price_feed: Latest price (params: symbol: string (required))`.
    pub fn prompt_line(&self) -> String {
        if self.parameters.is_empty() {
            return format!("- {}: {}", self.name, self.description);
        }
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| {
                let mut s = format!("{}: {}", p.name, p.param_type.as_str());
                if p.required {
                    s.push_str(" (required)");
                }
                if let Some(desc) = &p.description {
                    s.push_str(&format!(" - {}", desc));
                }
                s
            })
            .collect();
        format!(
            "- {}: {} (params: {})",
            self.name,
            self.description,
            params.join(", ")
        )
    }
}

/// Why a tool invocation failed.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolFailure {
    /// No tool with that name is in the belt.
    NotFound,
    /// Arguments did not satisfy the parameter schema.
    InvalidArguments(String),
    /// The tool ran and reported an error.
    Failed(String),
    /// The wrapped function panicked.
    Panicked(String),
    /// The remote capability could not be reached or answered garbage.
    Transport(String),
    /// The call did not finish within the per-call timeout.
    Timeout(Duration),
}

/// Uniform error for every tool variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocationError {
    pub tool_name: String,
    pub cause: ToolFailure,
}

impl ToolInvocationError {
    pub fn new(tool_name: impl Into<String>, cause: ToolFailure) -> Self {
        Self {
            tool_name: tool_name.into(),
            cause,
        }
    }
}

impl fmt::Display for ToolInvocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.cause {
            ToolFailure::NotFound => write!(f, "Tool not found: {}", self.tool_name),
            ToolFailure::InvalidArguments(msg) => {
                write!(f, "Invalid arguments for '{}': {}", self.tool_name, msg)
            }
            ToolFailure::Failed(msg) => write!(f, "Tool '{}' failed: {}", self.tool_name, msg),
            ToolFailure::Panicked(msg) => {
                write!(f, "Tool '{}' panicked: {}", self.tool_name, msg)
            }
            ToolFailure::Transport(msg) => {
                write!(f, "Transport error calling '{}': {}", self.tool_name, msg)
            }
            ToolFailure::Timeout(d) => write!(
                f,
                "Tool '{}' timed out after {}ms",
                self.tool_name,
                d.as_millis()
            ),
        }
    }
}

impl Error for ToolInvocationError {}

/// Check `args` against a parameter list and fill in defaults.
///
/// `null` is treated as an empty object. Unknown keys are passed through.
pub fn validate_arguments(
    parameters: &[ToolParameter],
    args: JsonValue,
) -> Result<JsonValue, String> {
    let mut object = match args {
        JsonValue::Null => serde_json::Map::new(),
        JsonValue::Object(map) => map,
        other => {
            return Err(format!(
                "arguments must be a JSON object, got {}",
                json_kind(&other)
            ))
        }
    };

    for param in parameters {
        match object.get(&param.name) {
            Some(value) if !value.is_null() => {
                if !param.param_type.accepts(value) {
                    return Err(format!(
                        "parameter '{}' expects {}, got {}",
                        param.name,
                        param.param_type.as_str(),
                        json_kind(value)
                    ));
                }
            }
            _ => {
                if let Some(default) = &param.default {
                    object.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(format!("missing required parameter '{}'", param.name));
                }
            }
        }
    }

    Ok(JsonValue::Object(object))
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// A named capability in an agent's belt.
pub enum Tool {
    LocalProcedure(LocalProcedure),
    RemoteProcedure(RemoteProcedure),
}

impl Tool {
    /// Wrap a synchronous function.
    pub fn local<F>(metadata: ToolMetadata, function: F) -> Self
    where
        F: Fn(JsonValue) -> Result<ToolResult, Box<dyn Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    {
        let function: ToolFunction = Arc::new(function);
        Tool::LocalProcedure(LocalProcedure::sync(metadata, function))
    }

    /// Wrap an asynchronous function.
    pub fn local_async<F, Fut>(metadata: ToolMetadata, function: F) -> Self
    where
        F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, Box<dyn Error + Send + Sync>>> + Send + 'static,
    {
        let function: AsyncToolFunction = Arc::new(move |args| function(args).boxed());
        Tool::LocalProcedure(LocalProcedure::asynchronous(metadata, function))
    }

    /// Forward invocations to `endpoint` under `method`.
    pub fn remote(
        metadata: ToolMetadata,
        method: impl Into<String>,
        endpoint: Arc<dyn RemoteCapability>,
    ) -> Self {
        Tool::RemoteProcedure(RemoteProcedure::new(metadata, method, endpoint))
    }

    pub fn metadata(&self) -> &ToolMetadata {
        match self {
            Tool::LocalProcedure(p) => p.metadata(),
            Tool::RemoteProcedure(p) => p.metadata(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata().name
    }

    /// Validate `arguments` and run the tool.
    pub async fn invoke(&self, arguments: JsonValue) -> Result<ToolResult, ToolInvocationError> {
        match self {
            Tool::LocalProcedure(p) => p.invoke(arguments).await,
            Tool::RemoteProcedure(p) => p.invoke(arguments).await,
        }
    }
}

impl fmt::Debug for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Tool::LocalProcedure(_) => "LocalProcedure",
            Tool::RemoteProcedure(_) => "RemoteProcedure",
        };
        f.debug_struct(kind).field("name", &self.name()).finish()
    }
}

/// The tools owned by one agent, keyed by name.
#[derive(Debug, Default)]
pub struct ToolBelt {
    tools: BTreeMap<String, Tool>,
}

impl ToolBelt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tool. A tool with the same name is replaced and returned.
    pub fn register(&mut self, tool: Tool) -> Option<Tool> {
        let name = tool.name().to_string();
        let previous = self.tools.insert(name.clone(), tool);
        if previous.is_some() {
            log::debug!("tool '{}' re-registered, previous binding replaced", name);
        }
        previous
    }

    pub fn remove(&mut self, name: &str) -> Option<Tool> {
        self.tools.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool schemas in name order, for prompting.
    pub fn schemas(&self) -> Vec<ToolMetadata> {
        self.tools.values().map(|t| t.metadata().clone()).collect()
    }

    pub async fn invoke(
        &self,
        name: &str,
        arguments: JsonValue,
    ) -> Result<ToolResult, ToolInvocationError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolInvocationError::new(name, ToolFailure::NotFound))?;
        tool.invoke(arguments).await
    }

    /// [`invoke`](Self::invoke) bounded by `timeout`, when set.
    pub async fn invoke_within(
        &self,
        name: &str,
        arguments: JsonValue,
        timeout: Option<Duration>,
    ) -> Result<ToolResult, ToolInvocationError> {
        match timeout {
            None => self.invoke(name, arguments).await,
            Some(limit) => match tokio::time::timeout(limit, self.invoke(name, arguments)).await {
                Ok(result) => result,
                Err(_) => Err(ToolInvocationError::new(name, ToolFailure::Timeout(limit))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("symbol", ToolParameterType::String).required(),
            ToolParameter::new("depth", ToolParameterType::Integer).with_default(json!(10)),
            ToolParameter::new("raw", ToolParameterType::Boolean),
        ]
    }

    #[test]
    fn test_tool_parameter_builder() {
        let param = ToolParameter::new("test_param", ToolParameterType::String)
            .with_description("A test parameter")
            .required()
            .with_default(json!("default_value"));

        assert_eq!(param.name, "test_param");
        assert_eq!(param.param_type, ToolParameterType::String);
        assert_eq!(param.description, Some("A test parameter".to_string()));
        assert!(param.required);
        assert_eq!(param.default, Some(json!("default_value")));
    }

    #[test]
    fn test_validate_fills_defaults() {
        let args = validate_arguments(&schema(), json!({"symbol": "BTC"})).unwrap();
        assert_eq!(args["depth"], 10);
        assert!(args.get("raw").is_none());
    }

    #[test]
    fn test_validate_rejects_missing_and_mistyped() {
        let missing = validate_arguments(&schema(), JsonValue::Null).unwrap_err();
        assert!(missing.contains("symbol"));

        let mistyped = validate_arguments(&schema(), json!({"symbol": 42})).unwrap_err();
        assert!(mistyped.contains("expects string"));

        let not_object = validate_arguments(&schema(), json!([1, 2])).unwrap_err();
        assert!(not_object.contains("array"));
    }

    #[test]
    fn test_integer_accepts_whole_floats_only() {
        assert!(ToolParameterType::Integer.accepts(&json!(3)));
        assert!(ToolParameterType::Integer.accepts(&json!(3.0)));
        assert!(!ToolParameterType::Integer.accepts(&json!(3.5)));
        assert!(ToolParameterType::Number.accepts(&json!(3)));
    }

    #[test]
    fn test_prompt_line() {
        let meta = ToolMetadata::new("price", "Latest price")
            .with_parameter(ToolParameter::new("symbol", ToolParameterType::String).required());
        assert_eq!(
            meta.prompt_line(),
            "- price: Latest price (params: symbol: string (required))"
        );
    }
}
