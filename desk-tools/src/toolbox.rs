//! Tool abstraction and per-persona toolboxes

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use desk_core::{Credentials, ToolKind};

use crate::{ExaTools, FirecrawlTools, MarketDataTools, WebSearchTools};

/// Errors from tool calls
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

/// A function the model may call, described by a JSON schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// An external capability exposing one or more callable functions
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which capability this is
    fn kind(&self) -> ToolKind;

    /// Functions offered to the model
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one function and return its result as text for the model
    async fn call(&self, function: &str, input: &Value) -> Result<String, ToolError>;
}

/// The tools wired to one persona, indexed by function name
#[derive(Default)]
pub struct Toolbox {
    tools: Vec<Box<dyn Tool>>,
    by_function: HashMap<String, usize>,
}

impl Toolbox {
    /// Build the toolbox for a persona's tool set
    pub fn for_kinds(kinds: &[ToolKind], credentials: &Credentials, client: &Client) -> Self {
        let tools = kinds
            .iter()
            .map(|kind| -> Box<dyn Tool> {
                match kind {
                    ToolKind::WebSearch => Box::new(WebSearchTools::new(client.clone())),
                    ToolKind::MarketData => Box::new(MarketDataTools::new(client.clone())),
                    ToolKind::ContentScraping => Box::new(FirecrawlTools::new(
                        client.clone(),
                        &credentials.firecrawl_api_key,
                    )),
                    ToolKind::SemanticSearch => {
                        Box::new(ExaTools::new(client.clone(), &credentials.exa_api_key))
                    }
                }
            })
            .collect();

        Self::from_tools(tools)
    }

    /// Build from already-constructed tools
    pub fn from_tools(tools: Vec<Box<dyn Tool>>) -> Self {
        let mut by_function = HashMap::new();
        for (idx, tool) in tools.iter().enumerate() {
            for def in tool.definitions() {
                by_function.insert(def.name, idx);
            }
        }
        Self { tools, by_function }
    }

    /// Definitions of every function in the toolbox
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().flat_map(|t| t.definitions()).collect()
    }

    /// Dispatch a function call to the tool that owns it
    pub async fn call(&self, function: &str, input: &Value) -> Result<String, ToolError> {
        let idx = self
            .by_function
            .get(function)
            .ok_or_else(|| ToolError::UnknownFunction(function.to_string()))?;

        debug!("Calling {} via {} tool", function, self.tools[*idx].kind());
        self.tools[*idx].call(function, input).await
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Fetch a required string argument
pub(crate) fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidInput(format!("missing string argument '{}'", key)))
}

/// Fetch an optional count argument, clamped to `1..=max`
pub(crate) fn count_arg(input: &Value, key: &str, default: usize, max: usize) -> usize {
    input
        .get(key)
        .and_then(Value::as_u64)
        .map(|n| (n as usize).clamp(1, max))
        .unwrap_or(default)
}

/// Turn a non-success response into a `ToolError::Status`
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ToolError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ToolError::Status {
        status,
        body: body.chars().take(500).collect(),
    })
}
