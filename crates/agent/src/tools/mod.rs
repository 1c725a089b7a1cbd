//! Tool capability interface and the registry that dispatches to it

pub mod filesystem;
pub mod search;
pub mod shell;
pub mod web;

pub use filesystem::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use search::SearchFilesTool;
pub use shell::ShellExecTool;
pub use web::{BraveSearch, SearchError, SearchHit, SearchProvider, WebSearchTool};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use wrench_provider::Tool;

use crate::process::RunError;
use crate::sandbox::SandboxError;

/// Typed failure of a single tool invocation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    #[error("Access denied: path outside working directory or invalid path ({0})")]
    AccessDenied(String),

    #[error("{what} not found: {path}")]
    NotFound { what: &'static str, path: String },

    #[error("Path is not a {expected}: {path}")]
    WrongType { expected: &'static str, path: String },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("File is not readable as UTF-8 text: {0}")]
    Encoding(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid search pattern: {0}")]
    InvalidPattern(String),

    #[error("Failed to launch command: {0}")]
    LaunchFailed(String),

    #[error("Execution timed out after {0} seconds")]
    TimedOut(u64),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Provider(String),

    #[error("Internal tool error: {0}")]
    Internal(String),
}

impl ToolError {
    /// Classify an I/O failure on `path`
    pub fn from_io(err: &std::io::Error, what: &'static str, path: &str) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ToolError::NotFound {
                what,
                path: path.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => ToolError::PermissionDenied(path.to_string()),
            std::io::ErrorKind::InvalidData => ToolError::Encoding(path.to_string()),
            _ => ToolError::Io(format!("{}: {}", path, err)),
        }
    }
}

impl From<SandboxError> for ToolError {
    fn from(err: SandboxError) -> Self {
        ToolError::AccessDenied(err.to_string())
    }
}

impl From<RunError> for ToolError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::EmptyCommand => ToolError::InvalidArguments(err.to_string()),
            RunError::LaunchFailed(e) => ToolError::LaunchFailed(e.to_string()),
            RunError::TimedOut(timeout) => ToolError::TimedOut(timeout.as_secs()),
            other => ToolError::Internal(other.to_string()),
        }
    }
}

/// Decode a tool's argument object
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

/// Tool capability: a declaration plus an execution contract
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

pub fn to_provider_tool(tool: &dyn ToolTrait) -> Tool {
    Tool::new(tool.name(), tool.description(), tool.parameters())
}

/// Outcome of one dispatched call, keyed by tool name
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub tool: String,
    pub outcome: Result<Value, ToolError>,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&ToolError> {
        self.outcome.as_ref().err()
    }
}

/// Name-keyed tool catalog
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolTrait>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Standard tool set confined to `working_dir`
    pub fn with_defaults(
        working_dir: &Path,
        shell_timeout: Duration,
        search: Arc<dyn SearchProvider>,
        search_count: u32,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(ReadFileTool::new(working_dir));
        registry.register(WriteFileTool::new(working_dir));
        registry.register(ListFilesTool::new(working_dir));
        registry.register(SearchFilesTool::new(working_dir));
        registry.register(ShellExecTool::new(working_dir, shell_timeout));
        registry.register(WebSearchTool::new(search, search_count));
        registry
    }

    /// Add a tool. A tool already registered under the same name is replaced.
    pub fn register<T: ToolTrait + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), Arc::new(tool)).is_some() {
            debug!("Replaced tool registration: {}", name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolTrait>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations sent to the model, sorted by name
    pub fn definitions(&self) -> Vec<Tool> {
        let mut defs: Vec<Tool> = self
            .tools
            .values()
            .map(|t| to_provider_tool(t.as_ref()))
            .collect();
        defs.sort_by(|a, b| a.name().cmp(b.name()));
        defs
    }

    /// Run a tool by name. Never fails: unknown names, tool errors and
    /// panics all come back as an error outcome.
    pub async fn dispatch(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            warn!("Model requested unknown tool: {}", name);
            return ToolResult {
                tool: name.to_string(),
                outcome: Err(ToolError::UnknownTool(name.to_string())),
            };
        };

        let handle = tokio::spawn(async move { tool.execute(args).await });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(ToolError::Internal(panic_message(e.into_panic()))),
            Err(e) => Err(ToolError::Internal(e.to_string())),
        };

        ToolResult {
            tool: name.to_string(),
            outcome,
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("tool panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("tool panicked: {}", msg)
    } else {
        "tool panicked".to_string()
    }
}
