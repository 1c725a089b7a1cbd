//! Agent core
//!
//! The reason-act-observe loop and the tool substrate it drives: a path
//! sandbox, a timeout-bounded process runner, the tool set, the registry
//! that dispatches to it and the formatter that folds results back into the
//! transcript.

use thiserror::Error;

pub mod context;
pub mod format;
pub mod loop_agent;
pub mod process;
pub mod sandbox;
pub mod tools;

pub use context::ContextBuilder;
pub use format::format_tool_result;
pub use loop_agent::{AgentLoop, AgentSettings, Termination, TurnOutcome};
pub use process::{ProcessOutput, ProcessRunner, RunError};
pub use sandbox::{Sandbox, SandboxError, SandboxedPath};
pub use tools::{ToolError, ToolRegistry, ToolResult, ToolTrait};

/// Agent errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history error: {0}")]
    History(#[from] wrench_session::HistoryError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
