//! shell_exec: run a command in the working directory

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use super::{parse_args, ToolError, ToolTrait};
use crate::process::ProcessRunner;

/// Shell command tool. The command string itself is trusted; only the
/// working directory is fixed.
pub struct ShellExecTool {
    working_dir: PathBuf,
    runner: ProcessRunner,
}

impl ShellExecTool {
    pub fn new(working_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::with_runner(working_dir, ProcessRunner::new(timeout))
    }

    pub fn with_runner(working_dir: impl Into<PathBuf>, runner: ProcessRunner) -> Self {
        Self {
            working_dir: working_dir.into(),
            runner,
        }
    }
}

#[derive(Deserialize)]
struct ShellExecArgs {
    command: String,
}

#[async_trait]
impl ToolTrait for ShellExecTool {
    fn name(&self) -> &str {
        "shell_exec"
    }
    fn description(&self) -> &str {
        "Run a shell command in the working directory and return stdout, stderr and the exit code."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command to run" }
            },
            "required": ["command"]
        })
    }
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ShellExecArgs = parse_args(args)?;
        debug!("Executing: {}", args.command);

        let output = self.runner.run(&args.command, &self.working_dir).await?;

        Ok(json!({
            "success": output.success(),
            "exit_code": output.exit_code.unwrap_or(-1),
            "stdout": output.stdout,
            "stderr": output.stderr,
            "command": args.command,
            "working_directory": self.working_dir.display().to_string(),
        }))
    }
}
