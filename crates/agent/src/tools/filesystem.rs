//! File tools: read_file, write_file, list_files

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::debug;

use super::{parse_args, ToolError, ToolTrait};
use crate::sandbox::{relative_to, Sandbox};

fn default_path() -> String {
    ".".to_string()
}

/// Read a text file inside the working directory
pub struct ReadFileTool {
    sandbox: Sandbox,
}

impl ReadFileTool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            sandbox: Sandbox::new(working_dir),
        }
    }
}

#[derive(Deserialize)]
struct ReadFileArgs {
    path: String,
}

#[async_trait]
impl ToolTrait for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }
    fn description(&self) -> &str {
        "Read the contents of a text file in the working directory."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path of the file to read, relative to the working directory" }
            },
            "required": ["path"]
        })
    }
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ReadFileArgs = parse_args(args)?;
        let path = self.sandbox.validate(&args.path).await?;

        debug!("Reading {:?}", path.as_path());
        let meta = tokio::fs::metadata(path.as_path())
            .await
            .map_err(|e| ToolError::from_io(&e, "File", &args.path))?;
        if !meta.is_file() {
            return Err(ToolError::WrongType {
                expected: "file",
                path: args.path,
            });
        }

        let content = tokio::fs::read_to_string(path.as_path())
            .await
            .map_err(|e| ToolError::from_io(&e, "File", &args.path))?;

        Ok(json!({
            "path": path.relative(),
            "content": content,
            "size": meta.len(),
        }))
    }
}

/// Create or overwrite a text file inside the working directory
pub struct WriteFileTool {
    sandbox: Sandbox,
}

impl WriteFileTool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            sandbox: Sandbox::new(working_dir),
        }
    }
}

#[derive(Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

#[async_trait]
impl ToolTrait for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }
    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. Overwrites existing files."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Path of the file to write, relative to the working directory" },
                "content": { "type": "string", "description": "Full content to write" }
            },
            "required": ["path", "content"]
        })
    }
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: WriteFileArgs = parse_args(args)?;
        let path = self.sandbox.validate(&args.path).await?;

        if tokio::fs::metadata(path.as_path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            return Err(ToolError::WrongType {
                expected: "file",
                path: args.path,
            });
        }

        debug!("Writing {} bytes to {:?}", args.content.len(), path.as_path());
        if let Some(parent) = path.as_path().parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::from_io(&e, "Directory", &args.path))?;
        }
        tokio::fs::write(path.as_path(), &args.content)
            .await
            .map_err(|e| ToolError::from_io(&e, "File", &args.path))?;

        Ok(json!({
            "path": path.relative(),
            "size": args.content.len(),
            "message": format!("File written successfully: {}", args.path),
        }))
    }
}

/// Single-level directory listing
pub struct ListFilesTool {
    sandbox: Sandbox,
}

impl ListFilesTool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            sandbox: Sandbox::new(working_dir),
        }
    }
}

#[derive(Deserialize)]
struct ListFilesArgs {
    #[serde(default = "default_path")]
    path: String,
}

#[async_trait]
impl ToolTrait for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }
    fn description(&self) -> &str {
        "List the files and directories directly inside a directory."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to list, relative to the working directory (default \".\")" }
            },
            "required": ["path"]
        })
    }
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: ListFilesArgs = parse_args(args)?;
        let dir = self.sandbox.validate(&args.path).await?;
        let io_err = |e: std::io::Error| ToolError::from_io(&e, "Directory", &args.path);

        let meta = tokio::fs::metadata(dir.as_path()).await.map_err(io_err)?;
        if !meta.is_dir() {
            return Err(ToolError::WrongType {
                expected: "directory",
                path: args.path.clone(),
            });
        }

        debug!("Listing {:?}", dir.as_path());
        let mut files = Vec::new();
        let mut directories = Vec::new();
        let mut entries = tokio::fs::read_dir(dir.as_path()).await.map_err(io_err)?;
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let entry_path = entry.path();
            // Follow symlinks for classification; dangling ones are neither.
            let Ok(meta) = tokio::fs::metadata(&entry_path).await else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let rel = relative_to(&entry_path, dir.root());
            if meta.is_dir() {
                directories.push((name, rel));
            } else if meta.is_file() {
                files.push((name, rel, meta.len()));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));
        directories.sort_by(|a, b| a.0.cmp(&b.0));

        let total_items = files.len() + directories.len();
        Ok(json!({
            "path": dir.relative(),
            "files": files
                .into_iter()
                .map(|(name, path, size)| json!({ "name": name, "path": path, "size": size }))
                .collect::<Vec<_>>(),
            "directories": directories
                .into_iter()
                .map(|(name, path)| json!({ "name": name, "path": path }))
                .collect::<Vec<_>>(),
            "total_items": total_items,
        }))
    }
}
