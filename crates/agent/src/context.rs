//! Context builder for assembling the model-facing message sequence

use chrono::Local;
use std::path::{Path, PathBuf};

use wrench_provider::{Message, ToolCallDef};
use wrench_session::{Message as HistoryMessage, Role};

/// Priming turn placed right after the system prompt
pub const ACKNOWLEDGMENT: &str =
    "Understood. I'm a coding agent ready to help with programming tasks and file operations.";

/// Builds context (system prompt + messages) for the agent
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    working_dir: PathBuf,
}

impl ContextBuilder {
    pub fn new(working_dir: impl AsRef<Path>) -> Self {
        Self {
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn system_prompt(&self) -> String {
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");

        format!(
            r#"# wrench

You are wrench, a coding agent. You help with programming tasks, file operations and shell commands inside one working directory.

## Tools
- read_file: read a text file
- write_file: create or overwrite a file
- list_files: list a directory (not recursive)
- search_files: case-insensitive regex search across files, optionally filtered by extension
- shell_exec: run a shell command in the working directory (10 second limit)
- web_search: search the web

## How to work
1. Plan first and use the fewest tool calls that solve the request. Answer from reasoning alone when no tool is needed.
2. Use list_files or search_files to locate things, then read_file only what is relevant.
3. All paths are relative to the working directory. Paths outside it are refused.
4. Never run destructive shell commands such as `rm -rf` or `shutdown`.
5. If a tool fails, explain the failure rather than retrying blindly.
6. Ask before overwriting important files or installing packages.
7. Stop when the request is done. Do not create extra files.

When finished, reply with a short checklist of what you did, e.g.
- Created file: add.py
- Added function: add_numbers()

## Current Time
{}

## Working Directory
{}"#,
            now,
            self.working_dir.display()
        )
    }

    /// System prompt, priming turn, the recent history window, then the
    /// current input unless it already closes that window.
    pub fn build_messages(&self, recent: &[HistoryMessage], user_input: &str) -> Vec<Message> {
        let mut messages = vec![
            Message::system(self.system_prompt()),
            Message::assistant(ACKNOWLEDGMENT),
        ];

        for entry in recent {
            match entry.role {
                Role::User => messages.push(Message::user(&entry.content)),
                Role::Assistant => messages.push(Message::assistant(&entry.content)),
                Role::System => {}
            }
        }

        let input_is_tail = recent
            .last()
            .map(|m| m.content == user_input)
            .unwrap_or(false);
        if !input_is_tail {
            messages.push(Message::user(user_input));
        }

        messages
    }

    pub fn add_tool_result(
        messages: &mut Vec<Message>,
        tool_call_id: &str,
        name: &str,
        result: &str,
    ) {
        messages.push(Message::tool(tool_call_id, name, result));
    }

    pub fn add_assistant_message(
        messages: &mut Vec<Message>,
        content: Option<&str>,
        tool_calls: Option<Vec<ToolCallDef>>,
    ) {
        let mut msg = Message::assistant(content.unwrap_or(""));
        msg.tool_calls = tool_calls;
        messages.push(msg);
    }
}
