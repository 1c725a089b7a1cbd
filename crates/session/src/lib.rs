//! Conversation history
//!
//! An append-only, role-tagged message log that is persisted wholesale as a
//! single JSON document next to the agent's working directory.

use chrono::{DateTime, Local};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// History persistence errors
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "model")]
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Local>>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Some(Local::now()),
        }
    }
}

/// RFC 3339 strings become timestamps; anything else is treated as absent.
fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Local>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Local)))
}

/// On-disk document
#[derive(Debug, Serialize, Deserialize)]
struct PersistedHistory {
    #[serde(default)]
    messages: Vec<Message>,
    #[serde(default)]
    working_directory: String,
    #[serde(default)]
    model_name: String,
}

/// Ordered message log bound to a history file
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    path: PathBuf,
    working_directory: PathBuf,
    model_name: String,
    messages: Vec<Message>,
}

impl ConversationHistory {
    /// Empty history that will be written to `path`
    pub fn new(
        path: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
        model_name: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            working_directory: working_directory.into(),
            model_name: model_name.into(),
            messages: Vec::new(),
        }
    }

    /// Load from `path`. A missing or unreadable file yields an empty history.
    pub async fn load(
        path: impl Into<PathBuf>,
        working_directory: impl Into<PathBuf>,
        model_name: impl Into<String>,
    ) -> Self {
        let mut history = Self::new(path, working_directory, model_name);
        history.messages = read_messages(&history.path).await;
        history
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.messages.push(Message::new(role, content));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent `n` messages, oldest first
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn working_directory(&self) -> &Path {
        &self.working_directory
    }

    /// Re-point the history at another file, keeping in-memory messages
    pub fn relocate(&mut self, path: impl Into<PathBuf>, working_directory: impl Into<PathBuf>) {
        self.path = path.into();
        self.working_directory = working_directory.into();
    }

    /// Rewrite the history file with the full in-memory log
    pub async fn save(&self) -> Result<()> {
        let document = PersistedHistory {
            messages: self.messages.clone(),
            working_directory: self.working_directory.display().to_string(),
            model_name: self.model_name.clone(),
        };
        let content = serde_json::to_string_pretty(&document)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;
        debug!("Saved {} messages to {:?}", self.messages.len(), self.path);
        Ok(())
    }

    /// Drop every message and delete the history file
    pub async fn clear(&mut self) -> Result<()> {
        self.messages.clear();
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        info!("Conversation history cleared");
        Ok(())
    }
}

async fn read_messages(path: &Path) -> Vec<Message> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("No history at {:?}, starting fresh", path);
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to read history {:?}: {}", path, e);
            return Vec::new();
        }
    };

    match serde_json::from_str::<PersistedHistory>(&content) {
        Ok(document) => {
            info!(
                "Loaded {} messages from {:?}",
                document.messages.len(),
                path
            );
            document.messages
        }
        Err(e) => {
            warn!("Failed to parse history {:?}: {}", path, e);
            Vec::new()
        }
    }
}
