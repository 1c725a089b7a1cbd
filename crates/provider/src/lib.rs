//! Language-model completion service
//!
//! The agent only sees the [`Provider`] trait: an ordered message sequence
//! and a set of tool declarations go in, one decoded [`ChatResponse`] comes
//! out.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use thiserror::Error;

pub mod openrouter;

pub use openrouter::OpenRouterProvider;

/// Transport and API failures
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("no API key configured")]
    NoApiKey,

    #[error("rate limited")]
    RateLimited,
}

pub type Result<T> = std::result::Result<T, ProviderError>;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Decoded body of a model response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reply {
    /// Text segments in emission order plus zero or more tool calls
    Parts {
        text: Vec<String>,
        tool_calls: Vec<ToolCall>,
    },
    /// The payload did not have the expected shape
    Malformed { detail: String },
}

/// Model response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: Reply,
    #[serde(default)]
    pub finish_reason: String,
    #[serde(default)]
    pub usage: Usage,
}

impl ChatResponse {
    /// A plain text answer
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            reply: Reply::Parts {
                text: vec![content.into()],
                tool_calls: Vec::new(),
            },
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        }
    }

    /// Tool calls, optionally with accompanying commentary
    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            reply: Reply::Parts {
                text: content.into_iter().collect(),
                tool_calls,
            },
            finish_reason: "tool_calls".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self {
            reply: Reply::Malformed {
                detail: detail.into(),
            },
            finish_reason: "error".to_string(),
            usage: Usage::default(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls().is_empty()
    }

    pub fn tool_calls(&self) -> &[ToolCall] {
        match &self.reply {
            Reply::Parts { tool_calls, .. } => tool_calls,
            Reply::Malformed { .. } => &[],
        }
    }

    /// Non-empty text segments joined by newlines
    pub fn joined_text(&self) -> Option<String> {
        match &self.reply {
            Reply::Parts { text, .. } => {
                let parts: Vec<&str> = text
                    .iter()
                    .map(String::as_str)
                    .filter(|s| !s.is_empty())
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            Reply::Malformed { .. } => None,
        }
    }
}

/// Token accounting reported by the endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One entry of the model-facing message sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDef>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn with_role(role: &str, content: String) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content.into())
    }

    pub fn tool(
        call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(result.into()),
            tool_calls: None,
            tool_call_id: Some(call_id.into()),
            name: Some(name.into()),
        }
    }
}

/// Tool call as echoed back in an assistant message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallDef {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

impl ToolCallDef {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            call_type: "function".to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }
}

impl From<&ToolCall> for ToolCallDef {
    fn from(call: &ToolCall) -> Self {
        Self::new(&call.id, &call.name, call.arguments.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

/// Tool declaration sent to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDef,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            tool_type: "function".to_string(),
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Request parameters
#[derive(Debug, Clone)]
pub struct ChatParams {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<Tool>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub tool_choice: ToolChoice,
}

impl Default for ChatParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens: 4096,
            temperature: 0.7,
            tool_choice: ToolChoice::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ToolChoice {
    Auto,
    Required(String),
    None,
}

/// Language-model completion service
#[async_trait]
pub trait Provider: Send + Sync {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse>;
    fn default_model(&self) -> String;
    fn is_configured(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_provider_error_display() {
        assert_eq!(ProviderError::NoApiKey.to_string(), "no API key configured");
        assert_eq!(
            ProviderError::Api("bad model".to_string()).to_string(),
            "API error: bad model"
        );
        assert_eq!(ProviderError::RateLimited.to_string(), "rate limited");
    }

    #[test]
    fn test_chat_response_text_builder() {
        let response = ChatResponse::text("Hello, world!");
        assert_eq!(response.joined_text().as_deref(), Some("Hello, world!"));
        assert!(!response.has_tool_calls());
        assert_eq!(response.finish_reason, "stop");
    }

    #[test]
    fn test_chat_response_with_tool_calls() {
        let response = ChatResponse::with_tool_calls(
            Some("Let me look".to_string()),
            vec![ToolCall::new("call_1", "list_files", json!({"path": "."}))],
        );
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls()[0].name, "list_files");
        assert_eq!(response.joined_text().as_deref(), Some("Let me look"));
    }

    #[test]
    fn test_joined_text_skips_empty_segments() {
        let response = ChatResponse {
            reply: Reply::Parts {
                text: vec!["first".to_string(), String::new(), "second".to_string()],
                tool_calls: vec![],
            },
            finish_reason: "stop".to_string(),
            usage: Usage::default(),
        };
        assert_eq!(response.joined_text().as_deref(), Some("first\nsecond"));

        let empty = ChatResponse::with_tool_calls(None, vec![]);
        assert!(empty.joined_text().is_none());
    }

    #[test]
    fn test_malformed_has_no_calls_or_text() {
        let response = ChatResponse::malformed("missing choices");
        assert!(!response.has_tool_calls());
        assert!(response.joined_text().is_none());
        assert_eq!(
            response.reply,
            Reply::Malformed {
                detail: "missing choices".to_string()
            }
        );
    }

    #[test]
    fn test_message_builders() {
        let msg = Message::system("rules");
        assert_eq!(msg.role, "system");
        assert_eq!(msg.content.as_deref(), Some("rules"));

        let msg = Message::tool("call_123", "read_file", "contents");
        assert_eq!(msg.role, "tool");
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_123"));
        assert_eq!(msg.name.as_deref(), Some("read_file"));
    }

    #[test]
    fn test_message_serialization_skips_none() {
        let json_str = serde_json::to_string(&Message::user("Hello")).unwrap();
        assert!(json_str.contains("\"role\":\"user\""));
        assert!(!json_str.contains("tool_calls"));
        assert!(!json_str.contains("tool_call_id"));
    }

    #[test]
    fn test_tool_call_def_from_tool_call() {
        let call = ToolCall::new("id1", "write_file", json!({"path": "a.txt"}));
        let def = ToolCallDef::from(&call);
        assert_eq!(def.id, "id1");
        assert_eq!(def.call_type, "function");
        assert_eq!(def.function.name, "write_file");
        assert_eq!(def.function.arguments, json!({"path": "a.txt"}));
    }

    #[test]
    fn test_tool_new() {
        let tool = Tool::new("read_file", "Read a file", json!({"type": "object"}));
        assert_eq!(tool.tool_type, "function");
        assert_eq!(tool.name(), "read_file");
    }

    #[test]
    fn test_chat_params_default() {
        let params = ChatParams::default();
        assert!(params.messages.is_empty());
        assert_eq!(params.max_tokens, 4096);
        assert!(matches!(params.tool_choice, ToolChoice::Auto));
    }

    #[test]
    fn test_reply_serialization_is_tagged() {
        let json_str = serde_json::to_string(&ChatResponse::malformed("x").reply).unwrap();
        assert!(json_str.contains("\"kind\":\"malformed\""));
    }
}
