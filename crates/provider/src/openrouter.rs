//! OpenRouter / OpenAI-compatible chat completions

use crate::*;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, trace, warn};

/// Chat-completions client for OpenRouter and any OpenAI-compatible endpoint
pub struct OpenRouterProvider {
    client: Client,
    api_key: String,
    api_base: String,
    default_model: String,
}

impl OpenRouterProvider {
    pub fn new(
        api_key: impl Into<String>,
        api_base: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let api_key = api_key.into();
        let is_openai = api_key.starts_with("sk-") && !api_key.starts_with("sk-or-");

        let api_base = api_base.unwrap_or_else(|| {
            if is_openai {
                "https://api.openai.com/v1".to_string()
            } else {
                "https://openrouter.ai/api/v1".to_string()
            }
        });

        let default_model = default_model.unwrap_or_else(|| {
            if is_openai {
                "gpt-4o".to_string()
            } else {
                "google/gemini-2.5-flash".to_string()
            }
        });

        Self {
            client: Client::new(),
            api_key,
            api_base: api_base.trim_end_matches('/').to_string(),
            default_model,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn build_request(&self, params: &ChatParams) -> serde_json::Value {
        let model = if params.model.is_empty() {
            self.default_model.clone()
        } else {
            params.model.clone()
        };

        let messages: Vec<serde_json::Value> = params
            .messages
            .iter()
            .map(|m| {
                let mut obj = json!({ "role": &m.role });
                if let Some(content) = &m.content {
                    obj["content"] = json!(content);
                }
                if let Some(tool_calls) = &m.tool_calls {
                    // The wire format carries arguments as a JSON-encoded string
                    let calls: Vec<serde_json::Value> = tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": &call.id,
                                "type": &call.call_type,
                                "function": {
                                    "name": &call.function.name,
                                    "arguments": call.function.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    obj["tool_calls"] = json!(calls);
                }
                if let Some(tool_call_id) = &m.tool_call_id {
                    obj["tool_call_id"] = json!(tool_call_id);
                }
                if let Some(name) = &m.name {
                    obj["name"] = json!(name);
                }
                obj
            })
            .collect();

        let mut body = json!({
            "model": model,
            "messages": messages,
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });

        if !params.tools.is_empty() {
            let tools: Vec<serde_json::Value> = params
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": &t.function.name,
                            "description": &t.function.description,
                            "parameters": &t.function.parameters
                        }
                    })
                })
                .collect();

            body["tools"] = json!(tools);
            body["tool_choice"] = match &params.tool_choice {
                ToolChoice::Auto => json!("auto"),
                ToolChoice::Required(name) => {
                    json!({"type": "function", "function": {"name": name}})
                }
                ToolChoice::None => json!("none"),
            };
        }

        body
    }

    /// Decode a 2xx body. Shape problems become [`Reply::Malformed`].
    fn parse_response(&self, json: serde_json::Value) -> ChatResponse {
        let Some(choice) = json["choices"].get(0) else {
            return ChatResponse::malformed(format!("response has no choices: {}", json));
        };
        let message = &choice["message"];
        if !message.is_object() {
            return ChatResponse::malformed(format!("choice has no message: {}", choice));
        }

        let finish_reason = choice["finish_reason"]
            .as_str()
            .unwrap_or("stop")
            .to_string();

        let text = match text_segments(&message["content"]) {
            Ok(text) => text,
            Err(detail) => return ChatResponse::malformed(detail),
        };

        let mut tool_calls = Vec::new();
        if let Some(calls) = message["tool_calls"].as_array() {
            for call in calls {
                match decode_tool_call(call) {
                    Ok(call) => tool_calls.push(call),
                    Err(detail) => return ChatResponse::malformed(detail),
                }
            }
        }

        let usage = match json["usage"].as_object() {
            Some(usage) => {
                let count = |key: &str| {
                    usage
                        .get(key)
                        .and_then(|v| v.as_u64())
                        .map(|v| u32::try_from(v).unwrap_or(u32::MAX))
                        .unwrap_or(0)
                };
                Usage {
                    prompt_tokens: count("prompt_tokens"),
                    completion_tokens: count("completion_tokens"),
                    total_tokens: count("total_tokens"),
                }
            }
            None => Usage::default(),
        };

        ChatResponse {
            reply: Reply::Parts { text, tool_calls },
            finish_reason,
            usage,
        }
    }
}

/// `content` is either a string, null, or an array of typed parts.
fn text_segments(content: &serde_json::Value) -> std::result::Result<Vec<String>, String> {
    match content {
        serde_json::Value::Null => Ok(Vec::new()),
        serde_json::Value::String(s) => Ok(vec![s.clone()]),
        serde_json::Value::Array(parts) => Ok(parts
            .iter()
            .filter_map(|part| part["text"].as_str().map(str::to_string))
            .collect()),
        other => Err(format!("unexpected message content: {}", other)),
    }
}

fn decode_tool_call(call: &serde_json::Value) -> std::result::Result<ToolCall, String> {
    let function = &call["function"];
    let name = function["name"]
        .as_str()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| format!("tool call without a function name: {}", call))?;

    let arguments = match &function["arguments"] {
        serde_json::Value::String(raw) if raw.trim().is_empty() => json!({}),
        serde_json::Value::String(raw) => serde_json::from_str(raw)
            .map_err(|e| format!("tool call '{}' has unparseable arguments: {}", name, e))?,
        serde_json::Value::Null => json!({}),
        other => other.clone(),
    };
    if !arguments.is_object() {
        return Err(format!(
            "tool call '{}' arguments are not an object: {}",
            name, arguments
        ));
    }

    let id = call["id"]
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));

    Ok(ToolCall::new(id, name, arguments))
}

#[async_trait::async_trait]
impl Provider for OpenRouterProvider {
    async fn chat(&self, params: ChatParams) -> Result<ChatResponse> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }
        trace!("Posting chat completion to {}", self.api_base);

        let url = format!("{}/chat/completions", self.api_base);
        let body = self.build_request(&params);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;

        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }
            let error = serde_json::from_str::<serde_json::Value>(&raw)
                .ok()
                .and_then(|json| json["error"]["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("{}: {}", status, raw));
            return Err(ProviderError::Api(error));
        }

        let json: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(json) => json,
            Err(e) => {
                warn!("Completion body is not JSON: {}", e);
                return Ok(ChatResponse::malformed(format!(
                    "response body is not JSON ({}): {}",
                    e, raw
                )));
            }
        };

        let response = self.parse_response(json);
        debug!(
            "Completion decoded: {} tool call(s)",
            response.tool_calls().len()
        );
        Ok(response)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
