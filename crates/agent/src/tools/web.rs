//! web_search and the search-provider collaborator behind it

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::{parse_args, ToolError, ToolTrait};

pub const BRAVE_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";

const MIN_COUNT: i64 = 1;
const MAX_COUNT: i64 = 20;

/// Search backend failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    #[error("Search API key not found. Set BRAVE_API_KEY or search.api_key in the config.")]
    MissingCredentials,

    #[error("Search API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Search request timed out after {0} seconds")]
    Timeout(u64),

    #[error("Failed to reach the search API: {0}")]
    Transport(String),

    #[error("Failed to parse search response: {0}")]
    Decode(String),
}

/// One web search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub published: String,
}

/// Search-provider service
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchHit>, SearchError>;
}

/// Brave Search web API client
pub struct BraveSearch {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    timeout: Duration,
}

impl BraveSearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: BRAVE_ENDPOINT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_config(config: &wrench_config::Config) -> Self {
        Self::new(config.search_api_key())
    }

    /// Point the client at another endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[async_trait]
impl SearchProvider for BraveSearch {
    async fn search(&self, query: &str, count: u32) -> Result<Vec<SearchHit>, SearchError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(SearchError::MissingCredentials)?;

        debug!("Web search: {} (count {})", query, count);
        let timeout = self.timeout;
        let transport = |e: reqwest::Error| {
            if e.is_timeout() {
                SearchError::Timeout(timeout.as_secs())
            } else {
                SearchError::Transport(e.to_string())
            }
        };

        let count = count.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("count", count.as_str())])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.text().await.map_err(transport)?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BraveResponse =
            serde_json::from_str(&body).map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(parsed.web.map(|w| w.results).unwrap_or_default())
    }
}

/// Web search tool
pub struct WebSearchTool {
    provider: Arc<dyn SearchProvider>,
    default_count: u32,
}

impl WebSearchTool {
    pub fn new(provider: Arc<dyn SearchProvider>, default_count: u32) -> Self {
        Self {
            provider,
            default_count,
        }
    }
}

#[derive(Deserialize)]
struct WebSearchArgs {
    query: String,
    #[serde(default)]
    count: Option<i64>,
}

#[async_trait]
impl ToolTrait for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }
    fn description(&self) -> &str {
        "Search the web. Returns result titles, descriptions and URLs."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query" },
                "count": { "type": "integer", "description": "Number of results (1-20, default 10)" }
            },
            "required": ["query"]
        })
    }
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: WebSearchArgs = parse_args(args)?;
        if args.query.trim().is_empty() {
            return Err(ToolError::InvalidArguments(
                "Search query cannot be empty".to_string(),
            ));
        }
        let count = clamp_count(args.count.unwrap_or(i64::from(self.default_count)));

        let results = self
            .provider
            .search(&args.query, count)
            .await
            .map_err(|e| ToolError::Provider(e.to_string()))?;

        Ok(json!({
            "query": args.query,
            "results_count": results.len(),
            "results": results,
        }))
    }
}

fn clamp_count(count: i64) -> u32 {
    // Both bounds fit in u32.
    count.clamp(MIN_COUNT, MAX_COUNT) as u32
}
