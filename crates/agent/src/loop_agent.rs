//! Agent loop - reason, act, observe
//!
//! One user turn runs the model repeatedly: every response that carries tool
//! calls has those calls dispatched in order and their formatted results
//! appended to the working transcript. The turn ends when a response has no
//! tool calls, the model call fails, or the iteration cap is reached.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use wrench_config::{expand_home, Config};
use wrench_provider::{ChatParams, Provider, Reply, ToolCallDef, ToolChoice};
use wrench_session::{ConversationHistory, Role};

use crate::context::ContextBuilder;
use crate::format::format_tool_result;
use crate::tools::{SearchProvider, ToolRegistry};

/// Answer used when the model never produced any text
pub const NO_RESPONSE: &str = "I couldn't generate a response.";

/// Loop settings, usually derived from [`Config`]
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_iterations: u32,
    pub recent_messages: usize,
    pub history_file: String,
    pub shell_timeout: Duration,
    pub search_max_results: u32,
}

impl AgentSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            model: config.agent.model.clone(),
            temperature: config.agent.temperature,
            max_tokens: config.agent.max_tokens,
            max_iterations: config.agent.max_iterations,
            recent_messages: config.agent.recent_messages,
            history_file: config.agent.history_file.clone(),
            shell_timeout: Duration::from_secs(config.agent.shell_timeout_secs),
            search_max_results: config.search.max_results,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// How a turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The model answered without requesting tools
    Completed,
    /// The iteration cap stopped the loop while tools were still requested
    SafetyLimit,
    /// The model call failed
    ProviderFailed,
}

/// Result of one user turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub answer: String,
    pub iterations: u32,
    pub termination: Termination,
}

/// Per-turn loop bookkeeping
#[derive(Debug, Default)]
struct LoopState {
    iterations: u32,
    last_text: Option<String>,
    /// The latest response still asked for tools
    pending_tools: bool,
}

/// The agent loop drives the model and the tool registry for one session
pub struct AgentLoop<P: Provider> {
    provider: Arc<P>,
    settings: AgentSettings,
    search: Arc<dyn SearchProvider>,
    working_dir: PathBuf,
    context: ContextBuilder,
    tools: ToolRegistry,
    history: ConversationHistory,
}

impl<P: Provider> AgentLoop<P> {
    /// Create the working directory if needed, load its history and build
    /// the default tool set confined to it.
    pub async fn new(
        provider: P,
        working_dir: impl AsRef<Path>,
        settings: AgentSettings,
        search: Arc<dyn SearchProvider>,
    ) -> crate::Result<Self> {
        let working_dir = prepare_dir(working_dir.as_ref()).await?;
        let history = ConversationHistory::load(
            working_dir.join(&settings.history_file),
            &working_dir,
            &settings.model,
        )
        .await;
        let tools = build_tools(&working_dir, &settings, &search);

        info!(
            "Agent ready in {:?} with {} tools, {} messages of history",
            working_dir,
            tools.len(),
            history.len()
        );

        Ok(Self {
            provider: Arc::new(provider),
            context: ContextBuilder::new(&working_dir),
            settings,
            search,
            working_dir,
            tools,
            history,
        })
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Registry access for adding or replacing tools
    pub fn tools_mut(&mut self) -> &mut ToolRegistry {
        &mut self.tools
    }

    /// Run one turn and persist the history. Save failures are logged only.
    pub async fn process_message(&mut self, input: &str) -> TurnOutcome {
        let outcome = self.react_loop(input).await;
        if let Err(e) = self.history.save().await {
            warn!("Failed to save history to {:?}: {}", self.history.path(), e);
        }
        outcome
    }

    /// Run one turn without persisting
    pub async fn react_loop(&mut self, input: &str) -> TurnOutcome {
        info!("Starting turn: {}", preview(input, 50));
        self.history.append(Role::User, input);

        let mut messages = self
            .context
            .build_messages(self.history.recent(self.settings.recent_messages), input);
        let definitions = self.tools.definitions();
        let mut state = LoopState::default();

        while state.iterations < self.settings.max_iterations {
            state.iterations += 1;
            debug!("Agent iteration {}", state.iterations);

            let params = ChatParams {
                model: self.settings.model.clone(),
                messages: messages.clone(),
                tools: definitions.clone(),
                max_tokens: self.settings.max_tokens,
                temperature: self.settings.temperature,
                tool_choice: ToolChoice::Auto,
            };

            let response = match self.provider.chat(params).await {
                Ok(response) => response,
                Err(e) => {
                    error!("Model call failed: {}", e);
                    let answer = format!("Error: Model API error: {}", e);
                    self.history.append(Role::Assistant, &answer);
                    return TurnOutcome {
                        answer,
                        iterations: state.iterations,
                        termination: Termination::ProviderFailed,
                    };
                }
            };

            if let Reply::Malformed { detail } = &response.reply {
                warn!("Malformed model response: {}", detail);
                state.last_text = Some(format!("Response parsing error, raw response: {}", detail));
                state.pending_tools = false;
                break;
            }

            let text = response.joined_text();
            if let Some(text) = &text {
                debug!("Model response: {}", preview(text, 100));
                state.last_text = Some(text.clone());
            }

            let calls = response.tool_calls();
            state.pending_tools = !calls.is_empty();
            if calls.is_empty() {
                debug!("No tool calls, finishing turn");
                break;
            }

            info!("Executing {} tool call(s)", calls.len());
            ContextBuilder::add_assistant_message(
                &mut messages,
                text.as_deref(),
                Some(calls.iter().map(ToolCallDef::from).collect()),
            );

            for call in calls {
                let result = self.tools.dispatch(&call.name, call.arguments.clone()).await;
                match &result.outcome {
                    Ok(_) => info!("Tool {} completed", call.name),
                    Err(e) => warn!("Tool {} failed: {}", call.name, e),
                }
                let formatted = format_tool_result(&result);
                ContextBuilder::add_tool_result(&mut messages, &call.id, &call.name, &formatted);
            }
        }

        let mut answer = state.last_text.unwrap_or_else(|| NO_RESPONSE.to_string());
        let termination = if state.pending_tools || self.settings.max_iterations == 0 {
            warn!(
                "Hit safety limit of {} iterations",
                self.settings.max_iterations
            );
            answer.push_str(&format!(
                "\n\n(Note: I reached my processing limit of {} iterations. You may want to break this down into smaller steps.)",
                self.settings.max_iterations
            ));
            Termination::SafetyLimit
        } else {
            Termination::Completed
        };

        self.history.append(Role::Assistant, &answer);
        info!("Turn completed in {} iteration(s)", state.iterations);

        TurnOutcome {
            answer,
            iterations: state.iterations,
            termination,
        }
    }

    /// Empty the history and delete its file
    pub async fn clear_history(&mut self) -> crate::Result<()> {
        self.history.clear().await?;
        Ok(())
    }

    /// Re-root the agent. Relative paths resolve against the current working
    /// directory. Tools are rebuilt and the history file moves along; the
    /// in-memory conversation is kept.
    pub async fn change_working_directory(&mut self, dir: &str) -> crate::Result<PathBuf> {
        let target = expand_home(dir);
        let target = if target.is_absolute() {
            target
        } else {
            self.working_dir.join(target)
        };
        let working_dir = prepare_dir(&target).await?;

        self.tools = build_tools(&working_dir, &self.settings, &self.search);
        self.context = ContextBuilder::new(&working_dir);
        self.history.relocate(
            working_dir.join(&self.settings.history_file),
            &working_dir,
        );
        self.working_dir = working_dir;

        info!("Changed working directory to {:?}", self.working_dir);
        Ok(self.working_dir.clone())
    }
}

fn build_tools(
    working_dir: &Path,
    settings: &AgentSettings,
    search: &Arc<dyn SearchProvider>,
) -> ToolRegistry {
    ToolRegistry::with_defaults(
        working_dir,
        settings.shell_timeout,
        Arc::clone(search),
        settings.search_max_results,
    )
}

async fn prepare_dir(dir: &Path) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::canonicalize(dir).await
}

/// First `max_chars` characters of `text`, with `...` when cut
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("exactly10!", 10), "exactly10!");
        assert_eq!(preview("abcdefghijk", 3), "abc...");
        assert_eq!(preview("ééééé", 2), "éé...");
    }

    #[test]
    fn test_settings_from_config_defaults() {
        let settings = AgentSettings::default();
        assert_eq!(settings.max_iterations, 20);
        assert_eq!(settings.recent_messages, 10);
        assert_eq!(settings.history_file, "agent_history.json");
        assert_eq!(settings.shell_timeout, Duration::from_secs(10));
        assert_eq!(settings.search_max_results, 10);
    }
}
