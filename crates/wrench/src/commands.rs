//! wrench command implementations

use anyhow::{bail, Context, Result};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use wrench_agent::loop_agent::preview;
use wrench_agent::tools::BraveSearch;
use wrench_agent::{AgentLoop, AgentSettings, Termination, ToolRegistry};
use wrench_config::{self, Config};
use wrench_provider::{OpenRouterProvider, Provider};
use wrench_session::Message;

/// Messages shown by the `history` command
const HISTORY_SHOWN: usize = 10;

/// Characters shown per history entry
const HISTORY_PREVIEW: usize = 150;

const HELP: &str = "\
Commands:
  exit, quit   Leave the session
  clear        Delete the conversation history
  history      Show the last 10 messages
  cd <dir>     Switch the working directory
  help, ?      Show this help
Anything else is sent to the agent.";

/// One line typed at the interactive prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Exit,
    Clear,
    History,
    Help,
    ChangeDir(String),
    Empty,
    Message(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => return ReplCommand::Empty,
            "exit" | "quit" => return ReplCommand::Exit,
            "clear" => return ReplCommand::Clear,
            "history" => return ReplCommand::History,
            "help" | "?" => return ReplCommand::Help,
            _ => {}
        }
        match line.strip_prefix("cd ") {
            Some(dir) if !dir.trim().is_empty() => ReplCommand::ChangeDir(dir.trim().to_string()),
            _ => ReplCommand::Message(line.to_string()),
        }
    }
}

/// `[role HH:MM:SS] content`, content cut to `max_chars`
pub fn format_history_entry(message: &Message, max_chars: usize) -> String {
    let stamp = message
        .timestamp
        .map(|t| format!(" {}", t.format("%H:%M:%S")))
        .unwrap_or_default();
    format!(
        "[{}{}] {}",
        message.role,
        stamp,
        preview(&message.content, max_chars)
    )
}

/// Initialize config
pub async fn init_command() -> Result<()> {
    println!("Initializing wrench...");

    let config = wrench_config::init()
        .await
        .context("Failed to write the default config")?;

    println!("Config: {}", wrench_config::config_path().display());
    println!("Model:  {}", config.model());
    println!("\nNext steps:");
    println!("  1. Set OPENROUTER_API_KEY (or provider.api_key in the config)");
    println!("     Get one at: https://openrouter.ai/keys");
    println!("  2. Optionally set BRAVE_API_KEY for web search");
    println!("  3. Start chatting: wrench chat -m \"Hello!\"");

    Ok(())
}

/// Chat with the agent, once with `-m` or interactively
pub async fn chat_command(message: Option<String>, dir: Option<PathBuf>) -> Result<()> {
    let config = Config::load().await.context("Failed to load config")?;

    let api_key = config.api_key().context(
        "No API key configured. Set OPENROUTER_API_KEY or provider.api_key in ~/.wrench/config.json",
    )?;
    let provider = OpenRouterProvider::new(api_key, config.api_base(), Some(config.model()));
    debug!("Using model {}", provider.default_model());

    let working_dir = match dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };
    let search = Arc::new(BraveSearch::from_config(&config));
    let mut agent = AgentLoop::new(
        provider,
        &working_dir,
        AgentSettings::from_config(&config),
        search,
    )
    .await
    .with_context(|| format!("Failed to open working directory {}", working_dir.display()))?;

    if let Some(message) = message {
        let outcome = agent.process_message(&message).await;
        if outcome.termination == Termination::ProviderFailed {
            bail!("{}", outcome.answer);
        }
        println!("{}", outcome.answer);
        return Ok(());
    }

    interactive(&mut agent).await
}

async fn interactive<P: Provider>(agent: &mut AgentLoop<P>) -> Result<()> {
    println!("wrench interactive mode (type 'help' for commands, 'exit' to quit)");
    println!("Working directory: {}", agent.working_dir().display());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Exit => break,
            ReplCommand::Help => println!("{}", HELP),
            ReplCommand::Clear => match agent.clear_history().await {
                Ok(()) => println!("Conversation history cleared."),
                Err(e) => warn!("Failed to clear history: {}", e),
            },
            ReplCommand::History => {
                let recent = agent.history().recent(HISTORY_SHOWN);
                if recent.is_empty() {
                    println!("No conversation history.");
                }
                for entry in recent {
                    println!("{}", format_history_entry(entry, HISTORY_PREVIEW));
                }
            }
            ReplCommand::ChangeDir(dir) => match agent.change_working_directory(&dir).await {
                Ok(path) => println!("Working directory: {}", path.display()),
                Err(e) => println!("Cannot change directory to {}: {}", dir, e),
            },
            ReplCommand::Message(text) => {
                let outcome = agent.process_message(&text).await;
                println!("\n{}", outcome.answer);
            }
        }
    }

    println!("Goodbye.");
    Ok(())
}

/// Show status
pub async fn status_command() -> Result<()> {
    let config_path = wrench_config::config_path();
    let working_dir = std::env::current_dir().context("Failed to read the current directory")?;

    println!("wrench status");
    println!(
        "Config:     {} {}",
        config_path.display(),
        if config_path.exists() {
            "[OK]"
        } else {
            "[Missing, using defaults]"
        }
    );

    let config = Config::load().await.context("Failed to load config")?;
    let settings = AgentSettings::from_config(&config);
    println!("Directory:  {}", working_dir.display());
    println!("Model:      {}", config.model());
    println!(
        "API key:    {}",
        if config.has_api_key() { "[Set]" } else { "[Missing]" }
    );
    println!(
        "Search key: {}",
        if config.search_api_key().is_some() {
            "[Set]"
        } else {
            "[Missing]"
        }
    );
    println!("Max iterations: {}", settings.max_iterations);

    let tools = ToolRegistry::with_defaults(
        &working_dir,
        settings.shell_timeout,
        Arc::new(BraveSearch::from_config(&config)),
        settings.search_max_results,
    );
    println!("Tools:      {}", tools.names().join(", "));

    Ok(())
}
