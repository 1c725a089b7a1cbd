//! Agent loop tests
//!
//! The model is a scripted mock; the tools run for real against a temp dir.

use async_trait::async_trait;
use mockall::mock;
use serde_json::json;
use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use wrench_agent::tools::{SearchError, SearchHit, SearchProvider};
use wrench_agent::{AgentLoop, AgentSettings, Termination};
use wrench_provider::{ChatParams, ChatResponse, Provider, ProviderError, ToolCall};

mock! {
    pub Provider {}

    #[async_trait]
    impl Provider for Provider {
        async fn chat(&self, params: ChatParams) -> Result<ChatResponse, ProviderError>;
        fn default_model(&self) -> String;
        fn is_configured(&self) -> bool;
    }
}

struct NoSearch;

#[async_trait]
impl SearchProvider for NoSearch {
    async fn search(&self, _query: &str, _count: u32) -> Result<Vec<SearchHit>, SearchError> {
        Err(SearchError::MissingCredentials)
    }
}

type Seen = Arc<Mutex<Vec<ChatParams>>>;

/// A provider that answers with `replies` in order and records each request
fn scripted(replies: Vec<Result<ChatResponse, ProviderError>>) -> (MockProvider, Seen) {
    let seen: Seen = Arc::new(Mutex::new(Vec::new()));
    let calls = replies.len();
    let queue = Arc::new(Mutex::new(VecDeque::from(replies)));

    let mut mock = MockProvider::new();
    let recorder = seen.clone();
    mock.expect_chat().times(calls).returning(move |params| {
        recorder.lock().unwrap().push(params);
        queue
            .lock()
            .unwrap()
            .pop_front()
            .expect("provider called more often than scripted")
    });
    (mock, seen)
}

fn call(id: &str, name: &str, args: serde_json::Value) -> ToolCall {
    ToolCall::new(id, name, args)
}

fn tool_reply(calls: Vec<ToolCall>) -> Result<ChatResponse, ProviderError> {
    Ok(ChatResponse::with_tool_calls(None, calls))
}

fn text_reply(text: &str) -> Result<ChatResponse, ProviderError> {
    Ok(ChatResponse::text(text))
}

async fn build_agent(
    mock: MockProvider,
    dir: &TempDir,
    settings: AgentSettings,
) -> AgentLoop<MockProvider> {
    AgentLoop::new(mock, dir.path(), settings, Arc::new(NoSearch))
        .await
        .unwrap()
}

fn last_message_content(params: &ChatParams) -> String {
    params
        .messages
        .last()
        .and_then(|m| m.content.clone())
        .unwrap_or_default()
}

#[tokio::test]
async fn test_plain_answer_without_tools() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, seen) = scripted(vec![text_reply("Hi there!")]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent.process_message("Hello").await;

    assert_eq!(outcome.answer, "Hi there!");
    assert_eq!(outcome.iterations, 1);
    assert_eq!(outcome.termination, Termination::Completed);

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0].tools.len(), 6);
    assert_eq!(seen[0].messages[0].role, "system");
    assert_eq!(last_message_content(&seen[0]), "Hello");
}

#[tokio::test]
async fn test_write_file_scenario() {
    let temp_dir = TempDir::new().unwrap();
    let content = "def add_numbers(a, b):\n    return a + b\n";
    let (mock, seen) = scripted(vec![
        tool_reply(vec![call(
            "call_1",
            "write_file",
            json!({"path": "add.py", "content": content}),
        )]),
        text_reply("- Created file: add.py\n- Added function: add_numbers()"),
    ]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent
        .process_message("Create a Python file with a function that adds two numbers")
        .await;

    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.iterations, 2);
    assert!(outcome.answer.contains("Created file: add.py"));
    assert_eq!(
        fs::read_to_string(temp_dir.path().join("add.py")).unwrap(),
        content
    );

    let seen = seen.lock().unwrap();
    let second = &seen[1];
    let tool_msg = second.messages.last().unwrap();
    assert_eq!(tool_msg.role, "tool");
    assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(
        tool_msg.content.as_deref(),
        Some(format!("Successfully wrote to add.py ({} bytes)", content.len()).as_str())
    );
    let assistant = &second.messages[second.messages.len() - 2];
    assert_eq!(assistant.role, "assistant");
    assert_eq!(assistant.tool_calls.as_ref().unwrap()[0].function.name, "write_file");
}

#[tokio::test]
async fn test_search_scenario_reports_matches() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("a.py"), "# TODO one\nx = 1\n").unwrap();
    fs::write(temp_dir.path().join("b.py"), "# todo two\n").unwrap();
    fs::write(temp_dir.path().join("c.txt"), "TODO not python\n").unwrap();

    let (mock, seen) = scripted(vec![
        tool_reply(vec![call(
            "call_1",
            "search_files",
            json!({"path": ".", "pattern": "TODO", "file_extension": ".py"}),
        )]),
        text_reply("Found TODOs in a.py and b.py"),
    ]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent
        .process_message("Find all TODO comments in Python files")
        .await;

    assert_eq!(outcome.termination, Termination::Completed);
    let seen = seen.lock().unwrap();
    let rendered = last_message_content(&seen[1]);
    assert!(rendered.contains("a.py: 1 matches"), "got {}", rendered);
    assert!(rendered.contains("b.py: 1 matches"));
    assert!(!rendered.contains("c.txt"));
    assert!(rendered.contains("Total files with matches: 2"));
}

#[tokio::test]
async fn test_denied_path_is_observation_not_failure() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, seen) = scripted(vec![
        tool_reply(vec![call(
            "call_1",
            "read_file",
            json!({"path": "../../etc/passwd"}),
        )]),
        text_reply("I cannot read files outside the working directory."),
    ]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent.process_message("Read ../../etc/passwd").await;

    assert_eq!(outcome.termination, Termination::Completed);
    assert_eq!(outcome.iterations, 2);
    let seen = seen.lock().unwrap();
    let rendered = last_message_content(&seen[1]);
    assert!(rendered.starts_with("Tool read_file failed: Access denied"), "got {}", rendered);
}

#[tokio::test]
async fn test_unknown_tool_does_not_abort_turn() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, seen) = scripted(vec![
        tool_reply(vec![
            call("call_1", "teleport", json!({})),
            call("call_2", "list_files", json!({"path": "."})),
        ]),
        text_reply("done"),
    ]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent.process_message("go").await;

    assert_eq!(outcome.answer, "done");
    let seen = seen.lock().unwrap();
    let messages = &seen[1].messages;
    let tool_messages: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == "tool")
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert_eq!(tool_messages[0], "Tool teleport failed: Unknown tool: teleport");
    assert!(tool_messages[1].starts_with("Directory listing for .:"));
}

#[tokio::test]
async fn test_later_call_in_batch_sees_earlier_write() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, seen) = scripted(vec![
        tool_reply(vec![
            call("call_1", "write_file", json!({"path": "n.txt", "content": "v"})),
            call("call_2", "read_file", json!({"path": "n.txt"})),
        ]),
        text_reply("read it back"),
    ]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent.process_message("write then read").await;

    assert_eq!(outcome.answer, "read it back");
    let seen = seen.lock().unwrap();
    let tool_messages: Vec<&str> = seen[1]
        .messages
        .iter()
        .filter(|m| m.role == "tool")
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert_eq!(tool_messages.len(), 2);
    assert!(tool_messages[0].starts_with("Successfully wrote to n.txt"));
    assert!(tool_messages[1].starts_with("File content from n.txt:"), "got {}", tool_messages[1]);
    assert!(tool_messages[1].ends_with("v"));
}

#[tokio::test]
async fn test_safety_limit_stops_at_cap() {
    let temp_dir = TempDir::new().unwrap();
    let settings = AgentSettings {
        max_iterations: 3,
        ..AgentSettings::default()
    };
    let replies = (0..3)
        .map(|i| {
            Ok(ChatResponse::with_tool_calls(
                Some(format!("Looking around ({})", i)),
                vec![call(&format!("call_{}", i), "list_files", json!({"path": "."}))],
            ))
        })
        .collect();
    let (mock, seen) = scripted(replies);
    let mut agent = build_agent(mock, &temp_dir, settings).await;

    let outcome = agent.process_message("Loop forever").await;

    assert_eq!(outcome.termination, Termination::SafetyLimit);
    assert_eq!(outcome.iterations, 3);
    assert_eq!(seen.lock().unwrap().len(), 3);
    assert!(outcome.answer.starts_with("Looking around (2)"));
    assert!(outcome
        .answer
        .contains("(Note: I reached my processing limit of 3 iterations."));
}

#[tokio::test]
async fn test_provider_error_ends_turn() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, _seen) = scripted(vec![Err(ProviderError::Api("upstream down".to_string()))]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent.process_message("Hello").await;

    assert_eq!(outcome.termination, Termination::ProviderFailed);
    assert_eq!(outcome.answer, "Error: Model API error: API error: upstream down");
    assert_eq!(agent.history().last().unwrap().content, outcome.answer);
}

#[tokio::test]
async fn test_malformed_reply_ends_turn() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, _seen) = scripted(vec![Ok(ChatResponse::malformed("{\"choices\": []}"))]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent.process_message("Hello").await;

    assert_eq!(outcome.termination, Termination::Completed);
    assert!(outcome
        .answer
        .starts_with("Response parsing error, raw response:"));
}

#[tokio::test]
async fn test_tool_calls_without_text_then_silence() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, _seen) = scripted(vec![
        tool_reply(vec![call("call_1", "list_files", json!({}))]),
        Ok(ChatResponse::with_tool_calls(None, Vec::new())),
    ]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let outcome = agent.process_message("Hello").await;

    assert_eq!(outcome.answer, "I couldn't generate a response.");
    assert_eq!(outcome.termination, Termination::Completed);
}

#[tokio::test]
async fn test_history_is_persisted_and_reloaded() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, _seen) = scripted(vec![text_reply("Persisted response")]);
    let mut first = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    first.process_message("Remember me").await;

    let file = temp_dir.path().join("agent_history.json");
    let doc: serde_json::Value = serde_json::from_str(&fs::read_to_string(&file).unwrap()).unwrap();
    let messages = doc["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "user");
    assert_eq!(messages[0]["content"], "Remember me");
    assert_eq!(messages[1]["role"], "assistant");
    assert!(doc["working_directory"].is_string());
    assert!(doc["model_name"].is_string());

    let (mock, seen) = scripted(vec![text_reply("Welcome back")]);
    let mut second = build_agent(mock, &temp_dir, AgentSettings::default()).await;
    assert_eq!(second.history().len(), 2);

    second.process_message("Still there?").await;
    let seen = seen.lock().unwrap();
    let contents: Vec<&str> = seen[0]
        .messages
        .iter()
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert!(contents.contains(&"Remember me"));
    assert!(contents.contains(&"Persisted response"));
}

#[tokio::test]
async fn test_only_recent_window_reaches_model() {
    let temp_dir = TempDir::new().unwrap();
    let old: Vec<serde_json::Value> = (0..6)
        .map(|i| {
            json!({
                "role": if i % 2 == 0 { "user" } else { "assistant" },
                "content": format!("old-{}", i),
                "timestamp": "2024-01-01T00:00:00Z"
            })
        })
        .collect();
    fs::write(
        temp_dir.path().join("agent_history.json"),
        json!({"messages": old, "working_directory": "", "model_name": ""}).to_string(),
    )
    .unwrap();

    let settings = AgentSettings {
        recent_messages: 2,
        ..AgentSettings::default()
    };
    let (mock, seen) = scripted(vec![text_reply("ok")]);
    let mut agent = build_agent(mock, &temp_dir, settings).await;

    agent.process_message("new question").await;

    let seen = seen.lock().unwrap();
    let contents: Vec<&str> = seen[0]
        .messages
        .iter()
        .skip(2)
        .filter_map(|m| m.content.as_deref())
        .collect();
    assert_eq!(contents, vec!["old-5", "new question"]);
    assert_eq!(agent.history().len(), 8);
}

#[tokio::test]
async fn test_legacy_model_role_is_read_as_assistant() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("agent_history.json"),
        json!({"messages": [
            {"role": "user", "content": "q"},
            {"role": "model", "content": "a", "timestamp": 12345}
        ]})
        .to_string(),
    )
    .unwrap();

    let (mock, seen) = scripted(vec![text_reply("ok")]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;
    agent.process_message("next").await;

    let seen = seen.lock().unwrap();
    let answer = seen[0]
        .messages
        .iter()
        .find(|m| m.content.as_deref() == Some("a"))
        .unwrap();
    assert_eq!(answer.role, "assistant");
}

#[tokio::test]
async fn test_clear_history_deletes_file() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, _seen) = scripted(vec![text_reply("hi")]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    agent.process_message("hello").await;
    let file = temp_dir.path().join("agent_history.json");
    assert!(file.exists());

    agent.clear_history().await.unwrap();
    assert!(agent.history().is_empty());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_change_working_directory() {
    let temp_dir = TempDir::new().unwrap();
    let (mock, _seen) = scripted(vec![
        tool_reply(vec![call(
            "call_1",
            "write_file",
            json!({"path": "inside.txt", "content": "x"}),
        )]),
        text_reply("written"),
    ]);
    let mut agent = build_agent(mock, &temp_dir, AgentSettings::default()).await;

    let new_dir = agent.change_working_directory("project").await.unwrap();
    let expected = temp_dir.path().canonicalize().unwrap().join("project");

    assert_eq!(new_dir, expected);
    assert_eq!(agent.working_dir(), expected.as_path());
    assert_eq!(agent.history().path(), expected.join("agent_history.json"));

    agent.process_message("write a file").await;
    assert!(expected.join("inside.txt").exists());
    assert!(!temp_dir.path().join("inside.txt").exists());
    assert!(expected.join("agent_history.json").exists());
}
