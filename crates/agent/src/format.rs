//! Render tool results as transcript text for the model
//!
//! Presentation only: the outcome was already decided by the tool.

use serde_json::Value;

use crate::tools::ToolResult;

/// Cap on each shell stream in the rendered result
pub const MAX_STREAM_BYTES: usize = 10_000;

/// Web results shown per search
pub const MAX_WEB_RESULTS: usize = 5;

/// Samples shown per matching file
pub const MAX_SEARCH_SAMPLES: usize = 3;

pub fn format_tool_result(result: &ToolResult) -> String {
    let payload = match &result.outcome {
        Ok(payload) => payload,
        Err(e) => return format!("Tool {} failed: {}", result.tool, e),
    };

    match result.tool.as_str() {
        "read_file" => format_read(payload),
        "write_file" => format!(
            "Successfully wrote to {} ({} bytes)",
            str_field(payload, "path"),
            payload.get("size").and_then(Value::as_u64).unwrap_or(0)
        ),
        "list_files" => format_listing(payload),
        "search_files" => format_search(payload),
        "shell_exec" => format_shell(payload),
        "web_search" => format_web(payload),
        other => format!("Tool {} completed: {}", other, payload),
    }
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or("unknown")
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn format_read(payload: &Value) -> String {
    format!(
        "File content from {}:\n\n{}",
        str_field(payload, "path"),
        payload.get("content").and_then(Value::as_str).unwrap_or("")
    )
}

fn format_listing(payload: &Value) -> String {
    let mut out = format!("Directory listing for {}:\n", str_field(payload, "path"));
    let dirs = array_field(payload, "directories");
    let files = array_field(payload, "files");

    if !dirs.is_empty() {
        out.push_str("Directories:\n");
        for dir in dirs {
            out.push_str(&format!("  [DIR] {}\n", str_field(dir, "name")));
        }
    }
    if !files.is_empty() {
        out.push_str("Files:\n");
        for file in files {
            out.push_str(&format!(
                "  [FILE] {} ({} bytes)\n",
                str_field(file, "name"),
                file.get("size").and_then(Value::as_u64).unwrap_or(0)
            ));
        }
    }
    out.push_str(&format!(
        "Total items: {}",
        payload.get("total_items").and_then(Value::as_u64).unwrap_or(0)
    ));
    out
}

fn format_search(payload: &Value) -> String {
    let mut out = format!(
        "Search results for '{}' in {}:\n",
        str_field(payload, "pattern"),
        str_field(payload, "search_path")
    );
    let matches = array_field(payload, "matches");
    if matches.is_empty() {
        out.push_str("No matches found.\n");
    }
    for m in matches {
        out.push_str(&format!(
            "  {}: {} matches\n",
            str_field(m, "file"),
            m.get("matches").and_then(Value::as_u64).unwrap_or(0)
        ));
        let samples: Vec<&str> = array_field(m, "sample_matches")
            .iter()
            .filter_map(Value::as_str)
            .take(MAX_SEARCH_SAMPLES)
            .collect();
        if !samples.is_empty() {
            out.push_str(&format!("    Examples: {}\n", samples.join(", ")));
        }
    }
    out.push_str(&format!(
        "Total files with matches: {}",
        payload
            .get("total_files_with_matches")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    ));
    let skipped = payload
        .get("skipped_files")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if skipped > 0 {
        out.push_str(&format!("\nSkipped non-text files: {}", skipped));
    }
    out
}

fn format_shell(payload: &Value) -> String {
    let mut out = format!("Shell command executed: {}\n", str_field(payload, "command"));
    out.push_str(&format!(
        "Exit code: {}\n",
        payload.get("exit_code").and_then(Value::as_i64).unwrap_or(-1)
    ));
    let stdout = payload.get("stdout").and_then(Value::as_str).unwrap_or("").trim();
    let stderr = payload.get("stderr").and_then(Value::as_str).unwrap_or("").trim();
    if !stdout.is_empty() {
        out.push_str(&format!("Output:\n{}\n", cap(stdout, MAX_STREAM_BYTES)));
    }
    if !stderr.is_empty() {
        out.push_str(&format!("Error output:\n{}\n", cap(stderr, MAX_STREAM_BYTES)));
    }
    out.push_str(&format!(
        "Working directory: {}",
        str_field(payload, "working_directory")
    ));
    out
}

fn format_web(payload: &Value) -> String {
    let mut out = format!("Web search results for '{}':\n", str_field(payload, "query"));
    let results = array_field(payload, "results");
    if results.is_empty() {
        out.push_str("No search results found.\n");
    }
    for (i, hit) in results.iter().take(MAX_WEB_RESULTS).enumerate() {
        let field = |key: &str, fallback: &'static str| {
            hit.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .unwrap_or(fallback)
                .to_string()
        };
        out.push_str(&format!(
            "{}. {}\n   {}\n   {}\n\n",
            i + 1,
            field("title", "No title"),
            field("description", "No description"),
            field("url", "No URL")
        ));
    }
    out.push_str(&format!(
        "Total results: {}",
        payload
            .get("results_count")
            .and_then(Value::as_u64)
            .unwrap_or(0)
    ));
    out
}

/// Truncate to at most `max` bytes on a char boundary
fn cap(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!(
        "{}\n... (truncated, {} more bytes)",
        &text[..end],
        text.len() - end
    )
}
