//! search_files: recursive case-insensitive regex search

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use super::{parse_args, ToolError, ToolTrait};
use crate::sandbox::{relative_to, Sandbox};

/// Sample matches kept per file
const MAX_SAMPLES: usize = 5;

/// Search text files under a directory
pub struct SearchFilesTool {
    sandbox: Sandbox,
}

impl SearchFilesTool {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            sandbox: Sandbox::new(working_dir),
        }
    }
}

fn default_path() -> String {
    ".".to_string()
}

#[derive(Deserialize)]
struct SearchFilesArgs {
    #[serde(default = "default_path")]
    path: String,
    pattern: String,
    #[serde(default)]
    file_extension: Option<String>,
}

#[derive(Debug, Serialize)]
struct FileMatches {
    file: String,
    matches: usize,
    sample_matches: Vec<String>,
}

#[derive(Debug, Default)]
struct Scan {
    matches: Vec<FileMatches>,
    skipped: usize,
}

#[async_trait]
impl ToolTrait for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }
    fn description(&self) -> &str {
        "Search for a regular expression (case-insensitive) in text files under a directory."
    }
    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Directory to search, relative to the working directory" },
                "pattern": { "type": "string", "description": "Regular expression to search for" },
                "file_extension": { "type": "string", "description": "Only search files ending with this suffix, e.g. \".py\"" }
            },
            "required": ["path", "pattern"]
        })
    }
    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        let args: SearchFilesArgs = parse_args(args)?;
        let dir = self.sandbox.validate(&args.path).await?;

        let meta = tokio::fs::metadata(dir.as_path())
            .await
            .map_err(|e| ToolError::from_io(&e, "Directory", &args.path))?;
        if !meta.is_dir() {
            return Err(ToolError::WrongType {
                expected: "directory",
                path: args.path,
            });
        }

        let regex = RegexBuilder::new(&args.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| ToolError::InvalidPattern(e.to_string()))?;

        let extension = args
            .file_extension
            .as_deref()
            .filter(|ext| !ext.is_empty())
            .map(str::to_lowercase);

        let base = dir.as_path().to_path_buf();
        let root = dir.root().to_path_buf();
        let scan = tokio::task::spawn_blocking(move || {
            scan_tree(&base, &root, &regex, extension.as_deref())
        })
        .await
        .map_err(|e| ToolError::Internal(e.to_string()))?;

        debug!(
            "Search for {:?} matched {} files, skipped {}",
            args.pattern,
            scan.matches.len(),
            scan.skipped
        );

        Ok(json!({
            "pattern": args.pattern,
            "search_path": dir.relative(),
            "file_extension": args.file_extension,
            "total_files_with_matches": scan.matches.len(),
            "skipped_files": scan.skipped,
            "matches": scan.matches,
        }))
    }
}

/// Walk `base` without following symlinks, in file-name order
fn scan_tree(base: &Path, root: &Path, regex: &Regex, extension: Option<&str>) -> Scan {
    let mut scan = Scan::default();

    for entry in WalkDir::new(base).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(ext) = extension {
            if !entry
                .file_name()
                .to_string_lossy()
                .to_lowercase()
                .ends_with(ext)
            {
                continue;
            }
        }

        let content = match std::fs::read(entry.path()).map(String::from_utf8) {
            Ok(Ok(text)) => text,
            Ok(Err(_)) | Err(_) => {
                scan.skipped += 1;
                continue;
            }
        };

        let mut count = 0;
        let mut samples = Vec::new();
        for found in regex.find_iter(&content) {
            count += 1;
            if samples.len() < MAX_SAMPLES {
                samples.push(found.as_str().to_string());
            }
        }
        if count > 0 {
            scan.matches.push(FileMatches {
                file: relative_to(entry.path(), root),
                matches: count,
                sample_matches: samples,
            });
        }
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_tree_counts_and_samples() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(
            root.join("a.txt"),
            "todo 1\nTODO 2\nToDo 3\ntodo 4\ntodo 5\ntodo 6",
        )
        .unwrap();
        std::fs::write(root.join("b.txt"), "nothing here").unwrap();
        std::fs::write(root.join("c.bin"), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        let regex = RegexBuilder::new("todo").case_insensitive(true).build().unwrap();
        let scan = scan_tree(&root, &root, &regex, None);

        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].file, "a.txt");
        assert_eq!(scan.matches[0].matches, 6);
        assert_eq!(scan.matches[0].sample_matches.len(), MAX_SAMPLES);
        assert_eq!(scan.matches[0].sample_matches[1], "TODO");
        assert_eq!(scan.skipped, 1);
    }

    #[test]
    fn test_scan_tree_extension_filter() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        std::fs::write(root.join("main.PY"), "# TODO").unwrap();
        std::fs::write(root.join("notes.md"), "TODO").unwrap();

        let regex = RegexBuilder::new("todo").case_insensitive(true).build().unwrap();
        let scan = scan_tree(&root, &root, &regex, Some(".py"));

        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].file, "main.PY");
    }
}
