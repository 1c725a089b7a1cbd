//! Well-known locations

use std::path::PathBuf;

/// Base data directory (~/.wrench), falling back to a relative `.wrench`
/// when no home directory can be determined.
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".wrench"))
        .unwrap_or_else(|| PathBuf::from(".wrench"))
}

/// Configuration file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Expand a leading `~` or `~/` against the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
