//! Shared helpers for wrench binary tests
#![allow(dead_code)]

use assert_cmd::Command;
use std::path::PathBuf;
use tempfile::{tempdir, TempDir};

/// Isolated home directory plus a working directory for the agent
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub config_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl TestEnv {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempdir()?;
        let config_dir = temp_dir.path().join(".wrench");
        let work_dir = temp_dir.path().join("work");
        std::fs::create_dir_all(&work_dir)?;

        Ok(Self {
            temp_dir,
            config_dir,
            work_dir,
        })
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.json")
    }

    /// The binary with HOME pointed at the sandbox and no inherited secrets
    pub fn command(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_wrench"));
        cmd.env("HOME", self.temp_dir.path())
            .env_remove("OPENROUTER_API_KEY")
            .env_remove("OPENAI_API_KEY")
            .env_remove("BRAVE_API_KEY")
            .env_remove("RUST_LOG")
            .current_dir(&self.work_dir);
        cmd
    }

    /// Config whose model endpoint is `api_base`
    pub fn write_config(&self, api_base: &str) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let config = serde_json::json!({
            "agent": { "model": "test/model" },
            "provider": { "api_key": "test-api-key", "api_base": api_base }
        });
        std::fs::write(self.config_file(), serde_json::to_string_pretty(&config)?)?;
        Ok(())
    }
}
