//! Common utilities for secagent CLI integration tests

use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Test configuration for integration tests
pub struct TestConfig {
    pub temp_dir: TempDir,
    pub secagent_binary: PathBuf,
}

impl TestConfig {
    /// Create a new test configuration with temporary directory
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        Self {
            temp_dir,
            secagent_binary: PathBuf::from(env!("CARGO_BIN_EXE_secagent")),
        }
    }

    /// Get the path to the temporary directory
    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Command running secagent with HOME in the temp directory and
    /// no SECAGENT_* overrides from the developer's shell
    pub fn secagent_command(&self) -> Command {
        let mut cmd = Command::new(&self.secagent_binary);
        cmd.env("HOME", self.temp_path())
            .env_remove("RUST_LOG")
            .env_remove("SECAGENT_MODEL")
            .env_remove("SECAGENT_HOST")
            .env_remove("SECAGENT_MODE")
            .env_remove("SECAGENT_MAX_TOOL_TURNS")
            .env_remove("SECAGENT_LOG_TO_FILE")
            .env_remove("SECAGENT_OTLP_ENDPOINT");
        cmd
    }
}

/// One streamed `/api/chat` body that yields `text` in two chunks
pub fn ollama_stream(text: &str) -> String {
    let split = text
        .char_indices()
        .nth(text.chars().count() / 2)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let (first, second) = text.split_at(split);

    let line = |content: &str, done: bool| {
        serde_json::json!({
            "model": "llama3.2",
            "message": {"role": "assistant", "content": content},
            "done": done
        })
        .to_string()
    };

    format!(
        "{}\n{}\n{}\n",
        line(first, false),
        line(second, false),
        line("", true)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::new();
        assert!(config.temp_path().exists());
        assert!(config.secagent_binary.file_name().is_some());
    }

    #[test]
    fn test_ollama_stream_lines() {
        let body = ollama_stream("hello world");
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("\"done\":true"));
    }
}
