use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tokio::process::Command;

use crate::tools::policy::ToolPolicy;
use crate::tools::registry::Operation;
use crate::tools::schema::{OperationSchema, ParamType, ParamValue, ParameterSpec};
use crate::tools::validator::ValidatedArgs;

pub struct ExecuteCommandTool;

impl ExecuteCommandTool {
    /// Get default shell for the platform
    fn default_shell() -> (&'static str, &'static str) {
        #[cfg(target_os = "windows")]
        return ("cmd", "/C");

        #[cfg(not(target_os = "windows"))]
        {
            if let Ok(shell) = std::env::var("SHELL") {
                if shell.contains("zsh") {
                    return ("zsh", "-c");
                } else if shell.contains("fish") {
                    return ("fish", "-c");
                }
            }
            ("bash", "-c")
        }
    }
}

#[async_trait]
impl Operation for ExecuteCommandTool {
    fn schema(&self) -> OperationSchema {
        OperationSchema::new(
            "execute_command",
            "Execute a shell command and return the output",
        )
        .param(ParameterSpec::required(
            "command",
            ParamType::String,
            "The shell command to execute",
        ))
        .param(ParameterSpec::optional(
            "timeout",
            ParamType::Integer,
            "Timeout in seconds",
            ParamValue::Integer(30),
        ))
        .param(ParameterSpec::optional(
            "cwd",
            ParamType::String,
            "Working directory for the command",
            ".".into(),
        ))
    }

    fn time_limit(&self, args: &ValidatedArgs) -> Option<Duration> {
        Some(Duration::from_secs(args.integer("timeout").max(1) as u64))
    }

    async fn authorize(&self, args: &ValidatedArgs, policy: &ToolPolicy) -> Result<()> {
        let command = args.text("command");
        let cwd = args.text("cwd");

        if command.trim().is_empty() {
            return Err(anyhow!("Command is empty"));
        }

        if !Path::new(cwd).is_dir() {
            return Err(anyhow!("Working directory not found: {}", cwd));
        }

        if !policy.authorize_command(command, cwd).await? {
            return Err(anyhow!("Command execution cancelled by user"));
        }
        Ok(())
    }

    async fn execute(&self, args: &ValidatedArgs, policy: &ToolPolicy) -> Result<String> {
        let command = args.text("command");
        let cwd = args.text("cwd");

        if command.trim().is_empty() {
            return Err(anyhow!("Command is empty"));
        }

        // Confirmation already happened in `authorize`
        policy.check_command(command)?;

        let (shell, shell_flag) = Self::default_shell();

        // The dispatcher drops this future on timeout; kill_on_drop takes the child with it
        let output = Command::new(shell)
            .args([shell_flag, command])
            .current_dir(cwd)
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute command")?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let exit_code = output.status.code().unwrap_or(-1);

        let mut result = format!("Command: {}\n", command);
        result.push_str(&format!("Working directory: {}\n", cwd));
        result.push_str(&format!("Exit code: {}\n\n", exit_code));

        if !stdout.is_empty() {
            result.push_str("=== STDOUT ===\n");
            result.push_str(&stdout);
            result.push('\n');
        }

        if !stderr.is_empty() {
            result.push_str("=== STDERR ===\n");
            result.push_str(&stderr);
            result.push('\n');
        }

        if stdout.is_empty() && stderr.is_empty() {
            result.push_str("(No output)\n");
        }

        Ok(result)
    }
}
