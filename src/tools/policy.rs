use std::io::{self, Write};

use anyhow::{Context, Result, anyhow};

/// Asks the user whether `command` may run in `cwd`; blocking
pub type Confirmer = fn(&str, &str) -> io::Result<bool>;

/// Runtime switches guarding the side-effecting operations.
///
/// Read-only operations ignore the policy apart from the file size cap.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    /// Allow `execute_command`
    allow_command_execution: bool,

    /// Allow `delete_file` and `delete_directory`
    allow_delete: bool,

    /// Ask on stderr/stdin before running each command
    confirm_commands: bool,

    /// Largest file `get_file_contents` will load (bytes)
    max_file_size: u64,

    confirmer: Confirmer,
}

/// Commands refused even when command execution is enabled (case-insensitive substring match)
const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf",
    "rm -fr",
    "rmdir /s",
    "mkfs",
    "dd if=",
    ":(){ :|:& };:",
    "chmod -r 777",
    "chown -r",
    "shutdown",
    "reboot",
    "halt",
    "poweroff",
    "init 0",
    "init 6",
    "format c:",
];

impl ToolPolicy {
    pub fn new() -> Self {
        Self {
            allow_command_execution: false,
            allow_delete: false,
            confirm_commands: false,
            max_file_size: 10 * 1024 * 1024,
            confirmer: prompt_on_stdin,
        }
    }

    pub fn with_allow_command_execution(mut self, allow: bool) -> Self {
        self.allow_command_execution = allow;
        self
    }

    pub fn with_allow_delete(mut self, allow: bool) -> Self {
        self.allow_delete = allow;
        self
    }

    pub fn with_confirm_commands(mut self, confirm: bool) -> Self {
        self.confirm_commands = confirm;
        self
    }

    #[cfg(test)]
    pub fn with_max_file_size(mut self, size: u64) -> Self {
        self.max_file_size = size;
        self
    }

    #[cfg(test)]
    pub fn with_confirmer(mut self, confirmer: Confirmer) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn ensure_delete_allowed(&self) -> Result<()> {
        if !self.allow_delete {
            return Err(anyhow!("Deleting is disabled. Use --allow-delete to enable."));
        }
        Ok(())
    }

    /// Gate a shell command: execution must be enabled and the command
    /// must not hit the blocklist.
    pub fn check_command(&self, command: &str) -> Result<()> {
        if !self.allow_command_execution {
            return Err(anyhow!(
                "Command execution is disabled. Use --allow-command-execution to enable."
            ));
        }

        if !is_command_allowed(command) {
            return Err(anyhow!("Command blocked for security reasons: {}", command));
        }

        Ok(())
    }

    /// `check_command`, then ask the user when confirmation is on.
    ///
    /// The prompt runs on the blocking pool. Returns `Ok(false)` when the
    /// user declined.
    pub async fn authorize_command(&self, command: &str, cwd: &str) -> Result<bool> {
        self.check_command(command)?;

        if !self.confirm_commands {
            return Ok(true);
        }

        let confirmer = self.confirmer;
        let (command, cwd) = (command.to_string(), cwd.to_string());
        tokio::task::spawn_blocking(move || confirmer(&command, &cwd))
            .await
            .context("Confirmation prompt panicked")?
            .context("Failed to read confirmation")
    }
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::new()
    }
}

pub fn is_command_allowed(command: &str) -> bool {
    let lowered = command.to_lowercase();
    !BLOCKED_COMMANDS
        .iter()
        .any(|blocked| lowered.contains(blocked))
}

fn prompt_on_stdin(command: &str, cwd: &str) -> io::Result<bool> {
    eprintln!("\nThe agent wants to execute a command:\n");
    eprintln!("Command: {}", command);
    eprintln!("Working directory: {}\n", cwd);
    eprint!("Allow this command? [y/N] ");
    io::stderr().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}
