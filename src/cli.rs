use crate::constants::{
    get_default_host, get_default_mode, get_default_model, get_max_result_chars,
    get_max_tool_turns, get_otlp_endpoint, get_tool_timeout_secs,
};
use anyhow::{Result, anyhow};
use clap::{Arg, ArgMatches, Command, value_parser};
use clap_complete::{generate, shells};
use clap_complete_nushell::Nushell;

#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Answer one question and exit
    Query(String),
    /// Interactive session
    Chat,
    /// Verify the Ollama host and list models
    Check,
    Modes,
    Tools,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub command: CliCommand,
    pub model: String,
    pub host: String,
    pub mode: String,
    pub temperature: f32,
    pub top_p: f32,
    // Tool calling options
    pub no_tools: bool,                // true = no operations offered to the model
    pub tool_disable: Vec<String>,     // list of operations to disable
    pub max_tool_turns: usize,         // consecutive tool calls per user turn
    pub tool_timeout: u64,             // per-operation bound in seconds
    pub max_result_chars: usize,       // tool result text budget
    pub allow_command_execution: bool, // true = allow execute_command
    pub allow_delete: bool,            // true = allow delete_file / delete_directory
    pub confirm_commands: bool,        // true = ask before each command
    pub otlp_endpoint: Option<String>, // export spans here when set
}

impl Config {
    pub fn from_args() -> Result<Self> {
        let matches = Self::build_cli().get_matches();

        // Handle completions generation immediately
        if let Some(shell) = matches.get_one::<String>("completions") {
            Self::handle_completions(shell);
            std::process::exit(0);
        }

        Self::from_matches(&matches)
    }

    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let command = match matches.subcommand() {
            Some(("query", sub)) => {
                let parts: Vec<String> = sub
                    .get_many::<String>("message")
                    .unwrap_or_default()
                    .cloned()
                    .collect();
                let message = parts.join(" ");
                if message.trim().is_empty() {
                    return Err(anyhow!("query needs a non-empty message"));
                }
                CliCommand::Query(message)
            }
            Some(("check", _)) => CliCommand::Check,
            Some(("modes", _)) => CliCommand::Modes,
            Some(("tools", _)) => CliCommand::Tools,
            _ => CliCommand::Chat,
        };

        Ok(Self {
            command,
            model: string_arg(matches, "model"),
            host: string_arg(matches, "host"),
            mode: string_arg(matches, "mode"),
            temperature: matches.get_one::<f32>("temperature").copied().unwrap_or(0.7),
            top_p: matches.get_one::<f32>("top-p").copied().unwrap_or(0.9),
            no_tools: matches.get_flag("no-tools"),
            tool_disable: matches
                .get_many::<String>("tool-disable")
                .unwrap_or_default()
                .cloned()
                .collect(),
            max_tool_turns: matches
                .get_one::<usize>("max-tool-turns")
                .copied()
                .unwrap_or_else(get_max_tool_turns),
            tool_timeout: matches
                .get_one::<u64>("tool-timeout")
                .copied()
                .unwrap_or_else(get_tool_timeout_secs),
            max_result_chars: matches
                .get_one::<usize>("max-result-chars")
                .copied()
                .unwrap_or_else(get_max_result_chars),
            allow_command_execution: matches.get_flag("allow-command-execution"),
            allow_delete: matches.get_flag("allow-delete"),
            confirm_commands: matches.get_flag("confirm-commands"),
            otlp_endpoint: matches
                .get_one::<String>("otlp-endpoint")
                .cloned()
                .or_else(get_otlp_endpoint),
        })
    }

    fn build_cli() -> Command {
        Command::new("secagent")
            .version(env!("SECAGENT_VERSION"))
            .about("Cybersecurity assistant for local Ollama models with tool calling")
            .subcommand(
                Command::new("query")
                    .about("Ask a single question and print the answer")
                    .arg(
                        Arg::new("message")
                            .help("Question for the agent")
                            .num_args(1..)
                            .required(true),
                    ),
            )
            .subcommand(Command::new("chat").about("Start an interactive session (default)"))
            .subcommand(
                Command::new("check").about("Check the connection to Ollama and list models"),
            )
            .subcommand(Command::new("modes").about("List available analysis modes"))
            .subcommand(Command::new("tools").about("List the tools the agent can call"))
            .next_help_heading("Model Options")
            .arg(
                Arg::new("model")
                    .short('m')
                    .long("model")
                    .help("Ollama model to use. Can be set via SECAGENT_MODEL environment variable.")
                    .value_name("MODEL")
                    .default_value(get_default_model())
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("host")
                    .long("host")
                    .help("Ollama server URL. Can be set via SECAGENT_HOST environment variable.")
                    .value_name("URL")
                    .default_value(get_default_host())
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("mode")
                    .long("mode")
                    .help("Analysis mode (system prompt). Built-in or ~/.secagent/modes/<name>.md")
                    .value_name("MODE")
                    .default_value(get_default_mode())
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("temperature")
                    .long("temperature")
                    .help("Sampling temperature")
                    .value_name("TEMP")
                    .default_value("0.7")
                    .value_parser(value_parser!(f32))
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("top-p")
                    .long("top-p")
                    .help("Nucleus sampling threshold")
                    .value_name("P")
                    .default_value("0.9")
                    .value_parser(value_parser!(f32))
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .next_help_heading("Tool Options")
            .arg(
                Arg::new("no-tools")
                    .long("no-tools")
                    .help("Do not offer any tools to the model")
                    .global(true)
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("tool-disable")
                    .long("tool-disable")
                    .help("Disable specific tools (comma-separated, e.g. write_file,git_diff)")
                    .value_name("TOOLS")
                    .value_delimiter(',')
                    .global(true)
                    .action(clap::ArgAction::Append),
            )
            .arg(
                Arg::new("max-tool-turns")
                    .long("max-tool-turns")
                    .help("Maximum consecutive tool calls per question (env: SECAGENT_MAX_TOOL_TURNS, default: 5)")
                    .value_name("N")
                    .value_parser(value_parser!(usize))
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("tool-timeout")
                    .long("tool-timeout")
                    .help("Time limit for a single tool call in seconds (env: SECAGENT_TOOL_TIMEOUT, default: 60)")
                    .value_name("SECS")
                    .value_parser(value_parser!(u64).range(1..))
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("max-result-chars")
                    .long("max-result-chars")
                    .help("Truncate tool results to this many characters (env: SECAGENT_MAX_RESULT_CHARS, default: 8000)")
                    .value_name("CHARS")
                    .value_parser(value_parser!(usize))
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("allow-command-execution")
                    .long("allow-command-execution")
                    .help("Allow the execute_command tool to run shell commands. DANGEROUS: Use with caution!")
                    .global(true)
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("allow-delete")
                    .long("allow-delete")
                    .help("Allow the delete_file and delete_directory tools")
                    .global(true)
                    .action(clap::ArgAction::SetTrue),
            )
            .arg(
                Arg::new("confirm-commands")
                    .long("confirm-commands")
                    .help("Require user confirmation before executing each command (recommended with --allow-command-execution)")
                    .global(true)
                    .action(clap::ArgAction::SetTrue),
            )
            .next_help_heading("Other Options")
            .arg(
                Arg::new("otlp-endpoint")
                    .long("otlp-endpoint")
                    .help("Export traces to this OTLP collector, e.g. http://localhost:4317 (env: SECAGENT_OTLP_ENDPOINT)")
                    .value_name("URL")
                    .global(true)
                    .action(clap::ArgAction::Set),
            )
            .arg(
                Arg::new("completions")
                    .long("completions")
                    .help("Generate shell completion script")
                    .value_name("SHELL")
                    .value_parser(["bash", "zsh", "fish", "powershell", "nushell"])
                    .action(clap::ArgAction::Set),
            )
    }

    fn handle_completions(shell: &str) {
        let mut cmd = Self::build_cli();
        let bin_name = "secagent";

        match shell {
            "bash" => generate(shells::Bash, &mut cmd, bin_name, &mut std::io::stdout()),
            "zsh" => generate(shells::Zsh, &mut cmd, bin_name, &mut std::io::stdout()),
            "fish" => generate(shells::Fish, &mut cmd, bin_name, &mut std::io::stdout()),
            "powershell" => generate(
                shells::PowerShell,
                &mut cmd,
                bin_name,
                &mut std::io::stdout(),
            ),
            "nushell" => generate(Nushell, &mut cmd, bin_name, &mut std::io::stdout()),
            _ => eprintln!("Unsupported shell: {}", shell),
        }
    }
}

fn string_arg(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}
