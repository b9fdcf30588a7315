use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tabwriter::TabWriter;

use crate::cli::{CliCommand, Config};
use crate::constants::{CHECK_MODELS_SHOWN, MODEL_REQUEST_TIMEOUT_SECS};
use crate::logging::{log_error, log_info, log_warn, setup_session_file_logging};
use crate::modes::{ModeCatalog, ModeSource};
use crate::orchestrator::{Orchestrator, TurnEvent};
use crate::output::{LISTING_WIDTH, StreamPrinter, wrap_text};
use crate::provider::{GenerationOptions, ModelProvider, ProviderConfig, ProviderFactory};
use crate::tools::{ToolDispatcher, ToolPolicy, ToolRegistry, builtin_registry};

pub async fn run_app(config: Config) -> Result<()> {
    // Listings work without a running Ollama server
    match &config.command {
        CliCommand::Modes => {
            let catalog = ModeCatalog::load().context("Failed to load modes")?;
            return write_modes(std::io::stdout(), &catalog);
        }
        CliCommand::Tools => {
            let registry = build_registry(&config)?;
            return write_tools(std::io::stdout(), &registry);
        }
        _ => {}
    }

    let provider_config = ProviderConfig {
        model: config.model.clone(),
        host: config.host.clone(),
        request_timeout: Duration::from_secs(MODEL_REQUEST_TIMEOUT_SECS),
    };
    let provider: Arc<dyn ModelProvider> = ProviderFactory::create_provider(provider_config)
        .context("Failed to initialize model provider")?
        .into();

    match &config.command {
        CliCommand::Check => handle_check(provider.as_ref(), &config.host).await,
        CliCommand::Query(message) => {
            let mut orchestrator = build_orchestrator(&config, provider)?;
            handle_query(&mut orchestrator, message).await
        }
        _ => {
            let mut orchestrator = build_orchestrator(&config, provider)?;
            handle_chat(&mut orchestrator, &config).await
        }
    }
}

/// Built-in operations minus `--no-tools` / `--tool-disable`
fn build_registry(config: &Config) -> Result<ToolRegistry> {
    if config.no_tools {
        log_info("Tool calling disabled");
        return Ok(ToolRegistry::new());
    }

    let mut registry = builtin_registry().context("Failed to register built-in tools")?;
    let unknown = registry.disable(&config.tool_disable);
    if !unknown.is_empty() {
        log_warn(&format!("Cannot disable unknown tools: {}", unknown.join(", ")));
        eprintln!("Warning: unknown tool(s) ignored: {}", unknown.join(", "));
    }
    Ok(registry)
}

fn build_orchestrator(config: &Config, provider: Arc<dyn ModelProvider>) -> Result<Orchestrator> {
    let registry = Arc::new(build_registry(config)?);
    let policy = ToolPolicy::new()
        .with_allow_command_execution(config.allow_command_execution)
        .with_allow_delete(config.allow_delete)
        .with_confirm_commands(config.confirm_commands);
    let dispatcher = ToolDispatcher::new(registry, policy)
        .with_time_limit(Duration::from_secs(config.tool_timeout))
        .with_max_result_chars(config.max_result_chars);

    let modes = ModeCatalog::load().context("Failed to load modes")?;
    let options = GenerationOptions {
        temperature: config.temperature,
        top_p: config.top_p,
    };

    let orchestrator = Orchestrator::new(provider, dispatcher, modes, &config.mode)?
        .with_options(options)
        .with_max_tool_turns(config.max_tool_turns);

    setup_session_file_logging(&orchestrator.transcript().id)
        .context("Failed to setup session file logging")?;

    Ok(orchestrator)
}

async fn handle_query(orchestrator: &mut Orchestrator, message: &str) -> Result<()> {
    let mut printer = StreamPrinter::stdio();
    let outcome = orchestrator
        .respond(message, &mut |event: TurnEvent<'_>| printer.handle(event))
        .await
        .context("Failed to get a response from the model")?;
    printer.finish(&outcome).context("Failed to write output")?;
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Directive {
    Help,
    Clear,
    Mode(String),
    Modes,
    Models,
    Tools,
    Exit,
    Unknown(String),
}

/// Interactive commands start with '/'; anything else is a question
fn parse_directive(line: &str) -> Option<Directive> {
    let line = line.trim();
    let rest = line.strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    Some(match name {
        "help" | "?" => Directive::Help,
        "clear" => Directive::Clear,
        "mode" if !arg.is_empty() => Directive::Mode(arg.to_string()),
        "mode" | "modes" => Directive::Modes,
        "models" => Directive::Models,
        "tools" => Directive::Tools,
        "exit" | "quit" => Directive::Exit,
        other => Directive::Unknown(other.to_string()),
    })
}

const CHAT_HELP: &str = "Commands:
  /help          Show this help
  /clear         Forget the conversation so far
  /mode <name>   Switch analysis mode
  /modes         List analysis modes
  /models        List models on the Ollama server
  /tools         List the tools the agent can call
  /exit          Leave the session";

async fn handle_chat(orchestrator: &mut Orchestrator, config: &Config) -> Result<()> {
    let interactive = atty::is(atty::Stream::Stdin);
    if interactive {
        println!(
            "secagent {} | model: {} | mode: {} | host: {}",
            env!("SECAGENT_VERSION"),
            orchestrator.provider().model_name(),
            orchestrator.mode(),
            config.host
        );
        println!("Type /help for commands, /exit to quit.\n");
    }

    let stdin = std::io::stdin();
    loop {
        if interactive {
            print!("You> ");
            std::io::stdout().flush().context("Failed to flush prompt")?;
        }

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("Failed to read from stdin")?;
        if read == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if let Some(directive) = parse_directive(input) {
            match directive {
                Directive::Exit => break,
                Directive::Help => println!("{}", CHAT_HELP),
                Directive::Clear => {
                    let dropped = orchestrator.transcript().history_len();
                    orchestrator.clear_history();
                    println!("Conversation history cleared ({} turns).", dropped);
                }
                Directive::Mode(name) => match orchestrator.set_mode(&name) {
                    Ok(()) => println!("Switched to mode '{}'.", name),
                    Err(e) => eprintln!("Error: {}", e),
                },
                Directive::Modes => write_modes(std::io::stdout(), orchestrator.modes())?,
                Directive::Models => {
                    if let Err(e) = print_models(orchestrator.provider()).await {
                        eprintln!("Error: {:#}", e);
                    }
                }
                Directive::Tools => println!("{}", orchestrator.tools_summary()),
                Directive::Unknown(name) => {
                    eprintln!("Unknown command: /{}. Type /help for commands.", name)
                }
            }
            continue;
        }

        if interactive {
            print!("\nAgent> ");
        }
        let mut printer = StreamPrinter::stdio();
        let result = orchestrator
            .respond(input, &mut |event: TurnEvent<'_>| printer.handle(event))
            .await;
        match result {
            Ok(outcome) => printer.finish(&outcome).context("Failed to write output")?,
            Err(e) => {
                log_error(&format!("Model turn failed: {:#}", e));
                eprintln!("\nError: {:#}", e);
            }
        }
        println!();
    }

    log_info("Chat session ended");
    Ok(())
}

async fn handle_check(provider: &dyn ModelProvider, host: &str) -> Result<()> {
    let models = provider
        .list_models()
        .await
        .with_context(|| format!("Cannot reach Ollama at {}", host))?;

    println!("Connected to Ollama at {}", host);
    write_model_list(&models);

    let wanted = provider.model_name();
    if !models.iter().any(|name| model_matches(name, wanted)) {
        println!(
            "\nWarning: model '{}' is not installed. Run: ollama pull {}",
            wanted, wanted
        );
    }
    Ok(())
}

async fn print_models(provider: &dyn ModelProvider) -> Result<()> {
    let models = provider.list_models().await?;
    write_model_list(&models);
    Ok(())
}

fn write_model_list(models: &[String]) {
    if models.is_empty() {
        println!("No models installed.");
        return;
    }
    println!("Available models ({}):", models.len());
    for name in models.iter().take(CHECK_MODELS_SHOWN) {
        println!("  - {}", name);
    }
    if models.len() > CHECK_MODELS_SHOWN {
        println!("  ... and {} more", models.len() - CHECK_MODELS_SHOWN);
    }
}

/// Ollama reports untagged models as `<name>:latest`
fn model_matches(installed: &str, wanted: &str) -> bool {
    installed == wanted
        || (!wanted.contains(':') && installed.strip_suffix(":latest") == Some(wanted))
}

fn write_modes<W: Write>(out: W, catalog: &ModeCatalog) -> Result<()> {
    let mut tw = TabWriter::new(out);

    writeln!(tw, "name\tsource\tdescription").context("Failed to write header")?;
    for mode in catalog.iter() {
        let source = match &mode.source {
            ModeSource::Builtin => "built-in".to_string(),
            ModeSource::File(path) => path.display().to_string(),
        };
        writeln!(tw, "{}\t{}\t{}", mode.name, source, mode.description)
            .context("Failed to write row")?;
    }

    tw.flush().context("Failed to flush table output")?;
    Ok(())
}

fn write_tools<W: Write>(mut out: W, registry: &ToolRegistry) -> Result<()> {
    if registry.is_empty() {
        writeln!(out, "No tools available").context("Failed to write output")?;
        return Ok(());
    }

    for schema in registry.schemas() {
        let description = wrap_text(&format!("    {}", schema.description), LISTING_WIDTH);
        writeln!(out, "{}\n{}\n", schema.signature(), description)
            .context("Failed to write output")?;
    }
    out.flush().context("Failed to flush output")?;
    Ok(())
}
