use std::fmt::Write;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::instrument;

use crate::conversation::{Transcript, Turn};
use crate::error::ToolError;
use crate::logging::{log_debug, log_info, log_warn};
use crate::modes::ModeCatalog;
use crate::prompt::compose_system_prompt;
use crate::provider::{GenerationOptions, ModelProvider};
use crate::tools::{ToolCall, ToolDispatcher, ToolResult, extract};

pub const DEFAULT_MAX_TOOL_TURNS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingUserInput,
    GeneratingModelTurn,
    InspectingForCall,
    ExecutingTool,
    TurnComplete,
}

/// Progress notifications for the caller's display
#[derive(Debug)]
pub enum TurnEvent<'a> {
    /// Streamed fragment of the model turn being generated
    Chunk(&'a str),
    ToolStarted(&'a ToolCall),
    ToolFinished(&'a ToolResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    /// Text of the last model turn
    pub text: String,
    /// Tool calls executed while answering
    pub tool_turns: usize,
    /// Set when the loop stopped on the consecutive tool-call cap
    pub cap_exceeded: Option<ToolError>,
}

impl TurnOutcome {
    pub fn notice(&self) -> Option<String> {
        self.cap_exceeded.as_ref().map(|err| err.to_string())
    }
}

/// Drives the user turn → model turn → tool turn cycle.
///
/// Owns the transcript. Control flow is decided only on complete model
/// turns; streamed fragments are passed through for display.
pub struct Orchestrator {
    provider: Arc<dyn ModelProvider>,
    dispatcher: ToolDispatcher,
    modes: ModeCatalog,
    mode: String,
    transcript: Transcript,
    options: GenerationOptions,
    max_tool_turns: usize,
    state: LoopState,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        dispatcher: ToolDispatcher,
        modes: ModeCatalog,
        mode: &str,
    ) -> Result<Self> {
        let persona = modes
            .get(mode)
            .ok_or_else(|| unknown_mode(mode, &modes))?
            .prompt
            .clone();
        let registry = dispatcher.registry();
        let transcript = Transcript::new(compose_system_prompt(&persona, Some(registry)));

        log_info(&format!(
            "Session {} started with {} model '{}', mode '{}', {} tool(s)",
            transcript.id,
            provider.provider_name(),
            provider.model_name(),
            mode,
            registry.len()
        ));

        Ok(Self {
            provider,
            dispatcher,
            modes,
            mode: mode.to_string(),
            transcript,
            options: GenerationOptions::default(),
            max_tool_turns: DEFAULT_MAX_TOOL_TURNS,
            state: LoopState::AwaitingUserInput,
        })
    }

    /// Sampling settings for every model turn (builder pattern)
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Consecutive tool calls allowed per user turn (builder pattern)
    pub fn with_max_tool_turns(mut self, max_tool_turns: usize) -> Self {
        self.max_tool_turns = max_tool_turns;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn mode(&self) -> &str {
        &self.mode
    }

    pub fn modes(&self) -> &ModeCatalog {
        &self.modes
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn provider(&self) -> &dyn ModelProvider {
        self.provider.as_ref()
    }

    fn tools_enabled(&self) -> bool {
        !self.dispatcher.registry().is_empty()
    }

    fn transition(&mut self, next: LoopState) {
        log_debug(&format!("Loop state {:?} -> {:?}", self.state, next));
        self.state = next;
    }

    /// Answer one user turn, running tool calls until the model stops
    /// asking for them or the cap is hit.
    ///
    /// Only a failure to reach the model is returned as an error; tool
    /// failures are fed back to the model as tool turns.
    #[instrument(name = "respond", skip_all, fields(mode = self.mode()))]
    pub async fn respond(
        &mut self,
        user_text: &str,
        sink: &mut (dyn FnMut(TurnEvent<'_>) + Send),
    ) -> Result<TurnOutcome> {
        self.transcript.append(Turn::user(user_text));
        let mut tool_turns = 0;

        loop {
            self.transition(LoopState::GeneratingModelTurn);

            let generated = {
                let mut forward = |chunk: &str| sink(TurnEvent::Chunk(chunk));
                self.provider
                    .stream_chat(self.transcript.turns(), &self.options, &mut forward)
                    .await
            };

            let text = match generated {
                Ok(text) => text,
                Err(e) => {
                    self.transition(LoopState::AwaitingUserInput);
                    return Err(e);
                }
            };

            self.transition(LoopState::InspectingForCall);
            let call = if self.tools_enabled() {
                extract(&text)
            } else {
                None
            };
            self.transcript.append(Turn::assistant(text.as_str()));

            let Some(call) = call else {
                self.transition(LoopState::TurnComplete);
                self.transition(LoopState::AwaitingUserInput);
                return Ok(TurnOutcome {
                    text,
                    tool_turns,
                    cap_exceeded: None,
                });
            };

            if tool_turns >= self.max_tool_turns {
                log_warn(&format!(
                    "Tool loop cap of {} reached, not executing {}",
                    self.max_tool_turns, call.operation
                ));
                self.transition(LoopState::TurnComplete);
                self.transition(LoopState::AwaitingUserInput);
                return Ok(TurnOutcome {
                    text,
                    tool_turns,
                    cap_exceeded: Some(ToolError::ToolLoopCapExceeded(self.max_tool_turns)),
                });
            }

            self.transition(LoopState::ExecutingTool);
            sink(TurnEvent::ToolStarted(&call));
            let result = self.dispatcher.execute_call(&call).await;
            sink(TurnEvent::ToolFinished(&result));

            self.transcript
                .append(Turn::tool(&result.operation, result.transcript_text()));
            tool_turns += 1;
        }
    }

    /// Switch persona; earlier turns are kept
    pub fn set_mode(&mut self, name: &str) -> Result<()> {
        let persona = self
            .modes
            .get(name)
            .ok_or_else(|| unknown_mode(name, &self.modes))?
            .prompt
            .clone();

        let system = compose_system_prompt(&persona, Some(self.dispatcher.registry()));
        self.transcript.replace_system(system);
        self.mode = name.to_string();
        log_info(&format!("Switched to mode '{}'", name));
        Ok(())
    }

    pub fn clear_history(&mut self) {
        self.transcript.clear_history();
        log_info("Conversation history cleared");
    }

    /// Human-readable list of the operations the model can call
    pub fn tools_summary(&self) -> String {
        if !self.tools_enabled() {
            return "No tools available".to_string();
        }

        let mut summary = String::from("Available Tools:\n");
        for (i, schema) in self.dispatcher.registry().schemas().enumerate() {
            let _ = writeln!(summary, "{}. {} - {}", i + 1, schema.name, schema.description);
        }
        summary
    }
}

fn unknown_mode(name: &str, modes: &ModeCatalog) -> anyhow::Error {
    anyhow!(
        "Unknown mode: {}. Available modes: {}",
        name,
        modes.names().join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Role;
    use crate::tools::{
        Operation, OperationSchema, ToolPolicy, ToolRegistry, ValidatedArgs, builtin_registry,
    };
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// Replays canned model turns and records every transcript it was sent
    #[derive(Debug, Default)]
    struct ScriptedProvider {
        replies: Mutex<VecDeque<Option<String>>>,
        requests: Mutex<Vec<Vec<Turn>>>,
    }

    impl ScriptedProvider {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().map(|r| Some(r.to_string())).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(VecDeque::from([None])),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<Vec<Turn>> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelProvider for ScriptedProvider {
        async fn stream_chat(
            &self,
            turns: &[Turn],
            _options: &GenerationOptions,
            on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
        ) -> Result<String> {
            self.requests.lock().unwrap().push(turns.to_vec());
            let reply = self.replies.lock().unwrap().pop_front();
            match reply {
                Some(Some(text)) => {
                    for piece in text.split_inclusive(' ') {
                        on_chunk(piece);
                    }
                    Ok(text)
                }
                Some(None) => Err(anyhow!("Failed to connect to Ollama at http://localhost:11434")),
                None => Err(anyhow!("script exhausted")),
            }
        }

        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec!["scripted".to_string()])
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "Scripted"
        }
    }

    struct Sleeper;

    #[async_trait]
    impl Operation for Sleeper {
        fn schema(&self) -> OperationSchema {
            OperationSchema::new("slow_scan", "Takes far too long")
        }

        async fn execute(&self, _args: &ValidatedArgs, _policy: &ToolPolicy) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok("done".to_string())
        }
    }

    fn orchestrator(provider: Arc<ScriptedProvider>, registry: ToolRegistry) -> Orchestrator {
        let dispatcher = ToolDispatcher::new(Arc::new(registry), ToolPolicy::new());
        Orchestrator::new(provider, dispatcher, ModeCatalog::builtin(), "default").unwrap()
    }

    fn describe(event: &TurnEvent<'_>) -> Option<String> {
        match event {
            TurnEvent::Chunk(_) => None,
            TurnEvent::ToolStarted(call) => Some(format!("start {}", call.operation)),
            TurnEvent::ToolFinished(result) => Some(format!(
                "finish {} {}",
                result.operation,
                if result.is_success() { "ok" } else { "failed" }
            )),
        }
    }

    #[tokio::test]
    async fn test_plain_answer_without_tools() {
        let provider = ScriptedProvider::new(&["SQL injection is an input validation flaw."]);
        let mut orchestrator = orchestrator(provider.clone(), builtin_registry().unwrap());

        let mut chunks = String::new();
        let outcome = orchestrator
            .respond("What is SQL injection?", &mut |event: TurnEvent<'_>| {
                if let TurnEvent::Chunk(chunk) = event {
                    chunks.push_str(chunk);
                }
            })
            .await
            .unwrap();

        assert_eq!(outcome.text, "SQL injection is an input validation flaw.");
        assert_eq!(chunks, outcome.text);
        assert_eq!(outcome.tool_turns, 0);
        assert!(outcome.cap_exceeded.is_none());
        assert_eq!(orchestrator.state(), LoopState::AwaitingUserInput);

        let turns = orchestrator.transcript().turns();
        assert_eq!(turns.len(), 3);
        assert_eq!(turns[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn test_scenario_file_search_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("README.md"), "# readme").unwrap();
        let call = format!(
            r#"I'll search for markdown files. {{"tool": "find_files", "parameters": {{"pattern": "*.md", "dirpath": "{}"}}}}"#,
            dir.path().display()
        );

        let provider = ScriptedProvider::new(&[&call, "The directory contains README.md."]);
        let mut orchestrator = orchestrator(provider.clone(), builtin_registry().unwrap());

        let mut events = Vec::new();
        let outcome = orchestrator
            .respond("List the markdown files", &mut |event: TurnEvent<'_>| {
                events.extend(describe(&event))
            })
            .await
            .unwrap();

        assert_eq!(outcome.text, "The directory contains README.md.");
        assert_eq!(outcome.tool_turns, 1);
        assert_eq!(events, vec!["start find_files", "finish find_files ok"]);

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);
        let tool_turn = requests[1].last().unwrap();
        assert_eq!(tool_turn.role, Role::Tool);
        assert_eq!(tool_turn.tool_name.as_deref(), Some("find_files"));
        assert!(tool_turn.content.contains("README.md"));
    }

    #[tokio::test]
    async fn test_scenario_unknown_operation_fed_back() {
        let provider = ScriptedProvider::new(&[
            r#"{"tool": "format_disk", "parameters": {}}"#,
            "That tool does not exist, sorry.",
        ]);
        let mut orchestrator = orchestrator(provider.clone(), builtin_registry().unwrap());

        let outcome = orchestrator
            .respond("Wipe the disk", &mut |_: TurnEvent<'_>| {})
            .await
            .unwrap();

        assert_eq!(outcome.text, "That tool does not exist, sorry.");
        let requests = provider.requests();
        let tool_turn = requests[1].last().unwrap();
        assert_eq!(tool_turn.role, Role::Tool);
        assert_eq!(tool_turn.content, "Error: Unknown tool 'format_disk'");
    }

    #[tokio::test]
    async fn test_scenario_slow_operation_abandoned() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Sleeper)).unwrap();
        let dispatcher = ToolDispatcher::new(Arc::new(registry), ToolPolicy::new())
            .with_time_limit(Duration::from_millis(50));

        let provider = ScriptedProvider::new(&[
            r#"{"tool": "slow_scan", "parameters": {}}"#,
            "The scan timed out.",
        ]);
        let mut orchestrator = Orchestrator::new(
            provider.clone(),
            dispatcher,
            ModeCatalog::builtin(),
            "default",
        )
        .unwrap();

        let mut events = Vec::new();
        let started = Instant::now();
        let outcome = orchestrator
            .respond("Scan everything", &mut |event: TurnEvent<'_>| {
                events.extend(describe(&event))
            })
            .await
            .unwrap();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.text, "The scan timed out.");
        assert_eq!(events, vec!["start slow_scan", "finish slow_scan failed"]);
        let requests = provider.requests();
        assert!(requests[1].last().unwrap().content.contains("timed out"));
    }

    #[tokio::test]
    async fn test_scenario_repeated_failing_call_hits_cap() {
        let failing = r#"{"tool": "get_file_contents", "parameters": {"filepath": "/no/such/file"}}"#;
        let provider = ScriptedProvider::new(&[failing; 5]);
        let mut orchestrator =
            orchestrator(provider.clone(), builtin_registry().unwrap()).with_max_tool_turns(3);

        let mut events = Vec::new();
        let outcome = orchestrator
            .respond("Read it", &mut |event: TurnEvent<'_>| {
                events.extend(describe(&event))
            })
            .await
            .unwrap();

        assert_eq!(outcome.tool_turns, 3);
        assert_eq!(outcome.text, failing);
        assert_eq!(outcome.cap_exceeded, Some(ToolError::ToolLoopCapExceeded(3)));
        assert!(outcome.notice().unwrap().contains("3 consecutive tool calls"));
        assert_eq!(provider.requests().len(), 4);
        assert_eq!(
            events.iter().filter(|e| e.starts_with("start")).count(),
            3
        );
        assert_eq!(orchestrator.state(), LoopState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn test_model_failure_is_returned() {
        let mut orchestrator = orchestrator(ScriptedProvider::failing(), builtin_registry().unwrap());

        let err = orchestrator
            .respond("hello", &mut |_: TurnEvent<'_>| {})
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Failed to connect"));
        assert_eq!(orchestrator.state(), LoopState::AwaitingUserInput);
    }

    #[tokio::test]
    async fn test_calls_ignored_when_no_tools() {
        let reply = r#"{"tool": "list_directory", "parameters": {}}"#;
        let provider = ScriptedProvider::new(&[reply]);
        let mut orchestrator = orchestrator(provider.clone(), ToolRegistry::new());

        let outcome = orchestrator
            .respond("ls", &mut |_: TurnEvent<'_>| {})
            .await
            .unwrap();

        assert_eq!(outcome.text, reply);
        assert_eq!(outcome.tool_turns, 0);
        assert_eq!(orchestrator.tools_summary(), "No tools available");
        assert!(!orchestrator.transcript().system_prompt().contains("Available Tools"));
    }

    #[tokio::test]
    async fn test_set_mode_replaces_system_turn_only() {
        let provider = ScriptedProvider::new(&["Hi."]);
        let mut orchestrator = orchestrator(provider, builtin_registry().unwrap());
        orchestrator
            .respond("hello", &mut |_: TurnEvent<'_>| {})
            .await
            .unwrap();

        orchestrator.set_mode("malware").unwrap();

        assert_eq!(orchestrator.mode(), "malware");
        let transcript = orchestrator.transcript();
        assert!(
            transcript
                .system_prompt()
                .starts_with("You are a malware analysis expert")
        );
        assert!(transcript.system_prompt().contains("Available Tools:"));
        assert_eq!(transcript.history_len(), 2);

        let err = orchestrator.set_mode("astrology").unwrap_err();
        assert!(err.to_string().contains("Unknown mode: astrology"));
        assert_eq!(orchestrator.mode(), "malware");
    }

    #[tokio::test]
    async fn test_clear_history_keeps_persona() {
        let provider = ScriptedProvider::new(&["Hi."]);
        let mut orchestrator = orchestrator(provider, builtin_registry().unwrap());
        orchestrator
            .respond("hello", &mut |_: TurnEvent<'_>| {})
            .await
            .unwrap();

        orchestrator.clear_history();

        assert_eq!(orchestrator.transcript().history_len(), 0);
        assert!(
            orchestrator
                .transcript()
                .system_prompt()
                .starts_with("You are an expert cybersecurity agent")
        );
    }

    #[test]
    fn test_unknown_startup_mode_rejected() {
        let dispatcher =
            ToolDispatcher::new(Arc::new(builtin_registry().unwrap()), ToolPolicy::new());
        let result = Orchestrator::new(
            ScriptedProvider::new(&[]),
            dispatcher,
            ModeCatalog::builtin(),
            "astrology",
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_tools_summary_lists_operations() {
        let orchestrator = orchestrator(ScriptedProvider::new(&[]), builtin_registry().unwrap());
        let summary = orchestrator.tools_summary();
        assert!(summary.starts_with("Available Tools:\n1. "));
        assert!(summary.contains("grep_search - Search for text in files"));
        assert_eq!(summary.lines().count(), 18);
    }
}
