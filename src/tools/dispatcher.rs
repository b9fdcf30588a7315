use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::instrument;

use crate::error::ToolError;
use crate::logging::{log_debug, log_error, log_info, log_warn};

use super::policy::ToolPolicy;
use super::registry::ToolRegistry;
use super::validator::{ToolCall, ValidatedArgs, validate};

/// Outcome of one operation call
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub operation: String,
    pub outcome: Result<String, ToolError>,
    /// Wall time spent, for logs only
    pub elapsed: Duration,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// Text the model gets to see in the tool turn
    pub fn transcript_text(&self) -> String {
        match &self.outcome {
            Ok(text) => text.clone(),
            Err(err) => format!("Error: {err}"),
        }
    }
}

/// Maps validated calls onto registered operations.
///
/// Failures never escape: every path ends in a `ToolResult`.
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    policy: ToolPolicy,
    time_limit: Duration,
    max_result_chars: usize,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, policy: ToolPolicy) -> Self {
        Self {
            registry,
            policy,
            time_limit: Duration::from_secs(60),
            max_result_chars: 8000,
        }
    }

    /// Hard bound on any single operation (builder pattern)
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = limit;
        self
    }

    /// Character budget for result text (builder pattern)
    pub fn with_max_result_chars(mut self, chars: usize) -> Self {
        self.max_result_chars = chars;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Lookup, validate and run a call parsed out of a model turn
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let started = Instant::now();

        let validated = self
            .registry
            .lookup(&call.operation)
            .and_then(|schema| validate(call, schema));

        match validated {
            Ok(args) => self.dispatch(&call.operation, &args).await,
            Err(err) => {
                log_warn(&format!("Rejected call to {}: {}", call.operation, err));
                ToolResult {
                    operation: call.operation.clone(),
                    outcome: Err(err),
                    elapsed: started.elapsed(),
                }
            }
        }
    }

    /// Run an operation with already validated arguments
    #[instrument(name = "dispatch", skip(self, args))]
    pub async fn dispatch(&self, name: &str, args: &ValidatedArgs) -> ToolResult {
        let started = Instant::now();
        log_info(&format!("Executing tool: {name}"));
        log_debug(&format!("Tool arguments: {args:?}"));

        let outcome = match self.registry.operation(name) {
            Ok(operation) => {
                let limit = operation
                    .time_limit(args)
                    .map_or(self.time_limit, |own| own.min(self.time_limit));

                let failure = |e: anyhow::Error| ToolError::OperationFailure {
                    operation: name.to_string(),
                    message: format!("{e:#}"),
                };

                // The clock starts only once the call is allowed to run
                match operation.authorize(args, &self.policy).await {
                    Err(e) => Err(failure(e)),
                    Ok(()) => {
                        match tokio::time::timeout(limit, operation.execute(args, &self.policy))
                            .await
                        {
                            Ok(Ok(output)) => Ok(truncate(output, self.max_result_chars)),
                            Ok(Err(e)) => Err(failure(e)),
                            Err(_) => Err(ToolError::Timeout {
                                operation: name.to_string(),
                                limit,
                            }),
                        }
                    }
                }
            }
            Err(err) => Err(err),
        };

        let elapsed = started.elapsed();
        match &outcome {
            Ok(output) => log_info(&format!(
                "Tool {} succeeded in {}ms, output length: {}",
                name,
                elapsed.as_millis(),
                output.len()
            )),
            Err(err) => log_error(&format!(
                "Tool {} failed in {}ms: {}",
                name,
                elapsed.as_millis(),
                err
            )),
        }

        ToolResult {
            operation: name.to_string(),
            outcome,
            elapsed,
        }
    }
}

/// Cut `text` to `max_chars` characters, noting how much was dropped
fn truncate(text: String, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text;
    }

    let cut = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(idx, _)| idx);

    format!(
        "{}\n\n[... truncated {} characters ...]",
        &text[..cut],
        total - max_chars
    )
}
