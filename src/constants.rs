/// Default model constants
pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_HOST: &str = "http://localhost:11434";

/// Get default model from environment variable or default
pub fn get_default_model() -> String {
    std::env::var("SECAGENT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string())
}

/// Get Ollama host from environment variable or default
pub fn get_default_host() -> String {
    std::env::var("SECAGENT_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string())
}

/// Get starting mode from environment variable or default
pub fn get_default_mode() -> String {
    std::env::var("SECAGENT_MODE").unwrap_or_else(|_| crate::modes::DEFAULT_MODE.to_string())
}

/// OTLP collector for trace export; unset means no export
pub fn get_otlp_endpoint() -> Option<String> {
    std::env::var("SECAGENT_OTLP_ENDPOINT")
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Tool loop constants
pub const DEFAULT_MAX_TOOL_TURNS: usize = crate::orchestrator::DEFAULT_MAX_TOOL_TURNS;
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RESULT_CHARS: usize = 8000;

/// Model requests may stream for a long time on slow hardware
pub const MODEL_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Number of models shown by `check`
pub const CHECK_MODELS_SHOWN: usize = 10;

fn env_number<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Get tool turn cap from environment variable or default
pub fn get_max_tool_turns() -> usize {
    env_number("SECAGENT_MAX_TOOL_TURNS", DEFAULT_MAX_TOOL_TURNS)
}

/// Get per-operation timeout in seconds from environment variable or default
pub fn get_tool_timeout_secs() -> u64 {
    env_number("SECAGENT_TOOL_TIMEOUT", DEFAULT_TOOL_TIMEOUT_SECS)
}

/// Get tool result character cap from environment variable or default
pub fn get_max_result_chars() -> usize {
    env_number("SECAGENT_MAX_RESULT_CHARS", DEFAULT_MAX_RESULT_CHARS)
}
