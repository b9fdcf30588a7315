use crate::conversation::{Role, Turn};
use crate::logging::{log_debug, log_error, log_info, log_trace, log_warn};
use crate::provider::{GenerationOptions, ModelProvider};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
}

/// One line of the streamed `/api/chat` response
#[derive(Debug, Deserialize)]
struct OllamaStreamChunk {
    #[serde(default)]
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaTagsResponse {
    #[serde(default)]
    models: Vec<OllamaModelInfo>,
}

#[derive(Debug, Deserialize)]
struct OllamaModelInfo {
    name: String,
}

/// Splits a byte stream into complete lines; a line may span several chunks
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line).trim().to_string();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }

    /// Whatever is left once the stream has ended
    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!rest.is_empty()).then_some(rest)
    }
}

#[derive(Debug)]
pub struct OllamaClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(model: String, host: &str, request_timeout: Duration) -> Result<Self> {
        let base_url = host.trim_end_matches('/').to_string();

        log_info(&format!(
            "Initializing Ollama client with model: {} at {}",
            model, base_url
        ));

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url,
            model,
            client,
        })
    }

    /// Ollama has no tool role; results go back as user turns with a marker
    fn convert_turns(turns: &[Turn]) -> Vec<OllamaMessage> {
        turns
            .iter()
            .map(|turn| match turn.role {
                Role::System => OllamaMessage {
                    role: "system",
                    content: turn.content.clone(),
                },
                Role::User => OllamaMessage {
                    role: "user",
                    content: turn.content.clone(),
                },
                Role::Assistant => OllamaMessage {
                    role: "assistant",
                    content: turn.content.clone(),
                },
                Role::Tool => OllamaMessage {
                    role: "user",
                    content: format!(
                        "[Tool result from '{}']\n{}",
                        turn.tool_name.as_deref().unwrap_or("unknown"),
                        turn.content
                    ),
                },
            })
            .collect()
    }

    /// Apply one stream line; returns true once the model reports it is done
    fn handle_line(
        line: &str,
        full_text: &mut String,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<bool> {
        log_trace(&format!("Ollama stream line: {}", line));

        let chunk: OllamaStreamChunk = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse Ollama stream line: {}", line))?;

        if let Some(error) = chunk.error {
            log_error(&format!("Ollama reported an error: {}", error));
            return Err(anyhow::anyhow!("Ollama error: {}", error));
        }

        if let Some(message) = chunk.message
            && !message.content.is_empty()
        {
            on_chunk(&message.content);
            full_text.push_str(&message.content);
        }

        Ok(chunk.done)
    }

    async fn error_from_response(response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        log_error(&format!("Ollama API error: {} - {}", status, error_text));
        anyhow::anyhow!(
            "Ollama API request failed with status {}: {}",
            status,
            error_text
        )
    }
}

#[async_trait]
impl ModelProvider for OllamaClient {
    async fn stream_chat(
        &self,
        turns: &[Turn],
        options: &GenerationOptions,
        on_chunk: &mut (dyn for<'c> FnMut(&'c str) + Send),
    ) -> Result<String> {
        let endpoint = format!("{}/api/chat", self.base_url);

        let request_body = OllamaChatRequest {
            model: &self.model,
            messages: Self::convert_turns(turns),
            stream: true,
            options: OllamaOptions {
                temperature: options.temperature,
                top_p: options.top_p,
            },
        };

        log_debug(&format!(
            "Sending chat request to Ollama API with {} message(s)",
            request_body.messages.len()
        ));

        let response = self
            .client
            .post(&endpoint)
            .json(&request_body)
            .send()
            .await
            .with_context(|| format!("Failed to connect to Ollama at {}", self.base_url))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut full_text = String::new();
        let mut done = false;

        while let Some(bytes) = stream.next().await {
            let bytes = bytes.context("Failed to read Ollama response stream")?;
            for line in lines.push(&bytes) {
                done |= Self::handle_line(&line, &mut full_text, on_chunk)?;
            }
        }

        if let Some(line) = lines.finish() {
            done |= Self::handle_line(&line, &mut full_text, on_chunk)?;
        }

        if !done {
            log_warn("Ollama stream ended without a done marker");
        }

        log_info(&format!(
            "Received response from Ollama API, length: {}",
            full_text.len()
        ));

        Ok(full_text)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let endpoint = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&endpoint)
            .send()
            .await
            .with_context(|| format!("Failed to connect to Ollama at {}", self.base_url))?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let tags: OllamaTagsResponse = response
            .json()
            .await
            .context("Failed to parse Ollama model list")?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &'static str {
        "Ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OllamaClient {
        OllamaClient::new(
            "llama3.2".to_string(),
            &server.uri(),
            Duration::from_secs(10),
        )
        .unwrap()
    }

    fn ndjson(lines: &[&str]) -> String {
        lines.iter().map(|l| format!("{l}\n")).collect()
    }

    #[test]
    fn test_line_buffer_joins_split_lines() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"{\"done\":").is_empty());
        assert_eq!(buffer.push(b"false}\n{\"do"), vec!["{\"done\":false}"]);
        assert_eq!(buffer.push(b"ne\":true}"), Vec::<String>::new());
        assert_eq!(buffer.finish(), Some("{\"done\":true}".to_string()));
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_tool_turns_become_user_turns() {
        let messages = OllamaClient::convert_turns(&[
            Turn::system("persona"),
            Turn::tool("git_status", "Repository is clean (no changes)"),
        ]);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");
        assert_eq!(
            messages[1].content,
            "[Tool result from 'git_status']\nRepository is clean (no changes)"
        );
    }

    #[tokio::test]
    async fn test_stream_chat_collects_fragments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama3.2",
                "stream": true,
                "options": {"temperature": 0.5}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
                r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#,
                r#"{"message":{"role":"assistant","content":"lo"},"done":false}"#,
                r#"{"message":{"role":"assistant","content":""},"done":true}"#,
            ])))
            .mount(&server)
            .await;

        let mut seen = Vec::new();
        let options = GenerationOptions {
            temperature: 0.5,
            top_p: 0.9,
        };
        let text = client(&server)
            .stream_chat(&[Turn::user("hi")], &options, &mut |chunk: &str| {
                seen.push(chunk.to_string())
            })
            .await
            .unwrap();

        assert_eq!(text, "Hello");
        assert_eq!(seen, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_stream_error_field_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(ndjson(&[r#"{"error":"model is overloaded"}"#])),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .stream_chat(&[Turn::user("hi")], &GenerationOptions::default(), &mut |_: &str| {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model is overloaded"));
    }

    #[tokio::test]
    async fn test_http_error_status_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(404).set_body_string(r#"{"error":"model 'nope' not found"}"#),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .stream_chat(&[Turn::user("hi")], &GenerationOptions::default(), &mut |_: &str| {})
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("not found"));
    }

    #[tokio::test]
    async fn test_tool_result_sent_as_user_turn() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_string_contains("[Tool result from 'git_log']"))
            .respond_with(ResponseTemplate::new(200).set_body_string(ndjson(&[
                r#"{"message":{"content":"ok"},"done":true}"#,
            ])))
            .mount(&server)
            .await;

        let turns = [Turn::user("history?"), Turn::tool("git_log", "abc123 init")];
        let text = client(&server)
            .stream_chat(&turns, &GenerationOptions::default(), &mut |_: &str| {})
            .await
            .unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "models": [{"name": "llama3.2:latest"}, {"name": "mistral:7b"}]
            })))
            .mount(&server)
            .await;

        let models = client(&server).list_models().await.unwrap();
        assert_eq!(models, vec!["llama3.2:latest", "mistral:7b"]);
    }

    #[tokio::test]
    async fn test_unreachable_host_fails() {
        let client = OllamaClient::new(
            "llama3.2".to_string(),
            "http://127.0.0.1:9",
            Duration::from_secs(2),
        )
        .unwrap();
        let err = client.list_models().await.unwrap_err();
        assert!(err.to_string().contains("Failed to connect to Ollama"));
    }
}
