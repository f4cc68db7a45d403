//! One-turn client over a configured LLM backend.
//!
//! [`ProviderClient`] performs a single turn against the backend and hands
//! the result back uninterpreted: tool calls are returned for the caller to
//! execute, streamed fragments are concatenated into one string. Transport
//! failures and retryable HTTP statuses (429, 5xx) are retried with bounded
//! exponential backoff before surfacing as a [`ProviderError`].

use std::time::Duration;

use futures::StreamExt;
use reqwest::header::{HeaderName, HeaderValue, CONTENT_TYPE};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::tools::ToolDescriptor;

use super::wire::{
    ChatMessage, ChatResponse, OllamaFragment, StreamFragment, StreamPayload, ToolCall,
    ToolCallPayload,
};

/// Retry budget for transport failures and retryable statuses.
const RETRY_MAX: u32 = 3;
const RETRY_WAIT_MIN: Duration = Duration::from_secs(1);
const RETRY_WAIT_MAX: Duration = Duration::from_secs(10);

/// Coarse bound on a single hung request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Normalized result of one tool-calling turn.
#[derive(Debug)]
pub struct TurnOutput {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub total_tokens: u64,
}

/// One LLM turn against a configured backend.
pub struct ProviderClient {
    config: ProviderConfig,
    http: reqwest::Client,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::RequestBuild(e.to_string()))?;
        Ok(Self { config, http })
    }

    pub fn supports_tools(&self) -> bool {
        self.config.supports_tools
    }

    pub fn model_name(&self) -> &str {
        &self.config.model_name
    }

    /// Perform one non-streaming tool-calling turn.
    ///
    /// Zero or more tool calls come back unexecuted; an empty `tool_calls`
    /// means the text is the model's final answer for this turn.
    pub async fn chat_turn(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<TurnOutput, ProviderError> {
        let payload = ToolCallPayload {
            model: self.config.model_name.clone(),
            messages: messages.to_vec(),
            tools: if tools.is_empty() {
                None
            } else {
                Some(tools.iter().map(tool_schema).collect())
            },
            tool_choice: if tools.is_empty() {
                None
            } else {
                Some("auto".to_string())
            },
            temperature: 0.0,
            stream: false,
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| ProviderError::RequestBuild(e.to_string()))?;

        let response = self.post_with_retry(&body).await?;
        let text = response.text().await?;
        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let choice = parsed.choices.into_iter().next().ok_or(ProviderError::NoChoices)?;
        Ok(TurnOutput {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: choice.message.tool_calls,
            total_tokens: parsed.usage.total_tokens,
        })
    }

    /// Perform one plain-chat streaming turn.
    ///
    /// The body is read line by line; each line is an independently-parseable
    /// JSON fragment, either SSE-framed (`data: {...}`, ended by
    /// `data: [DONE]`) or a bare NDJSON object with a `done` flag. Fragments
    /// concatenate into a running buffer and `on_delta` is invoked with the
    /// accumulated text after each line. Unparsable lines are skipped.
    pub async fn chat_stream(
        &self,
        messages: &[ChatMessage],
        on_delta: Option<&(dyn Fn(&str) + Send + Sync)>,
    ) -> Result<String, ProviderError> {
        let payload = StreamPayload {
            model: self.config.model_name.clone(),
            messages: messages.to_vec(),
            stream: true,
        };
        let body = serde_json::to_value(&payload)
            .map_err(|e| ProviderError::RequestBuild(e.to_string()))?;

        let response = self.post_with_retry(&body).await?;

        let mut accumulated = String::new();
        let mut pending = Vec::new();
        let mut stream = response.bytes_stream();
        'outer: while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            pending.extend_from_slice(&chunk);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match apply_stream_line(line.trim(), &mut accumulated) {
                    LineOutcome::Done => break 'outer,
                    LineOutcome::Appended => {
                        if let Some(cb) = on_delta {
                            cb(&accumulated);
                        }
                    }
                    LineOutcome::Skipped => {}
                }
            }
        }

        Ok(accumulated)
    }

    /// POST the body, retrying transport errors and retryable statuses with
    /// exponential backoff. Non-2xx after the budget is exhausted surfaces as
    /// [`ProviderError::Api`] carrying status and raw body.
    async fn post_with_retry(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut wait = RETRY_WAIT_MIN;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self.build_request(body)?.send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }
                    let retryable = status.is_server_error() || status.as_u16() == 429;
                    if !retryable || attempt > RETRY_MAX {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ProviderError::Api {
                            status: status.as_u16(),
                            body,
                        });
                    }
                    tracing::warn!(status = status.as_u16(), attempt, "Retrying API request");
                }
                Err(e) => {
                    if attempt > RETRY_MAX {
                        return Err(ProviderError::Transport(e));
                    }
                    tracing::warn!(error = %e, attempt, "Retrying API request after transport error");
                }
            }
            tokio::time::sleep(wait).await;
            wait = (wait * 2).min(RETRY_WAIT_MAX);
        }
    }

    fn build_request(
        &self,
        body: &serde_json::Value,
    ) -> Result<reqwest::RequestBuilder, ProviderError> {
        let mut request = self
            .http
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(body);

        if !self.config.api_key.is_empty() {
            let (name, value) = auth_header(&self.config);
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ProviderError::RequestBuild(format!("bad auth header name: {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ProviderError::RequestBuild(format!("bad auth header value: {e}")))?;
            request = request.header(name, value);
        }

        Ok(request)
    }
}

/// Resolve the auth header for a backend. `Authorization` (case-insensitive,
/// and the default when no header is configured) carries a Bearer token; any
/// other configured header carries the raw key.
fn auth_header(config: &ProviderConfig) -> (String, String) {
    match &config.auth_header {
        Some(name) if !name.eq_ignore_ascii_case("authorization") => {
            (name.clone(), config.api_key.clone())
        }
        Some(name) => (name.clone(), format!("Bearer {}", config.api_key)),
        None => ("Authorization".to_string(), format!("Bearer {}", config.api_key)),
    }
}

/// Wrap a descriptor in the `{"type":"function","function":{...}}` wire shape.
fn tool_schema(descriptor: &ToolDescriptor) -> serde_json::Value {
    serde_json::json!({
        "type": "function",
        "function": descriptor,
    })
}

enum LineOutcome {
    Appended,
    Skipped,
    Done,
}

/// Interpret one line of a streaming response body.
fn apply_stream_line(line: &str, accumulated: &mut String) -> LineOutcome {
    if line.is_empty() {
        return LineOutcome::Skipped;
    }
    if line == "data: [DONE]" {
        return LineOutcome::Done;
    }
    if let Some(payload) = line.strip_prefix("data:") {
        let payload = payload.trim();
        if payload.is_empty() {
            return LineOutcome::Skipped;
        }
        return match serde_json::from_str::<StreamFragment>(payload) {
            Ok(fragment) => match fragment.choices.first() {
                Some(choice) => {
                    accumulated.push_str(&choice.delta.content);
                    LineOutcome::Appended
                }
                None => LineOutcome::Skipped,
            },
            Err(_) => LineOutcome::Skipped,
        };
    }
    match serde_json::from_str::<OllamaFragment>(line) {
        Ok(fragment) => {
            accumulated.push_str(&fragment.message.content);
            if fragment.done {
                LineOutcome::Done
            } else {
                LineOutcome::Appended
            }
        }
        Err(_) => LineOutcome::Skipped,
    }
}
