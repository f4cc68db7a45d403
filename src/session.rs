//! The top-level conversation loop.
//!
//! [`ChatSession`] owns the message history for one interactive session.
//! Tool-capable backends run an iterative tool-calling loop offering every
//! registered tool; plain-chat backends get a single streaming turn. Either
//! way the user query and final answer are appended to the history, so
//! follow-up queries carry the full conversation.

use crate::error::SessionError;
use crate::provider::{wire, ChatMessage, ProviderClient};
use crate::tools::ToolRegistry;

/// Hard cap on LLM round-trips per query.
const MAX_TOOL_ITERATIONS: usize = 10;

pub struct ChatSession {
    client: ProviderClient,
    registry: ToolRegistry,
    messages: Vec<ChatMessage>,
    /// History length right after construction; `clear` truncates back here.
    initial_len: usize,
}

impl ChatSession {
    /// Build a session with the configured system prompt, augmented with
    /// environment context (OS, shell, working directory).
    pub fn new(client: ProviderClient, registry: ToolRegistry, system_prompt: &str) -> Self {
        let mut messages = Vec::new();
        if !system_prompt.is_empty() {
            let prompt = format!("{system_prompt}{}", environment_suffix());
            messages.push(ChatMessage::system(&prompt));
        }
        let initial_len = messages.len();
        Self {
            client,
            registry,
            messages,
            initial_len,
        }
    }

    /// Run one user query to completion and return the final answer.
    ///
    /// `on_delta` receives the accumulated partial text during streaming
    /// turns; it is not invoked on the tool-calling path, where output
    /// arrives whole.
    pub async fn query(
        &mut self,
        text: &str,
        on_delta: Option<&(dyn Fn(&str) + Send + Sync)>,
    ) -> Result<String, SessionError> {
        self.messages.push(ChatMessage::user(text));

        let answer = if self.client.supports_tools() {
            self.query_with_tools().await
        } else {
            self.client
                .chat_stream(&self.messages, on_delta)
                .await
                .map_err(SessionError::from)
        };

        match answer {
            Ok(answer) => {
                self.messages.push(ChatMessage::assistant(&answer));
                Ok(answer)
            }
            Err(e) => {
                // Keep history consistent: a failed query leaves no dangling
                // user message.
                self.messages.pop();
                Err(e)
            }
        }
    }

    async fn query_with_tools(&self) -> Result<String, SessionError> {
        let descriptors = self.registry.descriptors();
        let mut transcript: Vec<ChatMessage> = Vec::new();

        for _ in 0..MAX_TOOL_ITERATIONS {
            let mut messages = self.messages.clone();
            messages.extend(transcript.iter().cloned());

            let turn = self.client.chat_turn(&messages, &descriptors).await?;

            if turn.tool_calls.is_empty() {
                return Ok(turn.text);
            }

            let mut results = Vec::with_capacity(turn.tool_calls.len());
            for call in &turn.tool_calls {
                tracing::debug!(tool = %call.function.name, "Executing tool call");
                let result = match self
                    .registry
                    .execute(&call.function.name, &call.function.arguments)
                    .await
                {
                    Ok(result) => result,
                    Err(e) => format!("Error: {e}"),
                };
                results.push(result);
            }
            transcript.extend(wire::tool_exchange(Some(turn.text), turn.tool_calls, results));
        }

        Err(SessionError::MaxToolIterations)
    }

    /// Drop the conversation, keeping only the system prompt.
    pub fn clear(&mut self) {
        self.messages.truncate(self.initial_len);
    }

    pub fn model_name(&self) -> &str {
        self.client.model_name()
    }
}

/// Environment lines appended to the system prompt at construction.
fn environment_suffix() -> String {
    let shell = std::env::var("SHELL").unwrap_or_default();
    let shell_name = shell.rsplit('/').next().unwrap_or("").to_string();
    let cwd = std::env::current_dir()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    format!(
        "\n\nEnvironment: {} {}\nShell: {}\nWorking Directory: {}",
        std::env::consts::OS,
        std::env::consts::ARCH,
        shell_name,
        cwd
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_suffix_names_os_and_cwd() {
        let suffix = environment_suffix();
        assert!(suffix.contains("Environment: "));
        assert!(suffix.contains(std::env::consts::OS));
        assert!(suffix.contains("Working Directory: "));
    }
}
