//! Serde types for the provider HTTP wire formats.
//!
//! Two families are covered: the tool-calling chat-completion schema
//! (OpenAI-compatible, non-streaming) and the plain streaming chat schema
//! (SSE `data:` fragments or bare NDJSON objects). Response types default
//! every field so partial or vendor-extended bodies still deserialize.

use serde::{Deserialize, Serialize};

/// One message in a conversation transcript, in chat-completion wire shape.
///
/// A tool-call message and its result are paired by `tool_call_id`; within
/// one transcript every assistant `tool_calls` entry is followed by exactly
/// one `tool` message carrying the matching id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain("system", content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain("user", content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain("assistant", content)
    }

    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    /// Assistant message carrying tool calls. `content` is omitted from the
    /// wire when the model produced none alongside the calls.
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.filter(|c| !c.is_empty()),
            tool_calls,
            tool_call_id: None,
        }
    }

    /// Tool-result message answering the call with the given correlation id.
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// Build the transcript messages for one executed tool round: the
/// assistant's tool-call message followed by one result message per call,
/// paired positionally by correlation id. `results[i]` answers `calls[i]`.
pub fn tool_exchange(
    content: Option<String>,
    calls: Vec<ToolCall>,
    results: Vec<String>,
) -> Vec<ChatMessage> {
    debug_assert_eq!(calls.len(), results.len());
    let ids: Vec<String> = calls.iter().map(|c| c.id.clone()).collect();
    let mut messages = Vec::with_capacity(results.len() + 1);
    messages.push(ChatMessage::assistant_tool_calls(content, calls));
    for (id, result) in ids.into_iter().zip(results) {
        messages.push(ChatMessage::tool_result(id, result));
    }
    messages
}

/// A model-issued request to invoke a tool, correlation id included.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    pub function: ToolCallFunction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallFunction {
    pub name: String,
    /// Raw JSON string, passed uninterpreted to the dispatcher.
    pub arguments: String,
}

/// Non-streaming tool-calling request body.
#[derive(Debug, Serialize)]
pub struct ToolCallPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    pub temperature: f32,
    pub stream: bool,
}

/// Plain streaming chat request body.
#[derive(Debug, Serialize)]
pub struct StreamPayload {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One SSE `data:` fragment from an OpenAI-style stream.
#[derive(Debug, Deserialize)]
pub struct StreamFragment {
    #[serde(default)]
    pub choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
pub struct StreamChoice {
    #[serde(default)]
    pub delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamDelta {
    #[serde(default)]
    pub content: String,
}

/// One bare NDJSON fragment from an Ollama-style stream.
#[derive(Debug, Deserialize)]
pub struct OllamaFragment {
    #[serde(default)]
    pub message: OllamaMessage,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct OllamaMessage {
    #[serde(default)]
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_message_omits_tool_fields() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn tool_result_carries_correlation_id() {
        let json = serde_json::to_value(ChatMessage::tool_result("call_7", "done")).unwrap();
        assert_eq!(json["role"], "tool");
        assert_eq!(json["tool_call_id"], "call_7");
        assert_eq!(json["content"], "done");
    }

    #[test]
    fn assistant_tool_calls_drops_empty_content() {
        let call = ToolCall {
            id: "call_1".into(),
            kind: "function".into(),
            function: ToolCallFunction {
                name: "run_command".into(),
                arguments: "{\"command\":\"ls\"}".into(),
            },
        };
        let json =
            serde_json::to_value(ChatMessage::assistant_tool_calls(Some(String::new()), vec![call]))
                .unwrap();
        assert!(json.get("content").is_none());
        assert_eq!(json["tool_calls"][0]["function"]["name"], "run_command");
    }

    #[test]
    fn tool_exchange_pairs_every_call_with_one_result() {
        let calls = vec![
            ToolCall {
                id: "call_1".into(),
                kind: "function".into(),
                function: ToolCallFunction { name: "run_command".into(), arguments: "{}".into() },
            },
            ToolCall {
                id: "call_2".into(),
                kind: "function".into(),
                function: ToolCallFunction { name: "list_tasks".into(), arguments: "{}".into() },
            },
        ];
        let messages = tool_exchange(
            Some("working on it".into()),
            calls,
            vec!["out1".into(), "out2".into()],
        );

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, "assistant");
        assert_eq!(messages[0].tool_calls.len(), 2);
        // Results follow in call order, paired by correlation id.
        assert_eq!(messages[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(messages[1].content.as_deref(), Some("out1"));
        assert_eq!(messages[2].tool_call_id.as_deref(), Some("call_2"));
        assert_eq!(messages[2].content.as_deref(), Some("out2"));
    }

    #[test]
    fn response_with_tool_calls_deserializes() {
        let body = r#"{
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_abc",
                        "type": "function",
                        "function": {"name": "run_command", "arguments": "{\"command\":\"pwd\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }"#;
        let resp: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(resp.choices.len(), 1);
        let calls = &resp.choices[0].message.tool_calls;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_abc");
        assert_eq!(calls[0].function.name, "run_command");
        assert_eq!(resp.usage.total_tokens, 15);
    }

    #[test]
    fn minimal_response_deserializes_with_defaults() {
        let resp: ChatResponse = serde_json::from_str("{}").unwrap();
        assert!(resp.choices.is_empty());
        assert_eq!(resp.usage.total_tokens, 0);
    }

    #[test]
    fn ollama_fragment_parses() {
        let frag: OllamaFragment =
            serde_json::from_str(r#"{"model":"m","message":{"role":"assistant","content":"hi"},"done":false}"#)
                .unwrap();
        assert_eq!(frag.message.content, "hi");
        assert!(!frag.done);
    }
}
