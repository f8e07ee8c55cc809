//! Chat-completion client with function calling.
//!
//! [`ChatModel`] is the narrow seam between the agent loop and the hosted
//! model: send the conversation plus the available tools, receive one
//! assistant message that either answers or requests tool calls.
//! [`OpenAiChat`] implements it against `POST {base_url}/chat/completions`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{LlmConfig, API_KEY_ENV};
use crate::http_client::{build_client, endpoint, post_json};
use crate::tools::ToolSpec;

/// One message of a chat-completions conversation, in wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default)]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        ChatMessage::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as produced by the model.
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_type(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A hosted chat model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Return the assistant's next message for `messages`.
    ///
    /// The result is always a [`ChatMessage::Assistant`].
    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage>;
}

/// OpenAI (or compatible) chat-completions client.
pub struct OpenAiChat {
    model: String,
    url: String,
    api_key: Option<String>,
    temperature: f32,
    max_retries: u32,
    client: reqwest::Client,
}

impl OpenAiChat {
    /// Create a client, reading the API key from `OPENAI_API_KEY`.
    pub fn new(config: &LlmConfig) -> Result<Self> {
        Self::with_api_key(config, std::env::var(API_KEY_ENV).ok())
    }

    pub fn with_api_key(config: &LlmConfig, api_key: Option<String>) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: endpoint(&config.base_url, "chat/completions"),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
            client: build_client(config.timeout_secs).context("failed to build chat HTTP client")?,
        })
    }

    fn request_body(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": messages,
        });
        if !tools.is_empty() {
            body["tools"] = tools
                .iter()
                .map(|t| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.parameters,
                        }
                    })
                })
                .collect();
            body["tool_choice"] = "auto".into();
        }
        body
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage], tools: &[ToolSpec]) -> Result<ChatMessage> {
        let body = self.request_body(messages, tools);
        let json = post_json(
            &self.client,
            &self.url,
            self.api_key.as_deref(),
            &body,
            self.max_retries,
            "OpenAI chat",
        )
        .await?;
        parse_chat_response(&json)
    }
}

/// Extract `choices[0].message` as an assistant message.
fn parse_chat_response(json: &serde_json::Value) -> Result<ChatMessage> {
    let message = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message"))?;

    let parsed: ChatMessage =
        serde_json::from_value(message.clone()).context("Invalid chat response message")?;
    match parsed {
        ChatMessage::Assistant { .. } => Ok(parsed),
        other => anyhow::bail!("Invalid chat response: expected assistant message, got {:?}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_tool_call_roundtrip_wire_format() {
        let msg = ChatMessage::Assistant {
            content: None,
            tool_calls: vec![ToolCall::new("call_1", "albums_info", r#"{"input":"Taylor"}"#)],
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["tool_calls"][0]["type"], "function");
        assert_eq!(json["tool_calls"][0]["function"]["name"], "albums_info");
    }

    #[test]
    fn test_tool_message_wire_format() {
        let msg = ChatMessage::Tool {
            tool_call_id: "call_1".to_string(),
            content: "Fearless (2008)".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            serde_json::json!({ "role": "tool", "tool_call_id": "call_1", "content": "Fearless (2008)" })
        );
    }

    #[test]
    fn test_parse_final_answer() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "Olá!", "refusal": null } }]
        });
        assert_eq!(parse_chat_response(&json).unwrap(), ChatMessage::assistant("Olá!"));
    }

    #[test]
    fn test_parse_tool_calls() {
        let json = serde_json::json!({
            "choices": [{ "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_9",
                    "type": "function",
                    "function": { "name": "songs_info", "arguments": "{\"input\":\"x\"}" }
                }]
            } }]
        });
        match parse_chat_response(&json).unwrap() {
            ChatMessage::Assistant { content, tool_calls } => {
                assert!(content.is_none());
                assert_eq!(tool_calls[0].function.name, "songs_info");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_missing_choices() {
        assert!(parse_chat_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn test_request_body_includes_tools() {
        let chat = OpenAiChat::with_api_key(&LlmConfig::default(), Some("k".into())).unwrap();
        let spec = ToolSpec {
            name: "albums_info".to_string(),
            description: "d".to_string(),
            parameters: serde_json::json!({ "type": "object" }),
        };
        let body = chat.request_body(&[ChatMessage::user("oi")], &[spec]);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["tools"][0]["function"]["name"], "albums_info");
        assert_eq!(body["messages"][0]["role"], "user");

        let bare = chat.request_body(&[ChatMessage::user("oi")], &[]);
        assert!(bare.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_default_chat_makes_a_single_attempt() {
        let server = crate::http_client::stub::serve(|_, _| (503, serde_json::json!({}))).await;
        let config = LlmConfig {
            base_url: server.url.clone(),
            ..LlmConfig::default()
        };
        let chat = OpenAiChat::with_api_key(&config, Some("k".into())).unwrap();

        let err = chat.complete(&[ChatMessage::user("oi")], &[]).await.unwrap_err();
        assert!(err.to_string().contains("503"), "{}", err);
        assert_eq!(server.hits(), 1);
    }

    #[tokio::test]
    async fn test_complete_round_trips_through_endpoint() {
        let server = crate::http_client::stub::serve(|_, _| {
            (
                200,
                serde_json::json!({
                    "choices": [{ "message": { "role": "assistant", "content": "Olá!" } }]
                }),
            )
        })
        .await;
        let config = LlmConfig {
            base_url: server.url.clone(),
            ..LlmConfig::default()
        };
        let chat = OpenAiChat::with_api_key(&config, Some("k".into())).unwrap();

        let reply = chat
            .complete(&[ChatMessage::system("p"), ChatMessage::user("oi")], &[])
            .await
            .unwrap();
        assert_eq!(reply, ChatMessage::assistant("Olá!"));

        let requests = server.requests.lock().unwrap();
        assert_eq!(requests[0]["messages"][1]["content"], "oi");
        assert_eq!(requests[0]["model"], "gpt-4o-mini");
    }
}
