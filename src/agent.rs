//! Conversational tool-calling agent.
//!
//! The agent owns a system prompt, a [`ToolRegistry`], and a [`ChatModel`].
//! Each [`Agent::chat`] call runs a bounded loop:
//!
//! ```text
//! system + memory + user ──▶ model ──▶ tool calls? ──yes──▶ run tools ─┐
//!                              ▲                                       │
//!                              └───────────── tool outputs ◀───────────┘
//!                                             │ no
//!                                             ▼
//!                                        final answer
//! ```
//!
//! Tool failures do not abort the turn: the error text is handed back to
//! the model as the tool output so it can recover or explain. Exceeding
//! `max_tool_rounds` does abort it.
//!
//! Completed exchanges are kept in a bounded memory so follow-up questions
//! ("e os álbuns dela?") resolve against earlier turns.

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::{Arc, Mutex};

use crate::llm::{ChatMessage, ChatModel, ToolCall};
use crate::tools::ToolRegistry;

pub struct Agent {
    model: Arc<dyn ChatModel>,
    tools: ToolRegistry,
    system_prompt: String,
    max_tool_rounds: usize,
    memory_limit: usize,
    memory: Mutex<Vec<ChatMessage>>,
}

impl Agent {
    pub fn new(
        model: Arc<dyn ChatModel>,
        tools: ToolRegistry,
        system_prompt: impl Into<String>,
        max_tool_rounds: usize,
        memory_limit: usize,
    ) -> Self {
        if tools.is_empty() {
            tracing::warn!("agent created without tools; answers will not use retrieval");
        }
        Self {
            model,
            tools,
            system_prompt: system_prompt.into(),
            max_tool_rounds,
            memory_limit,
            memory: Mutex::new(Vec::new()),
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer `query`, calling tools as the model requests.
    pub async fn chat(&self, query: &str) -> Result<String> {
        let mut messages = vec![ChatMessage::system(self.system_prompt.clone())];
        messages.extend(self.memory_snapshot());
        messages.push(ChatMessage::user(query));

        let specs = self.tools.specs();

        for round in 0..=self.max_tool_rounds {
            let reply = self.model.complete(&messages, &specs).await?;
            let (content, tool_calls) = match reply {
                ChatMessage::Assistant {
                    content,
                    tool_calls,
                } => (content, tool_calls),
                other => bail!("model returned a non-assistant message: {:?}", other),
            };

            if tool_calls.is_empty() {
                let answer = content.unwrap_or_default();
                self.remember(query, &answer);
                return Ok(answer);
            }

            if round == self.max_tool_rounds {
                bail!(
                    "agent exceeded {} tool rounds without a final answer",
                    self.max_tool_rounds
                );
            }

            messages.push(ChatMessage::Assistant {
                content,
                tool_calls: tool_calls.clone(),
            });
            for call in &tool_calls {
                let output = self.run_tool(call).await;
                messages.push(ChatMessage::Tool {
                    tool_call_id: call.id.clone(),
                    content: output,
                });
            }
        }

        // The loop returns or bails on its last round
        bail!("agent loop ended without an answer")
    }

    async fn run_tool(&self, call: &ToolCall) -> String {
        let name = call.function.name.as_str();
        let Some(tool) = self.tools.find(name) else {
            tracing::warn!(tool = name, "model requested an unknown tool");
            return format!("Error: unknown tool '{}'", name);
        };

        let params: Value = if call.function.arguments.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(&call.function.arguments) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(tool = name, error = %e, "invalid tool arguments");
                    return format!("Error: invalid arguments for '{}': {}", name, e);
                }
            }
        };

        tracing::info!(tool = name, params = %params, "calling tool");
        match tool.execute(params).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool failed");
                format!("Error: {}", e)
            }
        }
    }

    fn memory_snapshot(&self) -> Vec<ChatMessage> {
        self.memory
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn remember(&self, query: &str, answer: &str) {
        if self.memory_limit == 0 {
            return;
        }
        let mut memory = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        memory.push(ChatMessage::user(query));
        memory.push(ChatMessage::assistant(answer));
        if memory.len() > self.memory_limit {
            // Drop whole user/assistant pairs so memory never opens on a reply
            let excess = (memory.len() - self.memory_limit).div_ceil(2) * 2;
            memory.drain(..excess);
        }
    }
}
