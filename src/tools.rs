//! Query tools the agent can call.
//!
//! A [`Tool`] has a stable name, a natural-language description used by the
//! model for tool selection, and an OpenAI function-calling parameter
//! schema. [`RetrievalTool`] binds one [`VectorIndex`] to such a name; the
//! [`ToolRegistry`] holds the tools handed to the agent.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              ToolRegistry                │
//! │  ┌────────────┐ ┌──────────┐ ┌─────────┐ │
//! │  │albums_info │ │songs_info│ │bio_info │ │
//! │  └─────┬──────┘ └────┬─────┘ └────┬────┘ │
//! └────────┼─────────────┼────────────┼──────┘
//!          ▼             ▼            ▼
//!     VectorIndex   VectorIndex  VectorIndex
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::index::VectorIndex;

/// Returned to the model when a retrieval finds nothing.
pub const NO_RESULTS: &str = "Nenhum resultado encontrado.";

/// A tool the agent can discover and call.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores (e.g. `"albums_info"`).
    fn name(&self) -> &str;

    /// One-line description the model uses to decide whether to call the tool.
    fn description(&self) -> &str;

    /// OpenAI function-calling JSON Schema for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. The output is fed back to the model verbatim.
    async fn execute(&self, params: Value) -> Result<String>;
}

/// Tool metadata advertised to the chat model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Retrieval over one corpus index.
pub struct RetrievalTool {
    name: String,
    description: String,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl RetrievalTool {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
        top_k: usize,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            index,
            embedder,
            top_k,
        }
    }
}

#[async_trait]
impl Tool for RetrievalTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "input": { "type": "string", "description": "Pergunta ou termos de busca" }
            },
            "required": ["input"]
        })
    }

    async fn execute(&self, params: Value) -> Result<String> {
        let input = params["input"].as_str().unwrap_or("");
        if input.trim().is_empty() {
            anyhow::bail!("input must not be empty");
        }

        let results = self
            .index
            .query(self.embedder.as_ref(), input, self.top_k)
            .await?;
        tracing::debug!(tool = %self.name, hits = results.len(), "retrieval");

        if results.is_empty() {
            return Ok(NO_RESULTS.to_string());
        }
        Ok(results
            .iter()
            .map(|r| r.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"))
    }
}

/// Ordered set of tools available to the agent.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: Vec::new() }
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Metadata for every registered tool, in registration order.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
