//! Answer service: the single entry point the HTTP layer and CLI call.
//!
//! [`RagService`] is built once at startup. Construction loads (or builds)
//! the three corpus indexes, wraps each as a [`RetrievalTool`], and binds
//! them to an [`Agent`] with the fixed instruction prompt below.
//!
//! Every failure past construction is reported as one
//! [`AnswerError::Generation`] carrying the underlying message. Queries are
//! passed through as given; a blank one is left to the model, whose prompt
//! asks for a rephrase.

use async_trait::async_trait;
use std::sync::Arc;

use crate::agent::Agent;
use crate::config::Config;
use crate::embedding::{EmbeddingProvider, OpenAIProvider};
use crate::index::{load_or_create_corpus, VectorIndex};
use crate::llm::{ChatModel, OpenAiChat};
use crate::tools::{RetrievalTool, ToolRegistry};

pub const ALBUMS_TOOL: &str = "albums_info";
pub const SONGS_TOOL: &str = "songs_info";
pub const BIOGRAPHIES_TOOL: &str = "biographies_info";

const ALBUMS_DESCRIPTION: &str = "Fornece informações sobre os álbuns do artista.";
const SONGS_DESCRIPTION: &str = "Fornece informações sobre as músicas do artista.";
const BIOGRAPHIES_DESCRIPTION: &str =
    "Fornece informações pessoais e sobre a carreira do artista.";

/// Instructions given to the agent on every turn.
pub const SYSTEM_PROMPT: &str = "\
Você é um assistente que responde perguntas sobre artistas musicais, seus álbuns e suas músicas.
Use as ferramentas disponíveis para obter as informações necessárias antes de responder.

Instruções:
- Usando apenas as informações fornecidas pelas ferramentas, responda à pergunta do usuário.
- Sempre responda de maneira clara, gentil e solícita.
- Se você não entender completamente a pergunta, peça ao usuário que reformule.
- Se as informações obtidas não forem úteis, diga que você não tem informações suficientes para responder.
- Se a palavra \"quais\" for mencionada, liste todas as ocorrências de maneira organizada \
(exemplo: \"Quais são os álbuns de Taylor Swift?\" deve listar todos os álbuns com nomes e datas).
- Se a pergunta envolver listar músicas ou álbuns, forneça a lista completa.
- Para artistas conhecidos por mais de um nome, use as informações da biografia para reconhecer todos os nomes.
- Apenas use as informações obtidas, não utilize nenhuma informação que não esteja lá.
Importante: Não mencione que está usando informações recuperadas, apenas forneça a resposta educadamente.";

#[derive(Debug, thiserror::Error)]
pub enum AnswerError {
    #[error("answer generation failed: {0}")]
    Generation(String),
}

/// Anything that can answer a user question.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn generate_answer(&self, query: &str) -> Result<String, AnswerError>;
}

/// The three loaded corpus indexes.
pub struct CorpusIndexes {
    pub albums: Arc<VectorIndex>,
    pub songs: Arc<VectorIndex>,
    pub biographies: Arc<VectorIndex>,
}

impl CorpusIndexes {
    /// Load or build every configured index, in albums, songs, biographies order.
    pub async fn load(config: &Config, embedder: &dyn EmbeddingProvider) -> anyhow::Result<Self> {
        let c = &config.corpora;
        Ok(Self {
            albums: Arc::new(load_or_create_corpus("albums", &c.albums, embedder).await?),
            songs: Arc::new(load_or_create_corpus("songs", &c.songs, embedder).await?),
            biographies: Arc::new(
                load_or_create_corpus("biographies", &c.biographies, embedder).await?,
            ),
        })
    }
}

/// Retrieval-augmented answer service backed by a tool-calling agent.
pub struct RagService {
    agent: Agent,
}

impl RagService {
    /// Build the service with the OpenAI providers named in `config`.
    ///
    /// Reads `OPENAI_API_KEY` once; a missing key surfaces on the first
    /// provider call, which for a fresh deployment is the first index build.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::new(OpenAIProvider::new(&config.embedding)?);
        let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::new(&config.llm)?);
        Self::with_providers(config, embedder, model).await
    }

    pub async fn with_providers(
        config: &Config,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn ChatModel>,
    ) -> anyhow::Result<Self> {
        let indexes = CorpusIndexes::load(config, embedder.as_ref()).await?;
        Ok(Self::from_indexes(config, indexes, embedder, model))
    }

    pub fn from_indexes(
        config: &Config,
        indexes: CorpusIndexes,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn ChatModel>,
    ) -> Self {
        let top_k = config.agent.similarity_top_k;
        let mut tools = ToolRegistry::new();
        for (name, description, index) in [
            (ALBUMS_TOOL, ALBUMS_DESCRIPTION, indexes.albums),
            (SONGS_TOOL, SONGS_DESCRIPTION, indexes.songs),
            (BIOGRAPHIES_TOOL, BIOGRAPHIES_DESCRIPTION, indexes.biographies),
        ] {
            tools.register(Box::new(RetrievalTool::new(
                name,
                description,
                index,
                embedder.clone(),
                top_k,
            )));
        }

        tracing::info!(
            model = model.model_name(),
            tools = tools.len(),
            "answer service ready"
        );

        Self {
            agent: Agent::new(
                model,
                tools,
                SYSTEM_PROMPT,
                config.agent.max_tool_rounds,
                config.agent.memory_messages,
            ),
        }
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }
}

#[async_trait]
impl AnswerService for RagService {
    async fn generate_answer(&self, query: &str) -> Result<String, AnswerError> {
        self.agent
            .chat(query)
            .await
            .map_err(|e| AnswerError::Generation(format!("{:#}", e)))
    }
}
