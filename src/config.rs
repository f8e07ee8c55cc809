//! TOML configuration.
//!
//! Every section is optional: a missing file or a missing key falls back to
//! the defaults below, which reproduce the stock deployment (three corpora
//! under `./storage`, OpenAI `gpt-4o-mini` for chat and
//! `text-embedding-ada-002` for embeddings).
//!
//! The API key is deliberately not part of the file. It is read from the
//! `OPENAI_API_KEY` environment variable when the services are constructed.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the model-provider API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub corpora: CorporaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            base_url: default_base_url(),
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
    /// Chat calls are not retried unless this is raised.
    #[serde(default)]
    pub max_retries: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
            max_retries: 0,
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    #[serde(default = "default_memory_messages")]
    pub memory_messages: usize,
    #[serde(default = "default_similarity_top_k")]
    pub similarity_top_k: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            memory_messages: default_memory_messages(),
            similarity_top_k: default_similarity_top_k(),
        }
    }
}

fn default_max_tool_rounds() -> usize {
    5
}
fn default_memory_messages() -> usize {
    20
}
fn default_similarity_top_k() -> usize {
    5
}

/// Storage and chunking settings for one corpus.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CorpusConfig {
    /// Directory holding the persisted index.
    pub storage: PathBuf,
    /// Plain-text file indexed when `storage` holds no index yet.
    pub source: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl CorpusConfig {
    fn new(name: &str, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            storage: PathBuf::from(format!("./storage/{}", name)),
            source: PathBuf::from(format!("./{}.txt", name)),
            chunk_size,
            chunk_overlap,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorporaConfig {
    #[serde(default = "default_albums")]
    pub albums: CorpusConfig,
    #[serde(default = "default_songs")]
    pub songs: CorpusConfig,
    #[serde(default = "default_biographies")]
    pub biographies: CorpusConfig,
}

impl Default for CorporaConfig {
    fn default() -> Self {
        Self {
            albums: default_albums(),
            songs: default_songs(),
            biographies: default_biographies(),
        }
    }
}

fn default_albums() -> CorpusConfig {
    CorpusConfig::new("albums", 256, 30)
}
fn default_songs() -> CorpusConfig {
    CorpusConfig::new("songs", 256, 30)
}
fn default_biographies() -> CorpusConfig {
    CorpusConfig::new("biographies", 512, 50)
}

impl CorporaConfig {
    /// The three corpora with their stable names, in tool order.
    pub fn named(&self) -> [(&'static str, &CorpusConfig); 3] {
        [
            ("albums", &self.albums),
            ("songs", &self.songs),
            ("biographies", &self.biographies),
        ]
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    for (name, corpus) in config.corpora.named() {
        if corpus.chunk_size == 0 {
            anyhow::bail!("corpora.{}.chunk_size must be > 0", name);
        }
        if corpus.chunk_overlap >= corpus.chunk_size {
            anyhow::bail!(
                "corpora.{}.chunk_overlap must be smaller than chunk_size ({} >= {})",
                name,
                corpus.chunk_overlap,
                corpus.chunk_size
            );
        }
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }
    if config.agent.similarity_top_k == 0 {
        anyhow::bail!("agent.similarity_top_k must be > 0");
    }
    if config.agent.max_tool_rounds == 0 {
        anyhow::bail!("agent.max_tool_rounds must be > 0");
    }

    Ok(())
}
