//! # artist-rag
//!
//! A retrieval-augmented chat backend over three artist corpora:
//! biographies, albums, and songs.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ JSON records │──▶│ Corpus build │──▶│  *.txt files │
//! └──────────────┘   └──────────────┘   └──────┬───────┘
//!                                              ▼
//!                    ┌──────────────┐   ┌──────────────┐
//!                    │ Chunk+Embed  │◀──│ load_or_     │
//!                    │ (first run)  │   │ create index │
//!                    └──────┬───────┘   └──────────────┘
//!                           ▼
//!   ┌──────────┐   ┌────────────────┐   ┌──────────────┐
//!   │  HTTP    │──▶│ Answer service │──▶│ Agent + 3    │
//!   │ /messages│   │                │   │ query tools  │
//!   └──────────┘   └────────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! artist-rag build-corpus --biographies bios.json --albums albums.json --songs songs.json
//! OPENAI_API_KEY=... artist-rag index      # build the three indexes once
//! OPENAI_API_KEY=... artist-rag serve      # POST /messages/ {"message": "..."}
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration with defaults |
//! | [`corpus`] | JSON collections → plain-text corpora |
//! | [`chunk`] | Overlapping window chunker |
//! | [`embedding`] | Embedding provider trait and OpenAI client |
//! | [`index`] | Persisted vector index, load-or-create |
//! | [`tools`] | Retrieval tools exposed to the agent |
//! | [`llm`] | Chat-completions client with function calling |
//! | [`agent`] | Tool-calling agent loop with memory |
//! | [`service`] | Answer service wiring indexes, tools, and agent |
//! | [`transcript`] | In-memory conversation log |
//! | [`server`] | HTTP facade |

pub mod agent;
pub mod chunk;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod http_client;
pub mod index;
pub mod llm;
pub mod logging;
pub mod models;
pub mod server;
pub mod service;
pub mod tools;
pub mod transcript;
