//! # artist-rag CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `artist-rag serve` | Load or build the indexes and start the HTTP server |
//! | `artist-rag build-corpus` | Flatten the JSON collections into the three corpus files |
//! | `artist-rag index` | Load or build the three indexes and report their size |
//! | `artist-rag ask "<question>"` | Answer one question on stdout |
//!
//! ## Examples
//!
//! ```bash
//! artist-rag build-corpus \
//!     --biographies data/complete_artists_biographies_translated.json \
//!     --albums data/complete_artists_albums.json \
//!     --songs data/complete_artists_songs.json
//!
//! artist-rag --config ./config/artist-rag.toml serve
//! artist-rag ask "Quais são os álbuns de Taylor Swift?"
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use artist_rag::config::{self, Config};
use artist_rag::corpus::{build_corpora, write_corpora, ArtistCollections};
use artist_rag::embedding::OpenAIProvider;
use artist_rag::logging;
use artist_rag::server::{run_server, AppState};
use artist_rag::service::{AnswerService, CorpusIndexes, RagService};

/// Retrieval-augmented chat over artist biographies, albums, and songs.
#[derive(Parser)]
#[command(name = "artist-rag", version)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional: built-in defaults are used when the file does not exist.
    #[arg(long, global = true, default_value = "./config/artist-rag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server.
    ///
    /// Indexes missing from storage are built first, which requires the
    /// corpus files and a valid OPENAI_API_KEY.
    Serve,

    /// Build the plain-text corpora from the JSON collections.
    BuildCorpus {
        /// Biographies collection (`[{"Name", "Biography": {"Content"}}]`).
        #[arg(long)]
        biographies: PathBuf,

        /// Albums collection (`[{"Name", "Albums": [{"title", "year"}]}]`).
        #[arg(long)]
        albums: PathBuf,

        /// Songs collection (`[{"Name", "Songs": [...]}]`).
        #[arg(long)]
        songs: PathBuf,

        /// Directory receiving biographies.txt, albums.txt, and songs.txt.
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Load or build the three indexes without serving.
    Index,

    /// Answer a single question and exit.
    Ask {
        /// The question.
        query: String,
    },
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::BuildCorpus {
        biographies,
        albums,
        songs,
        out_dir,
    } = &cli.command
    {
        let collections = ArtistCollections::load(biographies, albums, songs)?;
        let corpora = build_corpora(&collections);
        for path in write_corpora(&corpora, out_dir)? {
            println!("wrote {}", path.display());
        }
        println!("artists: {}", collections.biographies.len());
        return Ok(());
    }

    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Serve => {
            let service = RagService::from_config(&cfg)
                .await
                .context("failed to initialize answer service")?;
            run_server(&cfg.server.bind, AppState::new(Arc::new(service))).await?;
        }
        Commands::Index => {
            let embedder = OpenAIProvider::new(&cfg.embedding)?;
            let indexes = CorpusIndexes::load(&cfg, &embedder).await?;
            for (name, index) in [
                ("albums", &indexes.albums),
                ("songs", &indexes.songs),
                ("biographies", &indexes.biographies),
            ] {
                println!("{:<12} {:>6} chunks  ({})", name, index.len(), index.embedding_model);
            }
        }
        Commands::Ask { query } => {
            let service = RagService::from_config(&cfg)
                .await
                .context("failed to initialize answer service")?;
            let answer = service.generate_answer(&query).await?;
            println!("{}", answer);
        }
        Commands::BuildCorpus { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
