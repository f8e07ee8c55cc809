//! Persisted vector indexes, one per corpus.
//!
//! [`load_or_create`] is the only way to obtain a [`VectorIndex`]: it loads
//! `<storage>/index.json` when present, otherwise it chunks and embeds the
//! source file, persists the result, and returns it.
//!
//! # Invariants
//!
//! - The check-build-persist sequence runs under an exclusive advisory lock
//!   on `<storage>.lock`, so concurrent first runs build once.
//! - The index file is written to a temporary name and renamed into place:
//!   readers never see a partially written index.
//! - A loaded index is returned unchanged; nothing is rebuilt incrementally.
//! - Filesystem reads and writes run on the blocking pool, like the lock.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::chunk::chunk_text;
use crate::config::CorpusConfig;
use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::models::{Chunk, ScoredChunk};

const INDEX_FILE: &str = "index.json";
const FORMAT_VERSION: u32 = 1;

/// A chunk together with its embedding vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Brute-force cosine index over the chunks of one corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    pub format_version: u32,
    pub name: String,
    pub source: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub embedding_model: String,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rank entries against an already-embedded query, best first.
    pub fn search(&self, query_vec: &[f32], top_k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(query_vec, &e.vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(top_k);
        scored
    }

    /// Embed `text` and return the `top_k` closest chunks.
    pub async fn query(
        &self,
        embedder: &dyn EmbeddingProvider,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(embedder, text).await?;
        Ok(self.search(&query_vec, top_k))
    }
}

/// [`load_or_create`] for a configured corpus.
pub async fn load_or_create_corpus(
    name: &str,
    corpus: &CorpusConfig,
    embedder: &dyn EmbeddingProvider,
) -> Result<VectorIndex> {
    load_or_create(
        name,
        &corpus.storage,
        &corpus.source,
        corpus.chunk_size,
        corpus.chunk_overlap,
        embedder,
    )
    .await
}

/// Load the index persisted at `storage`, or build it from `source`.
pub async fn load_or_create(
    name: &str,
    storage: &Path,
    source: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
    embedder: &dyn EmbeddingProvider,
) -> Result<VectorIndex> {
    let _lock = acquire_lock(storage).await?;

    let index_path = storage.join(INDEX_FILE);
    let existing = {
        let path = index_path.clone();
        blocking(move || {
            if path.exists() {
                load_index(&path).map(Some)
            } else {
                Ok(None)
            }
        })
        .await?
    };
    if let Some(index) = existing {
        if index.embedding_model != embedder.model_name() {
            tracing::warn!(
                index = name,
                stored = %index.embedding_model,
                configured = %embedder.model_name(),
                "index was built with a different embedding model"
            );
        }
        tracing::info!(index = name, chunks = index.len(), path = %index_path.display(), "loaded index");
        return Ok(index);
    }

    tracing::info!(index = name, source = %source.display(), "building index");
    let index = build_index(name, source, chunk_size, chunk_overlap, embedder).await?;
    let index = {
        let storage = storage.to_path_buf();
        blocking(move || persist_index(&index, &storage).map(|_| index)).await?
    };
    tracing::info!(index = name, chunks = index.len(), path = %index_path.display(), "persisted index");

    Ok(index)
}

async fn build_index(
    name: &str,
    source: &Path,
    chunk_size: usize,
    chunk_overlap: usize,
    embedder: &dyn EmbeddingProvider,
) -> Result<VectorIndex> {
    let chunks = {
        let source = source.to_path_buf();
        blocking(move || {
            let text = std::fs::read_to_string(&source)
                .with_context(|| format!("Failed to read corpus source: {}", source.display()))?;
            Ok(chunk_text(&text, chunk_size, chunk_overlap))
        })
        .await?
    };
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = if texts.is_empty() {
        Vec::new()
    } else {
        embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Failed to embed corpus '{}'", name))?
    };

    if vectors.len() != chunks.len() {
        bail!(
            "Embedding provider returned {} vectors for {} chunks",
            vectors.len(),
            chunks.len()
        );
    }

    Ok(VectorIndex {
        format_version: FORMAT_VERSION,
        name: name.to_string(),
        source: source.to_path_buf(),
        chunk_size,
        chunk_overlap,
        embedding_model: embedder.model_name().to_string(),
        created_at: Utc::now(),
        entries: chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect(),
    })
}

fn load_index(path: &Path) -> Result<VectorIndex> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read index: {}", path.display()))?;
    let index: VectorIndex = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse index: {}", path.display()))?;
    if index.format_version != FORMAT_VERSION {
        bail!(
            "Unsupported index format version {} in {} (expected {}); delete the directory to rebuild",
            index.format_version,
            path.display(),
            FORMAT_VERSION
        );
    }
    Ok(index)
}

fn persist_index(index: &VectorIndex, storage: &Path) -> Result<()> {
    std::fs::create_dir_all(storage)
        .with_context(|| format!("Failed to create index directory: {}", storage.display()))?;

    let tmp_path = storage.join(format!("{}.tmp", INDEX_FILE));
    let final_path = storage.join(INDEX_FILE);

    let json = serde_json::to_vec(index)?;
    std::fs::write(&tmp_path, json)
        .with_context(|| format!("Failed to write index: {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, &final_path)
        .with_context(|| format!("Failed to move index into place: {}", final_path.display()))?;
    Ok(())
}

fn lock_path(storage: &Path) -> PathBuf {
    let mut p: OsString = storage.as_os_str().to_owned();
    p.push(".lock");
    PathBuf::from(p)
}

/// Run filesystem work on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

/// Take the exclusive build lock for `storage`. Released when the file drops.
async fn acquire_lock(storage: &Path) -> Result<File> {
    let path = lock_path(storage);

    blocking(move || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        file.lock_exclusive()
            .with_context(|| format!("Failed to lock: {}", path.display()))?;
        Ok(file)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Embeds text as letter-frequency vectors over `a..=z`.
    struct LetterEmbedder {
        calls: AtomicUsize,
    }

    impl LetterEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for LetterEmbedder {
        fn model_name(&self) -> &str {
            "letters"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0f32; 26];
                    for c in t.to_lowercase().chars() {
                        if c.is_ascii_lowercase() {
                            v[(c as u8 - b'a') as usize] += 1.0;
                        }
                    }
                    v
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }
        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
            bail!("provider unavailable")
        }
    }

    fn write_source(dir: &Path) -> PathBuf {
        let path = dir.join("albums.txt");
        std::fs::write(
            &path,
            "Artista: Taylor Swift\nÁlbuns: Fearless (2008)\n\nArtista: Zzz Zoo\nÁlbuns: Buzz (2001)",
        )
        .unwrap();
        path
    }

    #[tokio::test]
    async fn test_builds_then_loads_from_disk() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(tmp.path());
        let storage = tmp.path().join("storage").join("albums");
        let embedder = LetterEmbedder::new();

        let built = load_or_create("albums", &storage, &source, 8, 2, &embedder)
            .await
            .unwrap();
        assert!(!built.is_empty());
        assert!(storage.join(INDEX_FILE).exists());
        assert!(!storage.join("index.json.tmp").exists());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);

        // Source removal proves the second call never reads it
        std::fs::remove_file(&source).unwrap();
        let loaded = load_or_create("albums", &storage, &source, 8, 2, &embedder)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
        assert_eq!(loaded.len(), built.len());
        assert_eq!(loaded.entries[0].chunk, built.entries[0].chunk);
    }

    #[tokio::test]
    async fn test_missing_source_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let storage = tmp.path().join("storage");
        let err = load_or_create(
            "songs",
            &storage,
            &tmp.path().join("missing.txt"),
            256,
            30,
            &LetterEmbedder::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
        assert!(!storage.join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_embedding_failure_persists_nothing() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(tmp.path());
        let storage = tmp.path().join("storage");
        let err = load_or_create("albums", &storage, &source, 256, 30, &FailingEmbedder)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("provider unavailable"));
        assert!(!storage.join(INDEX_FILE).exists());
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(tmp.path());
        let embedder = LetterEmbedder::new();
        let index = load_or_create("albums", &tmp.path().join("s"), &source, 8, 0, &embedder)
            .await
            .unwrap();

        let results = index.query(&embedder, "zzz zoo buzz", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].chunk.text.contains("Zzz"), "{}", results[0].chunk.text);

        let all = index.query(&embedder, "taylor", 100).await.unwrap();
        assert_eq!(all.len(), index.len());
        for pair in all.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_runs_build_once() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(tmp.path());
        let storage = tmp.path().join("storage");
        let embedder = LetterEmbedder::new();

        let (a, b) = tokio::join!(
            load_or_create("albums", &storage, &source, 8, 2, &embedder),
            load_or_create("albums", &storage, &source, 8, 2, &embedder),
        );
        assert_eq!(a.unwrap().len(), b.unwrap().len());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_corrupt_index_is_reported_not_rebuilt() {
        let tmp = TempDir::new().unwrap();
        let source = write_source(tmp.path());
        let storage = tmp.path().join("storage");
        std::fs::create_dir_all(&storage).unwrap();
        std::fs::write(storage.join(INDEX_FILE), "{ truncated").unwrap();

        let embedder = LetterEmbedder::new();
        let err = load_or_create("albums", &storage, &source, 8, 2, &embedder)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse index"), "{:#}", err);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_lock_path_is_sibling() {
        assert_eq!(
            lock_path(Path::new("./storage/albums")),
            PathBuf::from("./storage/albums.lock")
        );
    }
}
