//! Free-text episode search over per-line dialogue embeddings.
//!
//! The corpus binds every dialogue line (text and owning episode) to one row
//! of a precomputed embedding matrix. A query is embedded once, scored against
//! every line, and the best lines are collapsed into distinct episodes.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use crate::dataset::{DialogueTable, Episode, EpisodeKey, EpisodeTable};
use crate::semantic::embeddings::{EmbeddingError, TextEmbedder};
use crate::semantic::similarity;
use crate::semantic::storage::{ShardStorage, ShardStorageError};

/// Lines considered per query before collapsing to episodes.
pub const DEFAULT_TOP_LINES: usize = 500;

/// Episodes returned per query.
pub const DEFAULT_MAX_EPISODES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("dialogue table has {lines} lines but embedding matrix has {rows} rows")]
    RowCountMismatch { lines: usize, rows: usize },

    #[error("embedding row {row} has {got} dimensions, expected {expected}")]
    RaggedMatrix {
        row: usize,
        expected: usize,
        got: usize,
    },

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Storage error: {0}")]
    Storage(#[from] ShardStorageError),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("query embedding has {got} dimensions, corpus has {expected}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// One matching dialogue line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub line_index: usize,
    pub text: String,
    pub key: EpisodeKey,
    pub score: f32,
}

/// Ranked episodes plus the lines that put them there.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    pub episodes: Vec<Episode>,
    /// Lines from the scoring window whose episode is in the searched table.
    pub hits: Vec<SearchHit>,
}

/// Dialogue lines bound to their embeddings. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct DialogueCorpus {
    lines: Vec<String>,
    keys: Vec<EpisodeKey>,
    embeddings: Vec<Vec<f32>>,
    dimensions: usize,
}

impl DialogueCorpus {
    /// Bind a dialogue table to an embedding matrix with one row per line.
    pub fn load(
        dialogue: &DialogueTable,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self, CorpusError> {
        if dialogue.len() != embeddings.len() {
            return Err(CorpusError::RowCountMismatch {
                lines: dialogue.len(),
                rows: embeddings.len(),
            });
        }

        let dimensions = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some((row, emb)) = embeddings
            .iter()
            .enumerate()
            .find(|(_, emb)| emb.len() != dimensions)
        {
            return Err(CorpusError::RaggedMatrix {
                row,
                expected: dimensions,
                got: emb.len(),
            });
        }

        Ok(Self {
            lines: dialogue.iter().map(|line| line.text.clone()).collect(),
            keys: dialogue.iter().map(|line| line.key.clone()).collect(),
            embeddings,
            dimensions,
        })
    }

    /// Bind a dialogue table to the precomputed shards in `storage`.
    pub fn from_storage(
        dialogue: &DialogueTable,
        storage: &ShardStorage,
        embedder: &dyn TextEmbedder,
    ) -> Result<Self, CorpusError> {
        let rows = storage.load(&embedder.model_id_hash(), embedder.dimensions())?;
        Self::load(dialogue, rows)
    }

    /// Embed every line of `dialogue` in batches of `batch_size`.
    ///
    /// `on_batch` is called with the number of lines finished so far.
    pub fn embed_lines<F>(
        dialogue: &DialogueTable,
        embedder: &dyn TextEmbedder,
        batch_size: usize,
        mut on_batch: F,
    ) -> Result<Vec<Vec<f32>>, CorpusError>
    where
        F: FnMut(usize),
    {
        let texts: Vec<String> = dialogue.iter().map(|line| line.text.clone()).collect();
        let mut rows = Vec::with_capacity(texts.len());

        for chunk in texts.chunks(batch_size.max(1)) {
            let embedded = embedder.embed_batch(chunk)?;
            if embedded.len() != chunk.len() {
                return Err(EmbeddingError::EmbeddingFailed(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    embedded.len()
                ))
                .into());
            }
            rows.extend(embedded);
            on_batch(rows.len());
        }

        Ok(rows)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// The `k` lines most similar to `query_embedding`, best first.
    pub fn search_lines(&self, query_embedding: &[f32], k: usize) -> Vec<SearchHit> {
        similarity::top_k(query_embedding, &self.embeddings, k)
            .into_iter()
            .map(|scored| SearchHit {
                line_index: scored.index,
                text: self.lines[scored.index].clone(),
                key: self.keys[scored.index].clone(),
                score: scored.score,
            })
            .collect()
    }
}

/// Semantic episode search over a loaded corpus.
pub struct SemanticQueryIndex {
    corpus: Arc<DialogueCorpus>,
    embedder: Arc<dyn TextEmbedder>,
    top_lines: usize,
    max_episodes: usize,
}

impl SemanticQueryIndex {
    pub fn new(corpus: Arc<DialogueCorpus>, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            corpus,
            embedder,
            top_lines: DEFAULT_TOP_LINES,
            max_episodes: DEFAULT_MAX_EPISODES,
        }
    }

    pub fn with_limits(mut self, top_lines: usize, max_episodes: usize) -> Self {
        self.top_lines = top_lines;
        self.max_episodes = max_episodes;
        self
    }

    pub fn corpus(&self) -> &DialogueCorpus {
        &self.corpus
    }

    /// Episodes of `episodes` whose dialogue best matches `text`.
    ///
    /// Episodes are ordered by their best line's position in the scoring
    /// window. An empty table, or a window with no line from it, gives an
    /// empty result.
    pub fn query(&self, episodes: &EpisodeTable, text: &str) -> Result<QueryResult, QueryError> {
        if episodes.is_empty() || self.corpus.is_empty() {
            return Ok(QueryResult::default());
        }

        let query_embedding = self.embedder.embed(text)?;
        if query_embedding.len() != self.corpus.dimensions() {
            return Err(QueryError::DimensionMismatch {
                expected: self.corpus.dimensions(),
                got: query_embedding.len(),
            });
        }

        let allowed = episodes.keys();
        let hits: Vec<SearchHit> = self
            .corpus
            .search_lines(&query_embedding, self.top_lines)
            .into_iter()
            .filter(|hit| allowed.contains(&hit.key))
            .collect();

        let mut seen: HashSet<&EpisodeKey> = HashSet::new();
        let mut ranked: Vec<&EpisodeKey> = vec![];
        for hit in &hits {
            if ranked.len() == self.max_episodes {
                break;
            }
            if seen.insert(&hit.key) {
                ranked.push(&hit.key);
            }
        }

        let episodes: Vec<Episode> = ranked
            .into_iter()
            .filter_map(|key| episodes.by_key(key).cloned())
            .collect();

        log::debug!(
            "query matched {} lines across {} episodes",
            hits.len(),
            episodes.len()
        );

        Ok(QueryResult { episodes, hits })
    }
}
