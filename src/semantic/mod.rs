//! Semantic search infrastructure for dialogue embeddings.
//!
//! # Architecture
//!
//! - `embeddings`: The `TextEmbedder` seam and its fastembed backend
//! - `similarity`: Cosine similarity and top-k selection
//! - `storage`: Sharded binary persistence of the dialogue embedding matrix
//! - `corpus`: Dialogue corpus and free-text episode search

mod corpus;
pub mod embeddings;
mod similarity;
mod storage;

pub use corpus::{
    CorpusError, DialogueCorpus, QueryError, QueryResult, SearchHit, SemanticQueryIndex,
    DEFAULT_MAX_EPISODES, DEFAULT_TOP_LINES,
};
pub use embeddings::{model_id_hash, EmbeddingError, EmbeddingModel, TextEmbedder};
pub use similarity::{cosine_similarity, l2_norm, top_k, Scored};
pub use storage::{ShardStorage, ShardStorageError, DEFAULT_SHARD_ROWS};

/// Default embedding model name.
pub const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";
