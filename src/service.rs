//! Episode service: the single entry point the CLI talks to.
//!
//! - Loads the metadata and dialogue tables once
//! - Lazy-loads the embedding model, recommender features and dialogue corpus
//! - Thread-safe with interior mutability for lazy initialization

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::config::{Config, ConfigError};
use crate::dataset::{DatasetError, DialogueLine, DialogueTable, Episode, EpisodeTable};
use crate::filters::{EpisodeFilter, FilterError};
use crate::recommend::{
    CharacterSelection, RecommendError, RecommendRequest, Recommender, WeightVector,
};
use crate::semantic::{
    CorpusError, DialogueCorpus, EmbeddingError, EmbeddingModel, QueryError, SearchHit,
    SemanticQueryIndex, ShardStorage, ShardStorageError, TextEmbedder,
};
use crate::speakers;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Recommend(#[from] RecommendError),

    #[error("Filter error: {0}")]
    Filter(#[from] FilterError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Storage error: {0}")]
    Storage(#[from] ShardStorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn is_input_shape(&self) -> bool {
        match self {
            ServiceError::Recommend(err) => err.is_input_shape(),
            ServiceError::Dataset(DatasetError::Io(_)) => false,
            ServiceError::Filter(err) => !err.is_unknown_reference(),
            ServiceError::Dataset(_)
            | ServiceError::Corpus(CorpusError::RowCountMismatch { .. })
            | ServiceError::Corpus(CorpusError::RaggedMatrix { .. })
            | ServiceError::Query(QueryError::DimensionMismatch { .. }) => true,
            _ => false,
        }
    }

    pub fn is_unknown_reference(&self) -> bool {
        match self {
            ServiceError::Recommend(err) => err.is_unknown_reference(),
            ServiceError::Filter(err) => err.is_unknown_reference(),
            _ => false,
        }
    }
}

/// Result of a filtered semantic query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    /// Episodes left after filtering, the universe the query searched.
    pub filtered: Vec<Episode>,
    pub results: Vec<Episode>,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrecomputeSummary {
    pub lines: usize,
    pub shards: usize,
}

/// Recommendation, search and lookup over one episode dataset.
///
/// Lazily loads the embedding model on first use and caches the derived
/// structures for the lifetime of the service.
pub struct EpisodeService {
    config: Config,
    episodes: Arc<EpisodeTable>,
    dialogue: Arc<DialogueTable>,
    /// Uses Mutex<Option<_>> instead of OnceLock because get_or_try_init is
    /// unstable.
    embedder: Mutex<Option<Arc<dyn TextEmbedder>>>,
    recommender: Mutex<Option<Arc<Recommender>>>,
    query_index: Mutex<Option<Arc<SemanticQueryIndex>>>,
}

impl EpisodeService {
    pub fn new(config: Config, episodes: EpisodeTable, dialogue: DialogueTable) -> Self {
        Self {
            config,
            episodes: Arc::new(episodes),
            dialogue: Arc::new(dialogue),
            embedder: Mutex::new(None),
            recommender: Mutex::new(None),
            query_index: Mutex::new(None),
        }
    }

    /// Load both tables from the paths in `config`.
    pub fn open(config: Config) -> Result<Self, ServiceError> {
        let now = Instant::now();
        let episodes = EpisodeTable::from_path(config.metadata_path())?;
        let dialogue = DialogueTable::from_path(config.dialogue_path())?;
        log::info!(
            "loaded {} episodes and {} dialogue lines in {}ms",
            episodes.len(),
            dialogue.len(),
            now.elapsed().as_millis()
        );

        Ok(Self::new(config, episodes, dialogue))
    }

    /// Use `embedder` instead of loading the configured model.
    pub fn with_embedder(self, embedder: Arc<dyn TextEmbedder>) -> Self {
        Self {
            embedder: Mutex::new(Some(embedder)),
            ..self
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn episodes(&self) -> &EpisodeTable {
        &self.episodes
    }

    pub fn dialogue(&self) -> &DialogueTable {
        &self.dialogue
    }

    /// Recommend `count` episodes similar to `seeds`.
    pub fn recommend<S: AsRef<str>>(
        &self,
        seeds: &[S],
        count: usize,
    ) -> Result<Vec<Episode>, ServiceError> {
        Ok(self.recommender()?.find_closest(seeds, count)?)
    }

    /// Recommend from an untyped JSON request.
    pub fn recommend_json(&self, request: &Value) -> Result<Vec<Episode>, ServiceError> {
        let request = RecommendRequest::from_json(request)?;
        Ok(self.recommender()?.find_closest_request(&request)?)
    }

    pub fn set_weights(&self, weights: Vec<f32>) -> Result<(), ServiceError> {
        self.recommender()?
            .index()
            .set_weights(weights)
            .map_err(RecommendError::from)?;
        Ok(())
    }

    pub fn reset_weights(&self) -> Result<(), ServiceError> {
        self.recommender()?
            .index()
            .reset_weights()
            .map_err(RecommendError::from)?;
        Ok(())
    }

    /// Current weights, or the configured defaults if features are not built yet.
    pub fn weights(&self) -> Result<WeightVector, ServiceError> {
        let built = self.lock(&self.recommender)?.clone();
        match built {
            Some(recommender) => Ok(recommender
                .index()
                .weights()
                .map_err(RecommendError::from)?),
            None => Ok(self.config.recommender.weights.to_weight_vector()?),
        }
    }

    /// Filter the episode table, then search its dialogue for `text`.
    ///
    /// The embedding model and corpus are not loaded when no episode survives
    /// the filters.
    pub fn query(&self, text: &str, filter: &EpisodeFilter) -> Result<QueryResponse, ServiceError> {
        let filtered = filter.apply(&self.episodes, &self.dialogue)?;
        if filtered.is_empty() {
            log::info!("no episode matches the filters");
            return Ok(QueryResponse {
                filtered: vec![],
                results: vec![],
                hits: vec![],
            });
        }

        let result = self.query_index()?.query(&filtered, text)?;
        Ok(QueryResponse {
            filtered: filtered.into_rows(),
            results: result.episodes,
            hits: result.hits,
        })
    }

    /// Embed every dialogue line and write the shard store.
    ///
    /// Replaces any corpus already loaded by this service.
    pub fn precompute(&self, show_progress: bool) -> Result<PrecomputeSummary, ServiceError> {
        let span = tracing::info_span!("precompute", lines = self.dialogue.len());
        let _enter = span.enter();
        let now = Instant::now();

        let embedder = self.embedder()?;
        let progress = if show_progress {
            let bar = ProgressBar::new(self.dialogue.len() as u64);
            bar.set_style(
                ProgressStyle::with_template(
                    "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} lines ({eta})",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        let rows = DialogueCorpus::embed_lines(
            &self.dialogue,
            embedder.as_ref(),
            self.config.embedding.batch_size,
            |done| progress.set_position(done as u64),
        )?;
        progress.finish_and_clear();

        let storage = ShardStorage::new(self.config.shards_dir());
        let shards = storage.save(
            &rows,
            &embedder.model_id_hash(),
            embedder.dimensions(),
            self.config.query.shard_rows,
        )?;

        log::info!(
            "wrote {} lines to {} shards in {}ms",
            rows.len(),
            shards,
            now.elapsed().as_millis()
        );

        *self.lock(&self.query_index)? = None;

        Ok(PrecomputeSummary {
            lines: rows.len(),
            shards,
        })
    }

    /// Corpus line counts per speaker, most talkative first.
    pub fn line_counts(&self, limit: Option<usize>) -> Vec<(String, usize)> {
        let mut counts = speakers::line_counts(&self.dialogue);
        if let Some(limit) = limit {
            counts.truncate(limit);
        }
        counts
    }

    /// Per-episode line counts for `characters`, aligned with the episode table.
    pub fn character_line_counts(&self, characters: &[String]) -> Vec<(String, Vec<u32>)> {
        speakers::line_counts_per_episode(&self.episodes, &self.dialogue, characters)
    }

    /// Dialogue of the episode titled `title`, empty when there is none.
    pub fn script_for_title(&self, title: &str) -> Vec<DialogueLine> {
        self.dialogue
            .lines_for_title(&self.episodes, title)
            .into_iter()
            .cloned()
            .collect()
    }

    fn embedder(&self) -> Result<Arc<dyn TextEmbedder>, ServiceError> {
        let mut guard = self.lock(&self.embedder)?;
        if let Some(embedder) = guard.as_ref() {
            return Ok(embedder.clone());
        }

        let span = tracing::info_span!("load_model", model = %self.config.embedding.model);
        let _enter = span.enter();
        log::info!(
            "Initializing embedding model '{}'",
            self.config.embedding.model
        );

        let timeout = Duration::from_secs(self.config.embedding.download_timeout_secs);
        let model = EmbeddingModel::new(
            &self.config.embedding.model,
            self.config.base_path().to_path_buf(),
            Some(timeout),
        )?
        .with_batch_size(self.config.embedding.batch_size);

        let embedder: Arc<dyn TextEmbedder> = Arc::new(model);
        *guard = Some(embedder.clone());
        Ok(embedder)
    }

    fn recommender(&self) -> Result<Arc<Recommender>, ServiceError> {
        let mut guard = self.lock(&self.recommender)?;
        if let Some(recommender) = guard.as_ref() {
            return Ok(recommender.clone());
        }

        let embedder = self.embedder()?;
        let settings = &self.config.recommender;
        let characters = match &settings.characters {
            Some(names) => CharacterSelection::Explicit(names.clone()),
            None => CharacterSelection::Frequent {
                threshold: settings.character_line_threshold,
                excluded: settings.excluded_speakers.clone(),
            },
        };

        let recommender = Arc::new(Recommender::build(
            self.episodes.clone(),
            &self.dialogue,
            embedder.as_ref(),
            characters,
            settings.weights.to_weight_vector()?,
        )?);
        *guard = Some(recommender.clone());
        Ok(recommender)
    }

    fn query_index(&self) -> Result<Arc<SemanticQueryIndex>, ServiceError> {
        let mut guard = self.lock(&self.query_index)?;
        if let Some(index) = guard.as_ref() {
            return Ok(index.clone());
        }

        let embedder = self.embedder()?;
        let span = tracing::info_span!("load_corpus");
        let _enter = span.enter();
        let now = Instant::now();

        let storage = ShardStorage::new(self.config.shards_dir());
        let corpus = DialogueCorpus::from_storage(&self.dialogue, &storage, embedder.as_ref())?;
        log::info!(
            "loaded {} line embeddings from {} in {}ms",
            corpus.len(),
            storage.dir().display(),
            now.elapsed().as_millis()
        );

        let index = Arc::new(
            SemanticQueryIndex::new(Arc::new(corpus), embedder)
                .with_limits(self.config.query.top_lines, self.config.query.max_episodes),
        );
        *guard = Some(index.clone());
        Ok(index)
    }

    fn lock<'a, T>(
        &self,
        slot: &'a Mutex<T>,
    ) -> Result<std::sync::MutexGuard<'a, T>, ServiceError> {
        slot.lock()
            .map_err(|e| ServiceError::Internal(format!("Lock poisoned: {}", e)))
    }
}
