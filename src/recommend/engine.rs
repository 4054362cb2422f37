use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use crate::dataset::{DialogueTable, Episode, EpisodeTable};
use crate::recommend::composite::{CompositeError, WeightVector, WeightedCompositeIndex};
use crate::recommend::features::{CharacterSelection, FeatureError, FeatureVectorBuilder};
use crate::semantic::{cosine_similarity, l2_norm, TextEmbedder};

#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    #[error("count must be a positive integer, got {0}")]
    BadCount(String),

    #[error("at least one seed title is required")]
    EmptySeeds,

    #[error("seed at position {position} is not a title string")]
    InvalidSeedType { position: usize },

    #[error("unknown episode title: {0}")]
    UnknownTitle(String),

    #[error("Feature error: {0}")]
    Features(#[from] FeatureError),

    #[error("Weight error: {0}")]
    Composite(#[from] CompositeError),
}

impl RecommendError {
    /// The request itself is malformed.
    pub fn is_input_shape(&self) -> bool {
        match self {
            RecommendError::BadCount(_)
            | RecommendError::EmptySeeds
            | RecommendError::InvalidSeedType { .. } => true,
            RecommendError::Features(_) => true,
            RecommendError::Composite(err) => !matches!(err, CompositeError::Poisoned(_)),
            RecommendError::UnknownTitle(_) => false,
        }
    }

    /// The request names an episode that does not exist.
    pub fn is_unknown_reference(&self) -> bool {
        matches!(self, RecommendError::UnknownTitle(_))
    }
}

/// A recommendation request decoded from untyped JSON.
///
/// Expected shape: `{"seeds": ["title", ...], "count": 3}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendRequest {
    pub seeds: Vec<String>,
    pub count: usize,
}

impl RecommendRequest {
    pub fn from_json(value: &Value) -> Result<Self, RecommendError> {
        let count = match value.get("count") {
            Some(Value::Number(n)) => n
                .as_u64()
                .filter(|&c| c > 0)
                .map(|c| c as usize)
                .ok_or_else(|| RecommendError::BadCount(n.to_string()))?,
            Some(other) => return Err(RecommendError::BadCount(other.to_string())),
            None => return Err(RecommendError::BadCount("missing".to_string())),
        };

        let seeds = match value.get("seeds") {
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(position, item)| match item {
                    Value::String(title) => Ok(title.clone()),
                    _ => Err(RecommendError::InvalidSeedType { position }),
                })
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::String(title)) => vec![title.clone()],
            Some(_) => return Err(RecommendError::InvalidSeedType { position: 0 }),
            None => return Err(RecommendError::EmptySeeds),
        };

        Ok(Self { seeds, count })
    }
}

/// Candidate row with its mean negated similarity to the seeds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Ranked {
    pub row: usize,
    pub distance: f32,
}

/// Episode recommender over weighted composite vectors.
pub struct Recommender {
    episodes: Arc<EpisodeTable>,
    index: WeightedCompositeIndex,
}

impl Recommender {
    pub fn new(episodes: Arc<EpisodeTable>, index: WeightedCompositeIndex) -> Self {
        Self { episodes, index }
    }

    /// Build features for `episodes` and wrap them with `defaults` as the
    /// default weight vector.
    pub fn build(
        episodes: Arc<EpisodeTable>,
        dialogue: &DialogueTable,
        embedder: &dyn TextEmbedder,
        characters: CharacterSelection,
        defaults: WeightVector,
    ) -> Result<Self, RecommendError> {
        let span = tracing::info_span!("build_features", episodes = episodes.len());
        let _enter = span.enter();
        let now = Instant::now();

        let features = FeatureVectorBuilder::new(embedder)
            .with_characters(characters)
            .build(&episodes, dialogue)?;

        log::info!(
            "built features for {} episodes ({} composite dimensions) in {}ms",
            features.episode_count(),
            features.composite_dimensions(),
            now.elapsed().as_millis()
        );

        Ok(Self::new(
            episodes,
            WeightedCompositeIndex::with_defaults(features, defaults),
        ))
    }

    pub fn episodes(&self) -> &EpisodeTable {
        &self.episodes
    }

    pub fn index(&self) -> &WeightedCompositeIndex {
        &self.index
    }

    /// The `count` episodes closest to the seed titles, closest first.
    /// Seeds are never part of the result.
    pub fn find_closest<S: AsRef<str>>(
        &self,
        seeds: &[S],
        count: usize,
    ) -> Result<Vec<Episode>, RecommendError> {
        let ranked = self.ranked(seeds, count)?;
        Ok(ranked
            .into_iter()
            .filter_map(|r| self.episodes.get(r.row).cloned())
            .collect())
    }

    pub fn find_closest_request(
        &self,
        request: &RecommendRequest,
    ) -> Result<Vec<Episode>, RecommendError> {
        self.find_closest(&request.seeds, request.count)
    }

    /// Like [`Recommender::find_closest`] but returns row indices and scores.
    pub fn ranked<S: AsRef<str>>(
        &self,
        seeds: &[S],
        count: usize,
    ) -> Result<Vec<Ranked>, RecommendError> {
        if count == 0 {
            return Err(RecommendError::BadCount(count.to_string()));
        }
        if seeds.is_empty() {
            return Err(RecommendError::EmptySeeds);
        }

        let seed_rows = seeds
            .iter()
            .map(|title| {
                let title = title.as_ref();
                self.episodes
                    .position_of_title(title)
                    .ok_or_else(|| RecommendError::UnknownTitle(title.to_string()))
            })
            .collect::<Result<Vec<usize>, _>>()?;

        let vectors = self.index.composite_vectors()?;
        let seed_vectors: Vec<&[f32]> = seed_rows.iter().map(|&r| vectors[r].as_slice()).collect();
        if seed_vectors.iter().any(|v| l2_norm(v) < f32::EPSILON) {
            log::warn!("a seed composite vector has zero norm; its similarities are all 0");
        }

        let mut ranked: Vec<Ranked> = vectors
            .iter()
            .enumerate()
            .map(|(row, candidate)| {
                let total: f32 = seed_vectors
                    .iter()
                    .map(|seed| -cosine_similarity(seed, candidate))
                    .sum();
                Ranked {
                    row,
                    distance: total / seed_vectors.len() as f32,
                }
            })
            .collect();

        // stable: equal distances keep table order
        ranked.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        ranked.retain(|r| !seed_rows.contains(&r.row));
        ranked.truncate(count);

        log::debug!(
            "ranked {} candidates for {} seeds",
            ranked.len(),
            seed_rows.len()
        );

        Ok(ranked)
    }
}
