use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::recommend::{
    FeatureFamily, WeightVector, DEFAULT_CHARACTER_LINE_THRESHOLD, DEFAULT_WEIGHTS,
    RESERVED_SPEAKERS,
};
use crate::semantic::{DEFAULT_MAX_EPISODES, DEFAULT_MODEL, DEFAULT_SHARD_ROWS, DEFAULT_TOP_LINES};

const CONFIG_FILE: &str = "config.yaml";

/// Default model download timeout in seconds
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
/// Default number of texts per embedding call
const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is malformed: {0}")]
    Malformed(#[from] serde_yml::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Input file locations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    #[serde(default = "default_metadata_path")]
    pub metadata_path: PathBuf,

    #[serde(default = "default_dialogue_path")]
    pub dialogue_path: PathBuf,

    /// Directory holding the precomputed dialogue embedding shards
    #[serde(default = "default_shards_dir")]
    pub shards_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            metadata_path: default_metadata_path(),
            dialogue_path: default_dialogue_path(),
            shards_dir: default_shards_dir(),
        }
    }
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("episode_info.csv")
}

fn default_dialogue_path() -> PathBuf {
    PathBuf::from("dialogue.csv")
}

fn default_shards_dir() -> PathBuf {
    PathBuf::from("embeddings")
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Model name for embeddings (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_model")]
    pub model: String,

    /// Timeout for model download in seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

/// Default weight per feature family
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightsConfig {
    #[serde(default = "weight::<0>")]
    pub dialogue: f32,
    #[serde(default = "weight::<1>")]
    pub keywords: f32,
    #[serde(default = "weight::<2>")]
    pub summary: f32,
    #[serde(default = "weight::<3>")]
    pub rating: f32,
    #[serde(default = "weight::<4>")]
    pub votes: f32,
    #[serde(default = "weight::<5>")]
    pub emotion: f32,
    #[serde(default = "weight::<6>")]
    pub character_count: f32,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        let [dialogue, keywords, summary, rating, votes, emotion, character_count] =
            DEFAULT_WEIGHTS;
        Self {
            dialogue,
            keywords,
            summary,
            rating,
            votes,
            emotion,
            character_count,
        }
    }
}

fn weight<const N: usize>() -> f32 {
    DEFAULT_WEIGHTS[N]
}

impl WeightsConfig {
    /// Weights in composite order.
    pub fn to_vec(&self) -> Vec<f32> {
        vec![
            self.dialogue,
            self.keywords,
            self.summary,
            self.rating,
            self.votes,
            self.emotion,
            self.character_count,
        ]
    }

    pub fn to_weight_vector(&self) -> Result<WeightVector, ConfigError> {
        WeightVector::new(self.to_vec()).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecommenderConfig {
    #[serde(default)]
    pub weights: WeightsConfig,

    /// Corpus lines a speaker needs (strictly more than) to get a feature column
    #[serde(default = "default_character_line_threshold")]
    pub character_line_threshold: usize,

    #[serde(default = "default_excluded_speakers")]
    pub excluded_speakers: Vec<String>,

    /// Explicit character list; overrides the threshold when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<Vec<String>>,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            weights: WeightsConfig::default(),
            character_line_threshold: DEFAULT_CHARACTER_LINE_THRESHOLD,
            excluded_speakers: default_excluded_speakers(),
            characters: None,
        }
    }
}

fn default_character_line_threshold() -> usize {
    DEFAULT_CHARACTER_LINE_THRESHOLD
}

fn default_excluded_speakers() -> Vec<String> {
    RESERVED_SPEAKERS.iter().map(|s| s.to_string()).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Dialogue lines scored per query before collapsing to episodes
    #[serde(default = "default_top_lines")]
    pub top_lines: usize,

    #[serde(default = "default_max_episodes")]
    pub max_episodes: usize,

    /// Rows per embedding shard written by precompute
    #[serde(default = "default_shard_rows")]
    pub shard_rows: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            top_lines: DEFAULT_TOP_LINES,
            max_episodes: DEFAULT_MAX_EPISODES,
            shard_rows: DEFAULT_SHARD_ROWS,
        }
    }
}

fn default_top_lines() -> usize {
    DEFAULT_TOP_LINES
}

fn default_max_episodes() -> usize {
    DEFAULT_MAX_EPISODES
}

fn default_shard_rows() -> usize {
    DEFAULT_SHARD_ROWS
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub recommender: RecommenderConfig,
    #[serde(default)]
    pub query: QueryConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    fn validate(&mut self) -> Result<(), ConfigError> {
        let weights = self.recommender.weights.to_vec();
        for (family, value) in FeatureFamily::ALL.iter().zip(weights) {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "recommender.weights.{family} must be a non-negative number, got {value}"
                )));
            }
        }

        // normalise speaker names the way dialogue labels are read
        for name in self.recommender.excluded_speakers.iter_mut() {
            *name = name.trim().to_string();
        }
        if let Some(characters) = self.recommender.characters.as_mut() {
            for name in characters.iter_mut() {
                *name = name.trim().to_string();
            }
        }

        if self.embedding.download_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding.download_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(ConfigError::Invalid(
                "embedding.batch_size must be greater than 0".to_string(),
            ));
        }

        let query = &self.query;
        for (name, value) in [
            ("top_lines", query.top_lines),
            ("max_episodes", query.max_episodes),
            ("shard_rows", query.shard_rows),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!(
                    "query.{name} must be greater than 0"
                )));
            }
        }

        Ok(())
    }

    pub fn load_with(base_path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let base_path = base_path.as_ref();
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            fs::create_dir_all(base_path)?;
            write_atomic(&path, serde_yml::to_string(&Self::default())?.as_bytes())?;
            log::info!("created default config at {}", path.display());
        }

        let config_str = fs::read_to_string(&path)?;
        let mut config: Self = serde_yml::from_str(&config_str)?;

        config.base_path = base_path.to_path_buf();

        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let config_str = serde_yml::to_string(&self)?;
        write_atomic(&self.base_path.join(CONFIG_FILE), config_str.as_bytes())?;
        Ok(())
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a configured path against the base directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.resolve(&self.data.metadata_path)
    }

    pub fn dialogue_path(&self) -> PathBuf {
        self.resolve(&self.data.dialogue_path)
    }

    pub fn shards_dir(&self) -> PathBuf {
        self.resolve(&self.data.shards_dir)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let temp_path = path.with_extension("yaml.tmp");
    fs::write(&temp_path, bytes)?;
    fs::rename(&temp_path, path)
}
