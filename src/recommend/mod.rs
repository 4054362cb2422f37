//! Content-based episode recommendation.
//!
//! - `features`: per-episode feature families
//! - `composite`: weighted concatenation of the families
//! - `engine`: seed-based ranking

mod composite;
mod engine;
mod features;

pub use composite::{CompositeError, WeightVector, WeightedCompositeIndex, DEFAULT_WEIGHTS};
pub use engine::{Ranked, RecommendError, RecommendRequest, Recommender};
pub use features::{
    scale_column, CharacterSelection, FeatureError, FeatureFamily, FeatureMatrix, FeatureSet,
    FeatureVectorBuilder, DEFAULT_CHARACTER_LINE_THRESHOLD, RECENTER_DIVISOR, RECENTER_OFFSET,
    RESERVED_SPEAKERS,
};
