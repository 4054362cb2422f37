//! Per-episode feature families.
//!
//! Each family yields one row per episode, in episode table order. Text
//! families come from the embedder; scalar families are min-max scaled and
//! then squeezed into `[-0.1, 0.1]` so they stay comparable to the per-dimension
//! magnitude of a unit-norm sentence embedding.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::dataset::{DialogueTable, Episode, EpisodeTable};
use crate::semantic::{EmbeddingError, TextEmbedder};
use crate::speakers;

/// Subtracted after min-max scaling.
pub const RECENTER_OFFSET: f32 = 0.5;
/// Divides the recentered value, mapping `[0, 1]` onto `[-0.1, 0.1]`.
pub const RECENTER_DIVISOR: f32 = 5.0;

/// Default corpus line count a speaker must exceed to get a feature column.
pub const DEFAULT_CHARACTER_LINE_THRESHOLD: usize = 100;

/// Speaker labels that are not characters: stage directions, group lines and
/// unattributed lines.
pub const RESERVED_SPEAKERS: [&str; 3] = ["SETTING", "ALL", "UNKNOWN"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureFamily {
    Dialogue,
    Keywords,
    Summary,
    Rating,
    Votes,
    Emotion,
    CharacterCount,
}

impl FeatureFamily {
    /// Families in composite vector order.
    pub const ALL: [FeatureFamily; 7] = [
        FeatureFamily::Dialogue,
        FeatureFamily::Keywords,
        FeatureFamily::Summary,
        FeatureFamily::Rating,
        FeatureFamily::Votes,
        FeatureFamily::Emotion,
        FeatureFamily::CharacterCount,
    ];

    pub const COUNT: usize = Self::ALL.len();

    pub fn name(&self) -> &'static str {
        match self {
            FeatureFamily::Dialogue => "dialogue",
            FeatureFamily::Keywords => "keywords",
            FeatureFamily::Summary => "summary",
            FeatureFamily::Rating => "rating",
            FeatureFamily::Votes => "votes",
            FeatureFamily::Emotion => "emotion",
            FeatureFamily::CharacterCount => "character_count",
        }
    }

    /// Position of this family in [`FeatureFamily::ALL`].
    pub fn position(&self) -> usize {
        Self::ALL
            .iter()
            .position(|family| family == self)
            .unwrap_or_default()
    }
}

impl std::fmt::Display for FeatureFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("metadata table is empty")]
    EmptyMetadata,

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("{family} feature has {got} rows for {expected} episodes")]
    Misaligned {
        family: FeatureFamily,
        expected: usize,
        got: usize,
    },

    #[error("{family} feature row {row} has {got} dimensions, expected {expected}")]
    DimensionMismatch {
        family: FeatureFamily,
        row: usize,
        expected: usize,
        got: usize,
    },
}

/// Which speakers get a line-count column.
#[derive(Debug, Clone, PartialEq)]
pub enum CharacterSelection {
    /// Speakers with more than `threshold` corpus lines, minus `excluded`.
    Frequent {
        threshold: usize,
        excluded: Vec<String>,
    },
    /// Exactly these speakers, in this order.
    Explicit(Vec<String>),
}

impl Default for CharacterSelection {
    fn default() -> Self {
        CharacterSelection::Frequent {
            threshold: DEFAULT_CHARACTER_LINE_THRESHOLD,
            excluded: RESERVED_SPEAKERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl CharacterSelection {
    pub fn resolve(&self, dialogue: &DialogueTable) -> Vec<String> {
        match self {
            CharacterSelection::Frequent {
                threshold,
                excluded,
            } => speakers::frequent_speakers(dialogue, *threshold, excluded),
            CharacterSelection::Explicit(names) => names.clone(),
        }
    }
}

/// One family's vectors, one row per episode.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub family: FeatureFamily,
    pub dimensions: usize,
    pub rows: Vec<Vec<f32>>,
}

/// Every family's matrix, aligned with the episode table.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    episode_count: usize,
    families: Vec<FeatureMatrix>,
    characters: Vec<String>,
}

impl FeatureSet {
    /// Assemble a feature set, checking that every family is present once, in
    /// order, with one row of consistent width per episode.
    pub fn new(
        episode_count: usize,
        families: Vec<FeatureMatrix>,
        characters: Vec<String>,
    ) -> Result<Self, FeatureError> {
        for (expected, matrix) in FeatureFamily::ALL.iter().zip(&families) {
            if matrix.family != *expected {
                return Err(FeatureError::Misaligned {
                    family: *expected,
                    expected: episode_count,
                    got: 0,
                });
            }
        }
        if families.len() != FeatureFamily::COUNT {
            let missing = FeatureFamily::ALL[families.len().min(FeatureFamily::COUNT - 1)];
            return Err(FeatureError::Misaligned {
                family: missing,
                expected: episode_count,
                got: 0,
            });
        }

        for matrix in &families {
            if matrix.rows.len() != episode_count {
                return Err(FeatureError::Misaligned {
                    family: matrix.family,
                    expected: episode_count,
                    got: matrix.rows.len(),
                });
            }
            if let Some((row, vector)) = matrix
                .rows
                .iter()
                .enumerate()
                .find(|(_, v)| v.len() != matrix.dimensions)
            {
                return Err(FeatureError::DimensionMismatch {
                    family: matrix.family,
                    row,
                    expected: matrix.dimensions,
                    got: vector.len(),
                });
            }
        }

        Ok(Self {
            episode_count,
            families,
            characters,
        })
    }

    pub fn episode_count(&self) -> usize {
        self.episode_count
    }

    /// Matrices in [`FeatureFamily::ALL`] order.
    pub fn families(&self) -> &[FeatureMatrix] {
        &self.families
    }

    pub fn family(&self, family: FeatureFamily) -> &FeatureMatrix {
        &self.families[family.position()]
    }

    /// Speakers backing the character-count columns, in column order.
    pub fn characters(&self) -> &[String] {
        &self.characters
    }

    /// Total width of a composite vector.
    pub fn composite_dimensions(&self) -> usize {
        self.families.iter().map(|m| m.dimensions).sum()
    }
}

/// Min-max scale to `[0, 1]`, then recenter into `[-0.1, 0.1]`.
///
/// A constant column scales to 0 before recentering.
pub fn scale_column(values: &[f32]) -> Vec<f32> {
    let min = values.iter().copied().fold(f32::INFINITY, f32::min);
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let range = max - min;

    values
        .iter()
        .map(|v| {
            let scaled = if range > 0.0 { (v - min) / range } else { 0.0 };
            (scaled - RECENTER_OFFSET) / RECENTER_DIVISOR
        })
        .collect()
}

/// Builds every feature family from the metadata and dialogue tables.
pub struct FeatureVectorBuilder<'a> {
    embedder: &'a dyn TextEmbedder,
    characters: CharacterSelection,
}

impl<'a> FeatureVectorBuilder<'a> {
    pub fn new(embedder: &'a dyn TextEmbedder) -> Self {
        Self {
            embedder,
            characters: CharacterSelection::default(),
        }
    }

    pub fn with_characters(mut self, characters: CharacterSelection) -> Self {
        self.characters = characters;
        self
    }

    /// Build all families. Any family failing fails the whole build.
    pub fn build(
        &self,
        episodes: &EpisodeTable,
        dialogue: &DialogueTable,
    ) -> Result<FeatureSet, FeatureError> {
        if episodes.is_empty() {
            return Err(FeatureError::EmptyMetadata);
        }

        let groups = dialogue.group_by_episode();
        let no_lines: Vec<usize> = vec![];
        let lines_of: Vec<&[usize]> = episodes
            .iter()
            .map(|ep| groups.get(&ep.key).unwrap_or(&no_lines).as_slice())
            .collect();

        let blobs: Vec<String> = lines_of
            .iter()
            .map(|lines| {
                lines
                    .iter()
                    .map(|&idx| dialogue.rows()[idx].text.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .collect();
        let keyword_texts: Vec<String> = episodes.iter().map(Episode::keyword_text).collect();
        let summary_texts: Vec<String> = episodes
            .iter()
            .map(|ep| ep.first_summary().to_string())
            .collect();

        let dialogue_matrix = self.embed_family(FeatureFamily::Dialogue, &blobs)?;
        let keyword_matrix = self.embed_family(FeatureFamily::Keywords, &keyword_texts)?;
        let summary_matrix = self.embed_family(FeatureFamily::Summary, &summary_texts)?;

        let ratings: Vec<f32> = episodes.iter().map(|ep| ep.rating).collect();
        let votes: Vec<f32> = episodes.iter().map(|ep| ep.votes as f32).collect();

        let emotion_means: Vec<[f32; 5]> = lines_of
            .iter()
            .map(|lines| {
                let mut sums = [0.0f32; 5];
                for &idx in lines.iter() {
                    let scores = dialogue.rows()[idx].emotions.as_array();
                    for (sum, score) in sums.iter_mut().zip(scores) {
                        *sum += score;
                    }
                }
                if !lines.is_empty() {
                    for sum in sums.iter_mut() {
                        *sum /= lines.len() as f32;
                    }
                }
                sums
            })
            .collect();
        let emotion_columns: Vec<Vec<f32>> = (0..5)
            .map(|col| emotion_means.iter().map(|means| means[col]).collect())
            .collect();

        let characters = self.characters.resolve(dialogue);
        let count_columns: Vec<Vec<f32>> =
            speakers::line_counts_per_episode(episodes, dialogue, &characters)
                .into_iter()
                .map(|(_, counts)| counts.into_iter().map(|c| c as f32).collect())
                .collect();
        log::debug!("character-count feature uses {} speakers", characters.len());

        let n = episodes.len();
        let families = vec![
            dialogue_matrix,
            keyword_matrix,
            summary_matrix,
            scaled_family(FeatureFamily::Rating, vec![ratings], n),
            scaled_family(FeatureFamily::Votes, vec![votes], n),
            scaled_family(FeatureFamily::Emotion, emotion_columns, n),
            scaled_family(FeatureFamily::CharacterCount, count_columns, n),
        ];

        FeatureSet::new(n, families, characters)
    }

    fn embed_family(
        &self,
        family: FeatureFamily,
        texts: &[String],
    ) -> Result<FeatureMatrix, FeatureError> {
        let now = Instant::now();
        let rows = self.embedder.embed_batch(texts)?;
        if rows.len() != texts.len() {
            return Err(FeatureError::Misaligned {
                family,
                expected: texts.len(),
                got: rows.len(),
            });
        }

        log::info!(
            "embedded {} {family} texts in {}ms",
            texts.len(),
            now.elapsed().as_millis()
        );

        Ok(FeatureMatrix {
            family,
            dimensions: self.embedder.dimensions(),
            rows,
        })
    }
}

/// Scale each column independently and transpose to one row per episode.
fn scaled_family(family: FeatureFamily, columns: Vec<Vec<f32>>, episodes: usize) -> FeatureMatrix {
    let scaled: Vec<Vec<f32>> = columns.iter().map(|col| scale_column(col)).collect();
    let rows = (0..episodes)
        .map(|row| scaled.iter().map(|col| col[row]).collect())
        .collect();

    FeatureMatrix {
        family,
        dimensions: scaled.len(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-6)
    }

    #[test]
    fn test_scale_column_recenters() {
        let scaled = scale_column(&[0.0, 5.0, 10.0]);
        assert!(approx(&scaled, &[-0.1, 0.0, 0.1]));

        let scaled = scale_column(&[7.4, 7.5, 8.0]);
        assert!((scaled[0] + 0.1).abs() < 1e-6);
        assert!((scaled[2] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_scale_constant_column() {
        assert!(approx(&scale_column(&[3.0, 3.0]), &[-0.1, -0.1]));
        assert!(scale_column(&[]).is_empty());
    }

    #[test]
    fn test_scaled_family_scales_columns_independently() {
        let matrix = scaled_family(
            FeatureFamily::Emotion,
            vec![vec![0.0, 1.0], vec![10.0, 20.0], vec![2.0, 2.0]],
            2,
        );

        assert_eq!(matrix.dimensions, 3);
        assert!(approx(&matrix.rows[0], &[-0.1, -0.1, -0.1]));
        assert!(approx(&matrix.rows[1], &[0.1, 0.1, -0.1]));
    }

    #[test]
    fn test_empty_selection_gives_zero_width_family() {
        let matrix = scaled_family(FeatureFamily::CharacterCount, vec![], 3);
        assert_eq!(matrix.dimensions, 0);
        assert_eq!(matrix.rows, vec![Vec::<f32>::new(); 3]);
    }

    #[test]
    fn test_family_positions_follow_composite_order() {
        for (idx, family) in FeatureFamily::ALL.iter().enumerate() {
            assert_eq!(family.position(), idx);
        }
        assert_eq!(FeatureFamily::CharacterCount.name(), "character_count");
    }

    #[test]
    fn test_feature_set_rejects_misaligned_rows() {
        let families: Vec<FeatureMatrix> = FeatureFamily::ALL
            .iter()
            .map(|family| FeatureMatrix {
                family: *family,
                dimensions: 1,
                rows: vec![vec![0.0]; if *family == FeatureFamily::Votes { 1 } else { 2 }],
            })
            .collect();

        let err = FeatureSet::new(2, families, vec![]).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::Misaligned {
                family: FeatureFamily::Votes,
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn test_feature_set_rejects_missing_family() {
        let families: Vec<FeatureMatrix> = FeatureFamily::ALL[..6]
            .iter()
            .map(|family| FeatureMatrix {
                family: *family,
                dimensions: 1,
                rows: vec![vec![0.0]; 2],
            })
            .collect();

        let err = FeatureSet::new(2, families, vec![]).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::Misaligned {
                family: FeatureFamily::CharacterCount,
                ..
            }
        ));
    }
}
