//! Episode filters applied before semantic search.
//!
//! Filters compose as a sequential intersection: season, then rating, then
//! character. A filter set to `None` keeps every row. Seasons and characters
//! that do not occur in the data at all are rejected; known values that match
//! no episode give an empty table.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::dataset::{DialogueTable, EpisodeKey, EpisodeTable};
use crate::speakers::split_speakers;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum FilterError {
    #[error("rating bounds must be finite, got [{low}, {high}]")]
    NonFiniteRating { low: f32, high: f32 },

    #[error("rating range is inverted: {low} > {high}")]
    InvertedRating { low: f32, high: f32 },

    #[error("season {0} does not exist")]
    UnknownSeason(u32),

    #[error("character '{0}' never speaks")]
    UnknownCharacter(String),
}

impl FilterError {
    /// Whether the filter named a season or character absent from the data.
    pub fn is_unknown_reference(&self) -> bool {
        matches!(
            self,
            FilterError::UnknownSeason(_) | FilterError::UnknownCharacter(_)
        )
    }
}

/// Inclusive rating range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingRange {
    low: f32,
    high: f32,
}

impl RatingRange {
    pub fn new(low: f32, high: f32) -> Result<Self, FilterError> {
        if !low.is_finite() || !high.is_finite() {
            return Err(FilterError::NonFiniteRating { low, high });
        }
        if low > high {
            return Err(FilterError::InvertedRating { low, high });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn contains(&self, rating: f32) -> bool {
        self.low <= rating && rating <= self.high
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeFilter {
    #[serde(default)]
    pub seasons: Option<Vec<u32>>,
    #[serde(default)]
    pub rating: Option<RatingRange>,
    #[serde(default)]
    pub characters: Option<Vec<String>>,
}

impl EpisodeFilter {
    pub fn is_empty(&self) -> bool {
        self.seasons.is_none() && self.rating.is_none() && self.characters.is_none()
    }

    /// Apply every configured filter to `episodes`.
    pub fn apply(
        &self,
        episodes: &EpisodeTable,
        dialogue: &DialogueTable,
    ) -> Result<EpisodeTable, FilterError> {
        let filtered = by_season(episodes, self.seasons.as_deref())?;
        let filtered = by_rating(&filtered, self.rating);
        let filtered = by_characters(&filtered, dialogue, self.characters.as_deref())?;

        log::debug!(
            "filters kept {} of {} episodes",
            filtered.len(),
            episodes.len()
        );
        Ok(filtered)
    }
}

/// Rows whose season is one of `seasons`.
///
/// Fails on a season no row of `episodes` belongs to.
pub fn by_season(
    episodes: &EpisodeTable,
    seasons: Option<&[u32]>,
) -> Result<EpisodeTable, FilterError> {
    let Some(seasons) = seasons else {
        return Ok(episodes.clone());
    };

    let known: HashSet<u32> = episodes.iter().map(|ep| ep.season).collect();
    if let Some(season) = seasons.iter().find(|season| !known.contains(season)) {
        return Err(FilterError::UnknownSeason(*season));
    }

    Ok(episodes.filtered(|ep| seasons.contains(&ep.season)))
}

/// Rows rated within `range`, bounds included.
pub fn by_rating(episodes: &EpisodeTable, range: Option<RatingRange>) -> EpisodeTable {
    match range {
        None => episodes.clone(),
        Some(range) => episodes.filtered(|ep| range.contains(ep.rating)),
    }
}

/// Rows in which every one of `characters` speaks at least once.
///
/// Jointly credited lines count for each credited speaker. An empty list keeps
/// every row. Fails on a name that speaks nowhere in `dialogue`.
pub fn by_characters(
    episodes: &EpisodeTable,
    dialogue: &DialogueTable,
    characters: Option<&[String]>,
) -> Result<EpisodeTable, FilterError> {
    let characters = match characters {
        None | Some([]) => return Ok(episodes.clone()),
        Some(characters) => characters,
    };

    let mut speakers: HashMap<&EpisodeKey, HashSet<&str>> = HashMap::new();
    for line in dialogue.iter() {
        speakers
            .entry(&line.key)
            .or_default()
            .extend(split_speakers(&line.speaker));
    }

    let known: HashSet<&str> = speakers.values().flatten().copied().collect();
    if let Some(name) = characters.iter().find(|name| !known.contains(name.trim())) {
        return Err(FilterError::UnknownCharacter(name.trim().to_string()));
    }

    Ok(episodes.filtered(|ep| {
        speakers.get(&ep.key).is_some_and(|present| {
            characters
                .iter()
                .all(|name| present.contains(name.trim()))
        })
    }))
}
