//! Speaker utilities shared by the character-count feature and the character
//! filter.
//!
//! Dialogue lines may credit several speakers at once (`JERRY & GEORGE`). Every
//! component that reasons about "who speaks in an episode" goes through
//! [`split_speakers`] so both sides agree on the splitting rule.

use std::collections::HashMap;

use crate::dataset::{DialogueTable, EpisodeKey, EpisodeTable};

/// Separator between jointly credited speakers.
pub const SPEAKER_DELIMITER: char = '&';

/// Split a speaker label into trimmed, non-empty speaker names.
pub fn split_speakers(label: &str) -> impl Iterator<Item = &str> {
    label
        .split(SPEAKER_DELIMITER)
        .map(str::trim)
        .filter(|name| !name.is_empty())
}

/// Lines per speaker across the whole corpus, most talkative first.
///
/// Jointly credited lines count once for each credited speaker. Ties are
/// ordered by name so the result is stable.
pub fn line_counts(dialogue: &DialogueTable) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for line in dialogue.iter() {
        for speaker in split_speakers(&line.speaker) {
            *counts.entry(speaker).or_insert(0) += 1;
        }
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(name, count)| (name.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// Speakers whose corpus line count exceeds `threshold`, minus `excluded`.
pub fn frequent_speakers(
    dialogue: &DialogueTable,
    threshold: usize,
    excluded: &[String],
) -> Vec<String> {
    line_counts(dialogue)
        .into_iter()
        .filter(|(name, count)| *count > threshold && !excluded.iter().any(|e| e == name))
        .map(|(name, _)| name)
        .collect()
}

/// Per-episode line counts for each of `characters`, aligned with `episodes`.
///
/// Returns one column per character in the order given. Characters that never
/// speak get an all-zero column.
pub fn line_counts_per_episode(
    episodes: &EpisodeTable,
    dialogue: &DialogueTable,
    characters: &[String],
) -> Vec<(String, Vec<u32>)> {
    let row_of: HashMap<&EpisodeKey, usize> = episodes
        .iter()
        .enumerate()
        .map(|(idx, episode)| (&episode.key, idx))
        .collect();
    let column_of: HashMap<&str, usize> = characters
        .iter()
        .enumerate()
        .map(|(idx, name)| (name.as_str(), idx))
        .collect();

    let mut columns = vec![vec![0u32; episodes.len()]; characters.len()];
    for line in dialogue.iter() {
        let Some(&row) = row_of.get(&line.key) else {
            continue;
        };
        for speaker in split_speakers(&line.speaker) {
            if let Some(&col) = column_of.get(speaker) {
                columns[col][row] += 1;
            }
        }
    }

    characters.iter().cloned().zip(columns).collect()
}
