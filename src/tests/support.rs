//! Shared fixtures for scenario tests.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::dataset::{DialogueLine, DialogueTable, EmotionScores, Episode, EpisodeKey, EpisodeTable};
use crate::semantic::{EmbeddingError, TextEmbedder};

pub const HASHING_DIMENSIONS: usize = 512;

/// Deterministic bag-of-words embedder.
///
/// Every lowercase alphanumeric token adds ±1 to one hashed dimension; the
/// result is L2 normalised. Texts sharing words score closer, identical word
/// multisets up to scale score exactly 1. Text with no tokens maps to the zero
/// vector.
pub struct HashingEmbedder;

impl HashingEmbedder {
    fn embed_one(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; HASHING_DIMENSIONS];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();
            let sign = if hash & 1 == 0 { 1.0 } else { -1.0 };
            vector[((hash >> 1) % HASHING_DIMENSIONS as u64) as usize] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vector.iter_mut() {
                *v /= norm;
            }
        }
        vector
    }
}

impl TextEmbedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing-bow-512"
    }

    fn dimensions(&self) -> usize {
        HASHING_DIMENSIONS
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

/// Embedder that always fails, for error propagation tests.
pub struct BrokenEmbedder;

impl TextEmbedder for BrokenEmbedder {
    fn name(&self) -> &str {
        "broken"
    }

    fn dimensions(&self) -> usize {
        HASHING_DIMENSIONS
    }

    fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Err(EmbeddingError::EmbeddingFailed("model unavailable".to_string()))
    }
}

pub const PILOT_SUMMARY: &str = "In this episode Jerry is expecting a woman that he met in \
    Michigan to come and visit him in New York. Throughout the first part of the show Jerry \
    and George are discussing the situation. Later we meet Kessler who comes in to Jerry's \
    apartment to borrow some meat and knocks on the door before entering.";

pub const STAKEOUT_SUMMARY: &str = "Elaine drags Jerry to a birthday dinner for one of her \
    friends where he meets an attractive woman. He promptly forgets her name and refuses to \
    ask Elaine who she is but remembers where she works. Jerry's parents are in town and his \
    Dad suggests he stake-out the lobby around lunchtime. George tags along.";

const PILOT_KEYWORDS: [&str; 8] = [
    "tv series pilot",
    "cafe",
    "waitress",
    "coffee",
    "laundromat",
    "overnight",
    "visitor",
    "purple shirt",
];

const STAKEOUT_KEYWORDS: [&str; 8] = [
    "reference to loni anderson",
    "fake name",
    "scrabble",
    "made up word",
    "polishing shoes",
    "birthday party",
    "dream",
    "video store",
];

pub const BUTTON_LINE: &str = "See, to me, that button is in the worst possible spot. The \
    second button literally makes or breaks the shirt, look at it.";

pub const PURPLE_LINE: &str =
    "Yes, it was purple, I liked it, I dont actually recall considering the buttons.";

pub fn episode(
    season: u32,
    episode_no: u32,
    title: &str,
    rating: f32,
    votes: u64,
    summary: &str,
    keywords: &[&str],
) -> Episode {
    Episode {
        season,
        episode_no,
        key: EpisodeKey::new(season, episode_no),
        title: title.to_string(),
        rating,
        votes,
        description: format!("{title} description"),
        summaries: vec![summary.to_string()],
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        ..Default::default()
    }
}

pub fn line(speaker: &str, text: &str, season: u32, episode_no: u32, emotions: [f32; 5]) -> DialogueLine {
    let [happy, angry, surprise, sad, fear] = emotions;
    DialogueLine {
        speaker: speaker.to_string(),
        text: text.to_string(),
        key: EpisodeKey::new(season, episode_no),
        season,
        episode_no,
        emotions: EmotionScores {
            happy,
            angry,
            surprise,
            sad,
            fear,
        },
        word_count: text.split_whitespace().count() as u32,
    }
}

fn pilot() -> Episode {
    episode(1, 1, "Good News, Bad News", 7.4, 6031, PILOT_SUMMARY, &PILOT_KEYWORDS)
}

fn stakeout(season: u32, episode_no: u32, title: &str, rating: f32) -> Episode {
    episode(
        season,
        episode_no,
        title,
        rating,
        5113,
        STAKEOUT_SUMMARY,
        &STAKEOUT_KEYWORDS,
    )
}

fn pilot_lines() -> Vec<DialogueLine> {
    vec![
        line(
            "JERRY",
            "Do you know what this is all about? Do you know why were here? To be out, this \
             is out and out is one of the single most enjoyable experiences of life.",
            1,
            1,
            [0.24, 0.0, 0.0, 0.41, 0.35],
        ),
        line("JERRY", BUTTON_LINE, 1, 1, [0.0, 0.0, 0.33, 0.33, 0.33]),
        line("GEORGE", "Are you through?", 1, 1, [0.0; 5]),
        line(
            "JERRY",
            "You do of course try on, when you buy?",
            1,
            1,
            [0.0; 5],
        ),
    ]
}

/// Two episodes: the pilot and "The Stakeout".
pub fn pilot_tables() -> (EpisodeTable, DialogueTable) {
    let episodes = EpisodeTable::new(vec![pilot(), stakeout(1, 2, "The Stakeout", 7.5)]).unwrap();

    let mut lines = pilot_lines();
    lines.push(line("GEORGE", PURPLE_LINE, 1, 2, [0.0, 0.5, 0.0, 0.5, 0.0]));
    (episodes, DialogueTable::new(lines))
}

/// Pilot, "The Stakeout" and two copies of it with identical metadata and
/// dialogue. Lines are repeated so the main speakers pass the default
/// character threshold.
pub fn duplicate_tables() -> (EpisodeTable, DialogueTable) {
    let episodes = EpisodeTable::new(vec![
        pilot(),
        stakeout(1, 2, "The Stakeout", 7.5),
        stakeout(1, 3, "The Stakeout2", 7.5),
        stakeout(1, 4, "The Stakeout3", 7.5),
    ])
    .unwrap();

    let purple = [0.0, 0.5, 0.0, 0.5, 0.0];
    let mut block = pilot_lines();
    block.extend([
        line("GEORGE", PURPLE_LINE, 1, 2, purple),
        line("MAN", PURPLE_LINE, 1, 2, purple),
        line("WOMAN", PURPLE_LINE, 1, 2, purple),
        line("SETTING", PURPLE_LINE, 1, 2, purple),
        line("GEORGE", PURPLE_LINE, 1, 3, purple),
        line("GEORGE", PURPLE_LINE, 1, 4, purple),
    ]);

    let lines = std::iter::repeat(block).take(110).flatten().collect();
    (episodes, DialogueTable::new(lines))
}

/// Three episodes for search: the pilot (7.4), "The Stakeout" in season 1
/// (9.0) and a season 2 episode sharing its title (1.0).
pub fn query_tables() -> (EpisodeTable, DialogueTable) {
    let episodes = EpisodeTable::new(vec![
        pilot(),
        stakeout(1, 2, "The Stakeout", 9.0),
        stakeout(2, 2, "The Stakeout", 1.0),
    ])
    .unwrap();

    let mut lines = pilot_lines();
    lines.extend([
        line("GEORGE", PURPLE_LINE, 1, 2, [0.0, 0.5, 0.0, 0.5, 0.0]),
        line(
            "ELAINE & JERRY",
            "We should stake out the lobby of her office building at lunchtime.",
            1,
            2,
            [0.0, 0.0, 0.2, 0.0, 0.0],
        ),
        line(
            "KRAMER",
            "The lobby at lunch! You want to find her, you wait in that lobby.",
            2,
            2,
            [0.3, 0.0, 0.0, 0.0, 0.0],
        ),
        line("GEORGE", "I will be an architect. Vandelay Industries.", 2, 2, [0.0; 5]),
    ]);
    (episodes, DialogueTable::new(lines))
}
