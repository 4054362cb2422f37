//! Episode metadata and dialogue tables.
//!
//! Both tables are handed to the engine by the data loader. They are read from
//! CSV with the column names the loader produces; required columns are checked
//! up front so a malformed export fails loudly instead of defaulting silently.

use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    io::Read,
    ops::Deref,
    path::Path,
    time::Instant,
};

/// Columns the metadata table must carry.
pub const EPISODE_COLUMNS: [&str; 9] = [
    "Season",
    "EpisodeNo",
    "SEID",
    "Title",
    "averageRating",
    "numVotes",
    "Description",
    "Summaries",
    "keyWords",
];

/// Columns the dialogue table must carry.
pub const DIALOGUE_COLUMNS: [&str; 10] = [
    "Character",
    "Dialogue",
    "SEID",
    "Season",
    "EpisodeNo",
    "Happy",
    "Angry",
    "Surprise",
    "Sad",
    "Fear",
];

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{table} table is not tabular: {message}")]
    NotTabular {
        table: &'static str,
        message: String,
    },

    #[error("{table} table is missing required column '{column}'")]
    MissingColumn { table: &'static str, column: String },

    #[error("{table} table row {row}: {message}")]
    InvalidRow {
        table: &'static str,
        row: usize,
        message: String,
    },

    #[error("duplicate episode key {0}")]
    DuplicateKey(EpisodeKey),
}

/// Composite episode identifier, `S<season>E<episode>` zero padded.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeKey(String);

impl EpisodeKey {
    pub fn new(season: u32, episode_no: u32) -> Self {
        EpisodeKey(format!("S{season:02}E{episode_no:02}"))
    }
}

impl Display for EpisodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Deref for EpisodeKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<&str> for EpisodeKey {
    fn from(fr: &str) -> Self {
        EpisodeKey(fr.to_string())
    }
}

impl From<String> for EpisodeKey {
    fn from(fr: String) -> Self {
        EpisodeKey(fr)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Episode {
    pub season: u32,
    pub episode_no: u32,
    pub key: EpisodeKey,
    pub title: String,
    pub rating: f32,
    pub votes: u64,
    pub description: String,
    pub summaries: Vec<String>,
    pub keywords: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_minutes: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub director: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writers: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
}

impl Default for EpisodeKey {
    fn default() -> Self {
        EpisodeKey::new(0, 0)
    }
}

impl Episode {
    /// First user summary, the one the summary feature is built from.
    pub fn first_summary(&self) -> &str {
        self.summaries.first().map(String::as_str).unwrap_or("")
    }

    pub fn keyword_text(&self) -> String {
        self.keywords.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Emotion {
    Happy,
    Angry,
    Surprise,
    Sad,
    Fear,
}

impl Emotion {
    pub const ALL: [Emotion; 5] = [
        Emotion::Happy,
        Emotion::Angry,
        Emotion::Surprise,
        Emotion::Sad,
        Emotion::Fear,
    ];
}

impl Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Emotion::Happy => "Happy",
            Emotion::Angry => "Angry",
            Emotion::Surprise => "Surprise",
            Emotion::Sad => "Sad",
            Emotion::Fear => "Fear",
        };
        write!(f, "{name}")
    }
}

/// Per-line emotion scores. Non-negative, not normalised.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EmotionScores {
    pub happy: f32,
    pub angry: f32,
    pub surprise: f32,
    pub sad: f32,
    pub fear: f32,
}

impl EmotionScores {
    /// Scores in `Emotion::ALL` order.
    pub fn as_array(&self) -> [f32; 5] {
        [self.happy, self.angry, self.surprise, self.sad, self.fear]
    }

    /// Strongest emotion, or `None` when every score is zero.
    ///
    /// Ties go to the emotion listed first in `Emotion::ALL`.
    pub fn dominant(&self) -> Option<Emotion> {
        let scores = self.as_array();
        if scores.iter().all(|s| *s == 0.0) {
            return None;
        }

        let mut best = 0;
        for (idx, score) in scores.iter().enumerate().skip(1) {
            if *score > scores[best] {
                best = idx;
            }
        }
        Some(Emotion::ALL[best])
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DialogueLine {
    /// Speaker label, several speakers may be joined with `&`.
    pub speaker: String,
    pub text: String,
    pub key: EpisodeKey,
    pub season: u32,
    pub episode_no: u32,
    pub emotions: EmotionScores,
    pub word_count: u32,
}

impl DialogueLine {
    /// Individual speakers credited for this line.
    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        crate::speakers::split_speakers(&self.speaker)
    }
}

#[derive(Debug, Deserialize)]
struct EpisodeRecord {
    #[serde(rename = "Season")]
    season: u32,
    #[serde(rename = "EpisodeNo")]
    episode_no: u32,
    #[serde(rename = "SEID")]
    key: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "averageRating")]
    rating: f32,
    #[serde(rename = "numVotes")]
    votes: u64,
    #[serde(rename = "Description", default)]
    description: String,
    #[serde(rename = "Summaries", default)]
    summaries: String,
    #[serde(rename = "keyWords", default)]
    keywords: String,
    #[serde(rename = "runtimeMinutes", default)]
    runtime_minutes: Option<f32>,
    #[serde(rename = "Director", default)]
    director: Option<String>,
    #[serde(rename = "Writers", default)]
    writers: Option<String>,
    #[serde(rename = "AirDate", default)]
    air_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DialogueRecord {
    #[serde(rename = "Character")]
    speaker: String,
    #[serde(rename = "Dialogue", default)]
    text: String,
    #[serde(rename = "SEID")]
    key: String,
    #[serde(rename = "Season")]
    season: u32,
    #[serde(rename = "EpisodeNo")]
    episode_no: u32,
    #[serde(rename = "Happy")]
    happy: f32,
    #[serde(rename = "Angry")]
    angry: f32,
    #[serde(rename = "Surprise")]
    surprise: f32,
    #[serde(rename = "Sad")]
    sad: f32,
    #[serde(rename = "Fear")]
    fear: f32,
    #[serde(rename = "numWords", default)]
    word_count: Option<u32>,
}

/// Episode metadata, one row per episode, in loader order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EpisodeTable {
    rows: Vec<Episode>,
}

impl EpisodeTable {
    /// Build a table, rejecting duplicate episode keys.
    pub fn new(rows: Vec<Episode>) -> Result<Self, DatasetError> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !seen.insert(&row.key) {
                return Err(DatasetError::DuplicateKey(row.key.clone()));
            }
        }
        Ok(Self { rows })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        const TABLE: &str = "metadata";

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_reader(reader);
        check_columns(TABLE, &mut csv_reader, &EPISODE_COLUMNS)?;

        let mut rows = vec![];
        for (idx, record) in csv_reader.deserialize::<EpisodeRecord>().enumerate() {
            let record = record.map_err(|e| not_tabular(TABLE, e))?;
            let summaries = parse_list_cell(&record.summaries).map_err(|message| {
                DatasetError::InvalidRow {
                    table: TABLE,
                    row: idx + 1,
                    message: format!("Summaries: {message}"),
                }
            })?;
            let keywords = parse_list_cell(&record.keywords).map_err(|message| {
                DatasetError::InvalidRow {
                    table: TABLE,
                    row: idx + 1,
                    message: format!("keyWords: {message}"),
                }
            })?;
            if !record.rating.is_finite() {
                return Err(DatasetError::InvalidRow {
                    table: TABLE,
                    row: idx + 1,
                    message: format!("averageRating is not a finite number: {}", record.rating),
                });
            }

            rows.push(Episode {
                season: record.season,
                episode_no: record.episode_no,
                key: EpisodeKey::from(record.key),
                title: record.title,
                rating: record.rating,
                votes: record.votes,
                description: record.description,
                summaries,
                keywords,
                runtime_minutes: record.runtime_minutes,
                director: record.director.filter(|s| !s.is_empty()),
                writers: record.writers.filter(|s| !s.is_empty()),
                air_date: record.air_date.filter(|s| !s.is_empty()),
            });
        }

        log::debug!(
            "took {}ms to read {} episodes",
            now.elapsed().as_micros() as f64 / 1000.0,
            rows.len()
        );

        Self::new(rows)
    }

    pub fn rows(&self) -> &[Episode] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Episode> {
        self.rows.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&Episode> {
        self.rows.get(idx)
    }

    /// Row index of the first episode carrying `title`.
    pub fn position_of_title(&self, title: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.title == title)
    }

    pub fn by_key(&self, key: &EpisodeKey) -> Option<&Episode> {
        self.rows.iter().find(|row| &row.key == key)
    }

    pub fn keys(&self) -> HashSet<&EpisodeKey> {
        self.rows.iter().map(|row| &row.key).collect()
    }

    /// Copy of the rows matching `keep`, order preserved.
    pub fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&Episode) -> bool,
    {
        Self {
            rows: self.rows.iter().filter(|row| keep(row)).cloned().collect(),
        }
    }

    pub fn into_rows(self) -> Vec<Episode> {
        self.rows
    }
}

/// Dialogue lines, in script order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DialogueTable {
    rows: Vec<DialogueLine>,
}

impl DialogueTable {
    pub fn new(rows: Vec<DialogueLine>) -> Self {
        Self { rows }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        const TABLE: &str = "dialogue";

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_reader(reader);
        check_columns(TABLE, &mut csv_reader, &DIALOGUE_COLUMNS)?;

        let mut rows = vec![];
        for (idx, record) in csv_reader.deserialize::<DialogueRecord>().enumerate() {
            let record = record.map_err(|e| not_tabular(TABLE, e))?;
            let emotions = EmotionScores {
                happy: record.happy,
                angry: record.angry,
                surprise: record.surprise,
                sad: record.sad,
                fear: record.fear,
            };
            if emotions.as_array().iter().any(|score| !score.is_finite()) {
                return Err(DatasetError::InvalidRow {
                    table: TABLE,
                    row: idx + 1,
                    message: "emotion scores must be finite numbers".to_string(),
                });
            }
            let word_count = record
                .word_count
                .unwrap_or_else(|| record.text.split_whitespace().count() as u32);

            rows.push(DialogueLine {
                speaker: record.speaker,
                text: record.text,
                key: EpisodeKey::from(record.key),
                season: record.season,
                episode_no: record.episode_no,
                emotions,
                word_count,
            });
        }

        log::debug!(
            "took {}ms to read {} dialogue lines",
            now.elapsed().as_micros() as f64 / 1000.0,
            rows.len()
        );

        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[DialogueLine] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DialogueLine> {
        self.rows.iter()
    }

    /// Line indices per episode key, each list in script order.
    pub fn group_by_episode(&self) -> HashMap<&EpisodeKey, Vec<usize>> {
        let mut groups: HashMap<&EpisodeKey, Vec<usize>> = HashMap::new();
        for (idx, line) in self.rows.iter().enumerate() {
            groups.entry(&line.key).or_default().push(idx);
        }
        groups
    }

    /// Every line of the episodes titled `title`. Empty for unknown titles.
    pub fn lines_for_title<'a>(
        &'a self,
        episodes: &EpisodeTable,
        title: &str,
    ) -> Vec<&'a DialogueLine> {
        let keys: HashSet<&EpisodeKey> = episodes
            .iter()
            .filter(|row| row.title == title)
            .map(|row| &row.key)
            .collect();

        self.rows
            .iter()
            .filter(|line| keys.contains(&line.key))
            .collect()
    }
}

fn not_tabular(table: &'static str, err: csv::Error) -> DatasetError {
    DatasetError::NotTabular {
        table,
        message: err.to_string(),
    }
}

fn check_columns<R: Read>(
    table: &'static str,
    reader: &mut csv::Reader<R>,
    required: &[&str],
) -> Result<(), DatasetError> {
    let headers = reader.headers().map_err(|e| not_tabular(table, e))?;
    for column in required {
        if !headers.iter().any(|h| h.trim() == *column) {
            return Err(DatasetError::MissingColumn {
                table,
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

/// Parse a list-valued cell.
///
/// Accepts a JSON array or a Python list literal (`['a', "b's"]`). Any other
/// non-empty value is taken as a single-item list.
pub fn parse_list_cell(cell: &str) -> Result<Vec<String>, String> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Ok(vec![]);
    }

    if !cell.starts_with('[') {
        return Ok(vec![cell.to_string()]);
    }

    if let Ok(items) = serde_json::from_str::<Vec<String>>(cell) {
        return Ok(items);
    }

    parse_list_literal(cell).ok_or_else(|| format!("malformed list literal: {cell}"))
}

fn parse_list_literal(cell: &str) -> Option<Vec<String>> {
    let inner = cell.strip_prefix('[')?.strip_suffix(']')?;
    let mut chars = inner.chars();
    let mut items = vec![];

    loop {
        let quote = loop {
            match chars.next() {
                None => return Some(items),
                Some(c) if c.is_whitespace() || c == ',' => continue,
                Some(q @ ('\'' | '"')) => break q,
                Some(_) => return None,
            }
        };

        let mut item = String::new();
        loop {
            match chars.next()? {
                '\\' => match chars.next()? {
                    'n' => item.push('\n'),
                    't' => item.push('\t'),
                    other => item.push(other),
                },
                c if c == quote => break,
                c => item.push(c),
            }
        }
        items.push(item);
    }
}
