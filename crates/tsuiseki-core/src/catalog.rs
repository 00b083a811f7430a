//! A small local anime catalog that can stand in for a full recognition
//! engine.
//!
//! Entries are read from TOML:
//!
//! ```toml
//! [[anime]]
//! id = 1
//! title = "Sousou no Frieren"
//! synonyms = ["Frieren"]
//! episodes = 28
//! kind = "tv"
//! year = 2023
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use chrono::Datelike;
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_normalization::UnicodeNormalization;

use crate::context::{AnimeLibrary, Recognizer};
use crate::error::CoreError;
use crate::models::{AnimeId, EpisodeGuess, LibraryItem, MatchOptions, ParseOptions};

/// Minimum fuzzy score (0.0–1.0) to consider a match valid.
const FUZZY_THRESHOLD: f64 = 0.6;

/// Extensions of files that can hold an episode.
const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "ogm", "wmv", "webm", "flv", "m4v", "ts", "rmvb",
];

/// Tokens marking a file as something other than an episode.
const EXTRA_TOKENS: &[&str] = &[
    "NCOP", "NCED", "OP", "ED", "PV", "CM", "PREVIEW", "TRAILER", "MENU", "SAMPLE",
];

static RE_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").unwrap());

static RE_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^(.+?)\s*",
        r"(?:-\s*(?:ep(?:isode)?\.?\s*)?|\b(?:s\d{1,2}\s*)?e(?:p(?:isode)?)?\.?\s*|#)",
        r"(\d{1,4})(?:v\d)?\b",
    ))
    .unwrap()
});

static RE_TRAILING_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+(\d{1,4})$").unwrap());

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimeKind {
    #[default]
    Tv,
    Ova,
    Ona,
    Movie,
    Special,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub synonyms: Vec<String>,
    pub episodes: Option<u32>,
    #[serde(default)]
    pub kind: AnimeKind,
    /// Year the first episode aired.
    pub year: Option<i32>,
    /// Entry that continues the episode numbering past `episodes`.
    pub sequel: Option<i64>,
}

impl CatalogEntry {
    fn titles(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.title.as_str()).chain(self.synonyms.iter().map(String::as_str))
    }
}

/// Anime catalog indexed by normalized title.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_title: HashMap<String, i64>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        let mut by_title = HashMap::new();
        for entry in &entries {
            for title in entry.titles() {
                by_title.entry(normalize(title)).or_insert(entry.id);
            }
        }
        Self { entries, by_title }
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, CoreError> {
        #[derive(Deserialize)]
        struct CatalogFile {
            #[serde(rename = "anime", default)]
            entries: Vec<CatalogEntry>,
        }

        let file: CatalogFile =
            toml::from_str(toml_str).map_err(|e| CoreError::Catalog(e.to_string()))?;
        Ok(Self::new(file.entries))
    }

    /// Load a catalog file. A missing file gives an empty catalog.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No catalog file");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get(&self, id: i64) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact normalized lookup, then the best fuzzy match if allowed.
    fn lookup(&self, title: &str, allow_partial: bool) -> Option<&CatalogEntry> {
        let query = normalize(title);
        if query.is_empty() {
            return None;
        }
        if let Some(&id) = self.by_title.get(&query) {
            return self.get(id);
        }
        if !allow_partial {
            return None;
        }

        let matcher = SkimMatcherV2::default();
        let max_possible = matcher.fuzzy_match(&query, &query).unwrap_or(1).max(1);
        let (entry, score) = self
            .entries
            .iter()
            .filter_map(|entry| {
                entry
                    .titles()
                    .filter_map(|t| matcher.fuzzy_match(&normalize(t), &query))
                    .max()
                    .map(|score| (entry, score))
            })
            .max_by_key(|(_, score)| *score)?;

        let confidence = score as f64 / max_possible as f64;
        debug!(query = %query, anime = %entry.title, confidence, "Fuzzy match");
        (confidence >= FUZZY_THRESHOLD).then_some(entry)
    }
}

impl Recognizer for Catalog {
    fn parse(&self, title: &str, options: &ParseOptions) -> Option<EpisodeGuess> {
        parse_title(title, options)
    }

    fn identify(
        &self,
        episode: &mut EpisodeGuess,
        allow_partial: bool,
        options: &MatchOptions,
    ) -> AnimeId {
        let Some(mut entry) = episode
            .title
            .as_deref()
            .and_then(|t| self.lookup(t, allow_partial))
        else {
            return AnimeId::NotInList;
        };

        if let Some(mut number) = episode.episode_number {
            if options.allow_sequels {
                while let (Some(total), Some(sequel)) = (entry.episodes, entry.sequel) {
                    if number <= total || total == 0 {
                        break;
                    }
                    let Some(next) = self.get(sequel) else { break };
                    number -= total;
                    entry = next;
                }
                episode.episode_number = Some(number);
            }
            if options.check_episode_number && entry.episodes.is_some_and(|total| number > total) {
                debug!(anime = %entry.title, number, "Episode number out of range");
                return AnimeId::NotInList;
            }
            if options.check_anime_type && entry.kind == AnimeKind::Movie && number > 1 {
                return AnimeId::NotInList;
            }
        }

        if options.check_airing_date
            && entry
                .year
                .is_some_and(|year| year > chrono::Local::now().year())
        {
            debug!(anime = %entry.title, "Not aired yet");
            return AnimeId::NotInList;
        }

        episode.anime_id = AnimeId::Id(entry.id);
        AnimeId::Id(entry.id)
    }

    fn is_valid_file_extension(&self, extension: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&extension.to_lowercase().as_str())
    }

    fn is_valid_anime_type(&self, name: &str) -> bool {
        !name
            .split(|c: char| !c.is_alphanumeric())
            .map(|token| token.trim_end_matches(|c: char| c.is_ascii_digit()).to_uppercase())
            .any(|token| EXTRA_TOKENS.contains(&token.as_str()))
    }
}

impl AnimeLibrary for Catalog {
    fn find_item(&self, anime_id: i64) -> Option<LibraryItem> {
        self.get(anime_id).map(|e| LibraryItem {
            id: e.id,
            title: e.title.clone(),
            episodes: e.episodes,
        })
    }
}

/// Split a media title into folder, file name, extension, anime title and
/// episode number.
pub fn parse_title(title: &str, options: &ParseOptions) -> Option<EpisodeGuess> {
    let title = title.trim();
    if title.is_empty() {
        return None;
    }

    let (folder, file_name) = if options.parse_path && !options.streaming_media {
        title.rsplit_once(['/', '\\']).unwrap_or(("", title))
    } else {
        ("", title)
    };

    let (stem, extension) = match file_name.rsplit_once('.') {
        Some((stem, ext))
            if !options.streaming_media
                && (1..=4).contains(&ext.len())
                && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            (stem, ext.to_lowercase())
        }
        _ => (file_name, String::new()),
    };

    let mut cleaned = RE_BRACKETS.replace_all(stem, " ").into_owned();
    if !cleaned.contains(' ') || cleaned.contains('_') {
        cleaned = cleaned.replace(['_', '.'], " ");
    }
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");

    let (name, episode_number) = match RE_EPISODE
        .captures(&cleaned)
        .or_else(|| RE_TRAILING_NUMBER.captures(&cleaned))
    {
        Some(caps) => (
            caps.get(1).map_or("", |m| m.as_str()).to_string(),
            caps.get(2).and_then(|m| m.as_str().parse().ok()),
        ),
        None => (cleaned.clone(), None),
    };
    let name = name.trim_end_matches([' ', '-']).trim();
    if name.is_empty() {
        return None;
    }

    Some(EpisodeGuess {
        title: Some(name.to_string()),
        episode_number,
        file_name: file_name.to_string(),
        file_extension: extension,
        folder: folder.to_string(),
        ..Default::default()
    })
}

/// NFKC, lowercase, no punctuation, single spaces.
fn normalize(s: &str) -> String {
    s.nfkc()
        .collect::<String>()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
