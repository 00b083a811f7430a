use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the anime the current media was matched to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnimeId {
    /// Nothing recognized yet.
    #[default]
    Unknown,
    /// Parsed, but no library entry matched.
    NotInList,
    /// A library entry.
    Id(i64),
}

impl AnimeId {
    pub fn is_valid(self) -> bool {
        matches!(self, Self::Id(_))
    }

    pub fn id(self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for AnimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            Self::NotInList => f.write_str("not in list"),
            Self::Id(id) => write!(f, "#{id}"),
        }
    }
}

/// Structured guess of what episode a title refers to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeGuess {
    pub anime_id: AnimeId,
    /// Anime title as parsed from the media title.
    pub title: Option<String>,
    pub episode_number: Option<u32>,
    /// File name without the folder, or the whole title for streams.
    pub file_name: String,
    /// Lowercase extension without the dot; empty if there is none.
    pub file_extension: String,
    /// Folder of the file; empty when the title isn't a path.
    pub folder: String,
    /// Whether the list was already updated for this episode.
    pub processed: bool,
}

impl EpisodeGuess {
    /// Point the guess at another anime. Clears `processed`.
    pub fn set(&mut self, anime_id: AnimeId) {
        self.anime_id = anime_id;
        self.processed = false;
    }
}

/// How the recognizer should read a title.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// The title may be a full path; split off the folder.
    pub parse_path: bool,
    /// The title comes from a streaming page rather than a file.
    pub streaming_media: bool,
}

/// Checks the recognizer applies when matching a guess to the library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Redirect episodes past the end of a season to its sequel.
    pub allow_sequels: bool,
    pub check_airing_date: bool,
    pub check_anime_type: bool,
    pub check_episode_number: bool,
}

impl MatchOptions {
    /// Every check enabled; what the tracker always uses.
    pub const STRICT: Self = Self {
        allow_sequels: true,
        check_airing_date: true,
        check_anime_type: true,
        check_episode_number: true,
    };
}

/// A library entry as seen by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: i64,
    pub title: String,
    pub episodes: Option<u32>,
}

/// Watching session side effects produced by a tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WatchEvent {
    StartWatching { anime_id: i64, episode: EpisodeGuess },
    EndWatching { anime_id: i64, episode: EpisodeGuess },
    UpdateList { anime_id: i64, episode: EpisodeGuess },
}

impl WatchEvent {
    pub fn anime_id(&self) -> i64 {
        match self {
            Self::StartWatching { anime_id, .. }
            | Self::EndWatching { anime_id, .. }
            | Self::UpdateList { anime_id, .. } => *anime_id,
        }
    }

    pub fn episode(&self) -> &EpisodeGuess {
        match self {
            Self::StartWatching { episode, .. }
            | Self::EndWatching { episode, .. }
            | Self::UpdateList { episode, .. } => episode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anime_id_validity() {
        assert!(!AnimeId::Unknown.is_valid());
        assert!(!AnimeId::NotInList.is_valid());
        assert!(AnimeId::Id(7).is_valid());
        assert_eq!(AnimeId::Id(7).id(), Some(7));
        assert_eq!(AnimeId::NotInList.id(), None);
    }

    #[test]
    fn test_set_clears_processed() {
        let mut episode = EpisodeGuess {
            anime_id: AnimeId::Id(1),
            episode_number: Some(3),
            processed: true,
            ..Default::default()
        };
        episode.set(AnimeId::Unknown);
        assert_eq!(episode.anime_id, AnimeId::Unknown);
        assert!(!episode.processed);
        assert_eq!(episode.episode_number, Some(3));
    }
}
