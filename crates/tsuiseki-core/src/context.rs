//! Capabilities the tracker needs from the surrounding application.
//!
//! Everything a tick touches outside its own state goes through
//! [`TrackerContext`], so the tracker can be driven by tests and by any
//! frontend.

use std::path::{Component, Path, PathBuf};

use tsuiseki_detect::{DetectionFilter, MediaEnumerator, WebTitleHeuristics};

use crate::models::{AnimeId, EpisodeGuess, LibraryItem, MatchOptions, ParseOptions};

/// Title parsing and library matching.
pub trait Recognizer {
    /// Turn a raw title into an episode guess.
    fn parse(&self, title: &str, options: &ParseOptions) -> Option<EpisodeGuess>;

    /// Match a guess against the library. May rewrite the guess (e.g. to a
    /// sequel's episode numbering).
    fn identify(
        &self,
        episode: &mut EpisodeGuess,
        allow_partial: bool,
        options: &MatchOptions,
    ) -> AnimeId;

    fn is_valid_file_extension(&self, extension: &str) -> bool;

    /// Whether a file name or title looks like an episode rather than an
    /// extra (opening, preview, menu, ...).
    fn is_valid_anime_type(&self, name: &str) -> bool;
}

/// The user's anime library.
pub trait AnimeLibrary {
    fn find_item(&self, anime_id: i64) -> Option<LibraryItem>;

    /// Whether `folder` lies inside one of the library `roots`.
    fn is_inside_library_folders(&self, folder: &str, roots: &[PathBuf]) -> bool {
        let folder = comparable(Path::new(folder));
        roots
            .iter()
            .map(|root| comparable(root))
            .any(|root| !root.is_empty() && folder.starts_with(&root))
    }
}

/// User-facing notifications.
pub trait Notifier {
    fn clear_status(&self);
    fn set_now_playing(&self, anime_id: AnimeId);
    fn recognition_failed(&self, title: &str);
    fn registry_error(&self, message: &str, path: &Path);
}

/// The timer that drives detection ticks.
pub trait MediaTimer {
    /// Restart the countdown to the next tick.
    fn reset(&self);
}

/// Flags that steer detection and session handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub recognition_enabled: bool,
    pub detect_media_players: bool,
    pub detect_streaming_media: bool,
    /// Only treat the player as active while it has focus.
    pub check_player: bool,
    /// Update the list when the player closes.
    pub wait_player: bool,
    /// Update the list for files outside the library folders too.
    pub update_out_of_root: bool,
    pub library_folders: Vec<PathBuf>,
}

impl TrackerSettings {
    pub fn detection_filter(&self) -> DetectionFilter {
        DetectionFilter {
            media_players: self.detect_media_players,
            streaming_media: self.detect_streaming_media,
        }
    }
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            recognition_enabled: true,
            detect_media_players: true,
            detect_streaming_media: true,
            check_player: false,
            wait_player: false,
            update_out_of_root: true,
            library_folders: Vec::new(),
        }
    }
}

/// Everything a tick may use besides the tracker's own state.
#[derive(Clone, Copy)]
pub struct TrackerContext<'a> {
    pub settings: &'a TrackerSettings,
    pub enumerator: &'a dyn MediaEnumerator,
    pub heuristics: &'a dyn WebTitleHeuristics,
    pub recognizer: &'a dyn Recognizer,
    pub library: &'a dyn AnimeLibrary,
    pub notifier: &'a dyn Notifier,
    pub timer: &'a dyn MediaTimer,
}

/// Lowercase path components with both separator styles treated alike.
fn comparable(path: &Path) -> Vec<String> {
    let text = path.to_string_lossy().replace('\\', "/");
    Path::new(&text)
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_lowercase()),
            Component::Prefix(p) => Some(p.as_os_str().to_string_lossy().to_lowercase()),
            _ => None,
        })
        .collect()
}
