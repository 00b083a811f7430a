pub mod engine;
pub mod error;
pub mod platform;
pub mod player_db;
pub mod resolve;
pub mod stream;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use engine::{check_running_players, enabled_players, DetectionFilter, TrackingState};
pub use error::{DetectError, RegistryError};
pub use platform::SystemEnumerator;
pub use player_db::{PlayerCategory, PlayerDatabase, PlayerDef};
pub use resolve::resolve_title;
pub use stream::{StreamDatabase, StreamDef, WebTitleHeuristics};

/// What kind of information a media item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaItemKind {
    /// Path of the file being played.
    File,
    /// Window or page title.
    Title,
    /// Address of the active browser page.
    Url,
    /// Title of one browser tab.
    Tab,
}

/// A single raw piece of media information reported by a player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub kind: MediaItemKind,
    pub value: String,
}

impl MediaItem {
    pub fn new(kind: MediaItemKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Opaque identifier of the window (or bus endpoint) a player lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindowHandle(pub String);

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One player window found during a detection tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionResult {
    /// The registry definition that matched.
    pub player: PlayerDef,
    /// The window the media was found in.
    pub window: WindowHandle,
    /// Raw media information, in the order the player reported it.
    pub media: Vec<MediaItem>,
}

/// Source of candidate player windows.
///
/// Implementations scan the system for the given players and report every
/// match. Each media item is passed through `validator` and dropped when it
/// returns `false`; results left without media are not reported.
pub trait MediaEnumerator {
    fn enumerate(
        &self,
        players: &[PlayerDef],
        validator: &dyn Fn(&MediaItem) -> bool,
    ) -> Result<Vec<DetectionResult>, DetectError>;

    /// The window currently holding keyboard focus, if the platform knows.
    fn foreground_window(&self) -> Option<WindowHandle> {
        None
    }
}
