pub mod catalog;
pub mod config;
pub mod context;
pub mod debug_log;
pub mod error;
pub mod models;
pub mod session;

pub use catalog::Catalog;
pub use config::AppConfig;
pub use context::{AnimeLibrary, MediaTimer, Notifier, Recognizer, TrackerContext, TrackerSettings};
pub use debug_log::{EndReason, EventLog, TrackerEvent};
pub use error::CoreError;
pub use models::{AnimeId, EpisodeGuess, LibraryItem, MatchOptions, ParseOptions, WatchEvent};
pub use session::{MediaTracker, SessionState};
