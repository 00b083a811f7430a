use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::RegistryError;

/// Embedded player database.
const EMBEDDED_DB: &str = include_str!("../data/players.toml");

/// How a player exposes what it is playing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerCategory {
    /// Local file players; the media item is a path or a window title.
    #[default]
    Default,
    /// Web browsers; media items are the page title, URL and open tabs.
    WebBrowser,
}

/// Definition of a media player and how to detect/identify it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerDef {
    /// Display name (e.g., "mpv", "VLC"). Unique within a database.
    pub name: String,
    #[serde(default)]
    pub category: PlayerCategory,
    /// Whether this player is enabled for detection.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Executable names to match against process names.
    #[serde(default)]
    pub executables: Vec<String>,
    /// MPRIS bus name substrings (Linux D-Bus detection).
    #[serde(default)]
    pub mpris_identities: Vec<String>,
    /// Window class names (Windows detection).
    #[serde(default)]
    pub window_classes: Vec<String>,
    /// Regex patterns to extract the media title from the window title.
    /// The first capture group is used as the title.
    #[serde(default)]
    pub title_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// Database of known media players.
#[derive(Debug, Clone)]
pub struct PlayerDatabase {
    pub players: Vec<PlayerDef>,
}

impl PlayerDatabase {
    /// Create an empty database.
    pub fn new() -> Self {
        Self {
            players: Vec::new(),
        }
    }

    /// Load the embedded player database.
    pub fn embedded() -> Self {
        let mut db = Self::new();
        match parse_records(EMBEDDED_DB, "embedded") {
            Ok(players) => db.extend(players, false),
            Err(e) => error!(error = %e, "Embedded players.toml is invalid"),
        }
        db
    }

    /// Load a player database from TOML string, failing on any bad record.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        #[derive(Deserialize)]
        struct PlayerDbFile {
            #[serde(rename = "player", default)]
            players: Vec<PlayerDef>,
        }

        let db: PlayerDbFile = toml::from_str(toml_str)?;
        Ok(Self {
            players: db.players,
        })
    }

    /// Load the embedded defaults, then merge the user file at `override_path`.
    ///
    /// Only an empty result is an error. Missing, unreadable or malformed
    /// user data is logged and skipped.
    pub fn load(override_path: &Path) -> Result<Self, RegistryError> {
        Self::load_from(EMBEDDED_DB, override_path)
    }

    /// Same as [`PlayerDatabase::load`] with explicit default data.
    pub fn load_from(defaults: &str, override_path: &Path) -> Result<Self, RegistryError> {
        let mut db = Self::new();

        match parse_records(defaults, "embedded") {
            Ok(players) => db.extend(players, false),
            Err(e) => warn!(error = %e, "Failed to parse built-in player data"),
        }

        match read_override(override_path) {
            Ok(Some(content)) => match parse_records(&content, "user") {
                Ok(players) => db.extend(players, true),
                Err(e) => warn!(
                    path = %override_path.display(),
                    error = %e,
                    "Failed to parse user player data"
                ),
            },
            Ok(None) => debug!(path = %override_path.display(), "No user player file"),
            Err(e) => warn!(error = %e, "Failed to read user player data"),
        }

        if db.is_empty() {
            error!(path = %override_path.display(), "Could not read media players data");
            return Err(RegistryError::Empty {
                path: override_path.to_path_buf(),
            });
        }

        Ok(db)
    }

    /// Merge a user database into this one.
    /// Players with matching names are replaced in place; new players are appended.
    pub fn merge_user(&mut self, user_db: &PlayerDatabase) {
        self.extend(user_db.players.iter().cloned(), true);
    }

    fn extend(&mut self, players: impl IntoIterator<Item = PlayerDef>, log: bool) {
        for player in players {
            if let Some(existing) = self.players.iter_mut().find(|p| p.name == player.name) {
                if log {
                    debug!(name = %player.name, "Override");
                }
                *existing = player;
            } else {
                if log {
                    debug!(name = %player.name, "Add");
                }
                self.players.push(player);
            }
        }
    }

    /// Find a player by name.
    pub fn find(&self, name: &str) -> Option<&PlayerDef> {
        self.players.iter().find(|p| p.name == name)
    }

    /// Find a player by MPRIS identity (case-insensitive substring match).
    pub fn find_by_mpris(&self, identity: &str) -> Option<&PlayerDef> {
        find_by_mpris(&self.players, identity)
    }

    /// Find a player by window class and, when known, the owning executable.
    pub fn find_by_window(&self, class: &str, executable: Option<&str>) -> Option<&PlayerDef> {
        find_by_window(&self.players, class, executable)
    }

    /// Get all enabled players.
    pub fn enabled_players(&self) -> impl Iterator<Item = &PlayerDef> {
        self.players.iter().filter(|p| p.enabled)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl Default for PlayerDatabase {
    fn default() -> Self {
        Self::new()
    }
}

/// Find an enabled player by MPRIS identity (case-insensitive substring match).
pub fn find_by_mpris<'a>(players: &'a [PlayerDef], identity: &str) -> Option<&'a PlayerDef> {
    let identity_lower = identity.to_lowercase();
    players.iter().find(|p| {
        p.enabled
            && p.mpris_identities
                .iter()
                .any(|id| identity_lower.contains(&id.to_lowercase()))
    })
}

/// Find an enabled player by window class name (exact match).
///
/// Several players can share a class (every Chromium-based browser uses
/// `Chrome_WidgetWin_1`), so when the window's executable is known only a
/// player listing it, or listing no executables at all, is accepted.
pub fn find_by_window<'a>(
    players: &'a [PlayerDef],
    class: &str,
    executable: Option<&str>,
) -> Option<&'a PlayerDef> {
    let mut candidates = players
        .iter()
        .filter(|p| p.enabled && p.window_classes.iter().any(|wc| wc == class));
    let Some(stem) = executable.map(executable_stem) else {
        return candidates.next();
    };
    candidates.find(|p| {
        p.executables.is_empty() || p.executables.iter().any(|e| executable_stem(e) == stem)
    })
}

/// `C:\Program Files\mpv\mpv.exe` -> `mpv`
fn executable_stem(path: &str) -> String {
    let name = path.rsplit(|c: char| c == '\\' || c == '/').next().unwrap_or(path);
    let name = name.to_lowercase();
    match name.strip_suffix(".exe") {
        Some(stem) => stem.to_string(),
        None => name,
    }
}

/// Extract the media title from a window title using the player's title patterns.
/// Returns `None` if no pattern matches or the player has no patterns.
pub fn extract_title(player: &PlayerDef, window_title: &str) -> Option<String> {
    for pattern_str in &player.title_patterns {
        let re = match regex::Regex::new(pattern_str) {
            Ok(re) => re,
            Err(e) => {
                warn!(
                    player = %player.name,
                    pattern = %pattern_str,
                    error = %e,
                    "Invalid title pattern"
                );
                continue;
            }
        };
        if let Some(m) = re.captures(window_title).and_then(|caps| caps.get(1)) {
            let title = m.as_str().trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
    }
    None
}

fn read_override(path: &Path) -> Result<Option<String>, RegistryError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parse `[[player]]` records one by one, skipping the ones that don't
/// deserialize.
fn parse_records(toml_str: &str, source: &str) -> Result<Vec<PlayerDef>, RegistryError> {
    let table: toml::Table = toml::from_str(toml_str)?;
    let Some(records) = table.get("player").and_then(|v| v.as_array()) else {
        debug!(source, "No player records");
        return Ok(Vec::new());
    };

    let mut players = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match record.clone().try_into::<PlayerDef>() {
            Ok(player) if player.name.trim().is_empty() => {
                warn!(source, index, "Skipping player record without a name");
            }
            Ok(player) => players.push(player),
            Err(e) => warn!(source, index, error = %e, "Skipping malformed player record"),
        }
    }
    Ok(players)
}
