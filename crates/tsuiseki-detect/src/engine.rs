//! Per-tick player detection.
//!
//! Picks the enabled players, asks the enumerator for candidate windows and
//! accepts the first one whose title resolves. The previously accepted
//! window is tried first while its media is still recognized, so a tracked
//! player isn't replaced by whatever window the enumeration lists first.

use tracing::{debug, warn};

use crate::player_db::{PlayerCategory, PlayerDatabase, PlayerDef};
use crate::resolve::resolve_title;
use crate::stream::WebTitleHeuristics;
use crate::{DetectionResult, MediaEnumerator, MediaItem, WindowHandle};

/// Which player categories take part in detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionFilter {
    /// Detect local media players.
    pub media_players: bool,
    /// Detect streaming media in web browsers.
    pub streaming_media: bool,
}

impl DetectionFilter {
    pub fn allows(&self, category: PlayerCategory) -> bool {
        match category {
            PlayerCategory::Default => self.media_players,
            PlayerCategory::WebBrowser => self.streaming_media,
        }
    }
}

/// Detection state carried from one tick to the next.
#[derive(Debug, Clone, Default)]
pub struct TrackingState {
    /// The most recently accepted detection result.
    pub sticky: Option<DetectionResult>,
    /// What is currently playing.
    pub current_title: String,
    /// Normalized page title of the accepted browser tab.
    pub page_title: String,
    pub player_running: bool,
    /// Set when `current_title` changes; cleared by whoever acts on it.
    pub title_changed: bool,
}

/// Players that are enabled and whose category is switched on.
pub fn enabled_players(db: &PlayerDatabase, filter: DetectionFilter) -> Vec<PlayerDef> {
    db.enabled_players()
        .filter(|p| filter.allows(p.category))
        .cloned()
        .collect()
}

/// Run one detection pass.
///
/// Returns `true` when a player with a resolvable title was found; `state`
/// then holds the accepted result and title. Otherwise the sticky result is
/// cleared. `recognized` tells whether the current title matched a library
/// entry, which enables the sticky window preference and the browser title
/// cache.
pub fn check_running_players(
    state: &mut TrackingState,
    players: &[PlayerDef],
    enumerator: &dyn MediaEnumerator,
    validator: &dyn Fn(&MediaItem) -> bool,
    heuristics: &dyn WebTitleHeuristics,
    recognized: bool,
) -> bool {
    if players.is_empty() {
        state.sticky = None;
        return false;
    }

    let mut results = match enumerator.enumerate(players, validator) {
        Ok(results) => results,
        Err(e) => {
            warn!(error = %e, "Player enumeration failed");
            state.sticky = None;
            return false;
        }
    };

    // Stick with the previously detected window if possible.
    if recognized {
        if let Some(sticky) = &state.sticky {
            if prefer_window(&mut results, &sticky.window) {
                debug!(window = %sticky.window, "Keeping previously detected window");
            }
        }
    }

    for result in results {
        if let Some(title) = resolve_title(&result, state, heuristics, recognized) {
            if state.current_title != title {
                debug!(player = %result.player.name, title = %title, "Title changed");
                state.current_title = title;
                state.title_changed = true;
            }
            state.player_running = true;
            state.sticky = Some(result);
            return true;
        }
    }

    state.sticky = None;
    false
}

/// Move the result living in `window` to the front, keeping the order of the
/// others. Returns whether it was found.
pub fn prefer_window(results: &mut [DetectionResult], window: &WindowHandle) -> bool {
    match results.iter().position(|r| &r.window == window) {
        Some(pos) => {
            results[..=pos].rotate_right(1);
            true
        }
        None => false,
    }
}
