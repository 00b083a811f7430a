//! Watching session state machine.
//!
//! Each tick detects the running player, resolves its title and decides
//! whether a watching session starts, continues or ends. The session is
//! keyed by the current episode's [`AnimeId`]:
//!
//! - `Unknown`: nothing recognized; a detected title is run through the
//!   recognizer.
//! - `Id`: watching a library entry.
//! - `NotInList`: the title was parsed but matched nothing.
//!
//! A title change under `Id`/`NotInList` closes the old session first; a new
//! one can only start on a later tick.

use std::path::Path;

use tracing::{debug, error, info, warn};
use tsuiseki_detect::{
    check_running_players, enabled_players, MediaItem, MediaItemKind, PlayerCategory,
    PlayerDatabase, PlayerDef, RegistryError, TrackingState,
};

use crate::context::{Recognizer, TrackerContext};
use crate::debug_log::{EndReason, EventLog, TrackerEvent};
use crate::models::{AnimeId, EpisodeGuess, MatchOptions, ParseOptions, WatchEvent};

/// Everything a tick reads and writes.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub tracking: TrackingState,
    pub episode: EpisodeGuess,
}

/// Tracks the running media player and the watching session.
#[derive(Debug, Default)]
pub struct MediaTracker {
    registry: PlayerDatabase,
    state: SessionState,
    log: EventLog,
}

impl MediaTracker {
    /// A tracker with an empty registry; call [`MediaTracker::load_registry`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry(registry: PlayerDatabase) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Load the built-in players merged with the user file at `override_path`.
    ///
    /// Reports an unusable registry through the notifier and returns `false`.
    pub fn load_registry(
        &mut self,
        override_path: &Path,
        notifier: &dyn crate::Notifier,
    ) -> bool {
        self.set_registry(PlayerDatabase::load(override_path), override_path, notifier)
    }

    /// Like [`MediaTracker::load_registry`] with explicit built-in data.
    pub fn load_registry_from(
        &mut self,
        defaults: &str,
        override_path: &Path,
        notifier: &dyn crate::Notifier,
    ) -> bool {
        self.set_registry(
            PlayerDatabase::load_from(defaults, override_path),
            override_path,
            notifier,
        )
    }

    fn set_registry(
        &mut self,
        loaded: Result<PlayerDatabase, RegistryError>,
        override_path: &Path,
        notifier: &dyn crate::Notifier,
    ) -> bool {
        match loaded {
            Ok(db) => {
                info!(players = db.len(), "Loaded media players");
                self.registry = db;
                true
            }
            Err(e) => {
                error!(path = %override_path.display(), error = %e, "No usable media players");
                self.registry = PlayerDatabase::new();
                notifier.registry_error(&e.to_string(), override_path);
                false
            }
        }
    }

    pub fn registry(&self) -> &PlayerDatabase {
        &self.registry
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    /// Whether the tracked player has focus. Always `true` unless the
    /// focus check is switched on.
    ///
    /// Enumerators that cannot query the focused window (MPRIS on Linux)
    /// make this `false` whenever the check is on.
    pub fn is_active_player_foreground(&self, ctx: &TrackerContext<'_>) -> bool {
        if !ctx.settings.check_player {
            return true;
        }
        match (&self.state.tracking.sticky, ctx.enumerator.foreground_window()) {
            (Some(result), Some(foreground)) => result.window == foreground,
            _ => false,
        }
    }

    /// Name of the player of the accepted detection, or "".
    pub fn current_player_name(&self) -> &str {
        self.state
            .tracking
            .sticky
            .as_ref()
            .map(|r| r.player.name.as_str())
            .unwrap_or_default()
    }

    pub fn current_title(&self) -> &str {
        &self.state.tracking.current_title
    }

    pub fn player_running(&self) -> bool {
        self.state.tracking.player_running
    }

    pub fn set_player_running(&mut self, player_running: bool) {
        self.state.tracking.player_running = player_running;
    }

    pub fn title_changed(&self) -> bool {
        self.state.tracking.title_changed
    }

    pub fn set_title_changed(&mut self, title_changed: bool) {
        self.state.tracking.title_changed = title_changed;
    }

    pub fn current_episode(&self) -> &EpisodeGuess {
        &self.state.episode
    }

    /// Record that the list was updated for the current episode.
    pub fn mark_processed(&mut self) {
        self.state.episode.processed = true;
    }

    /// Registry entry of the player of the accepted detection.
    pub fn running_player(&self) -> Option<&PlayerDef> {
        let sticky = self.state.tracking.sticky.as_ref()?;
        self.registry.find(&sticky.player.name)
    }

    /// Detect the running player and resolve its title.
    pub fn check_running_players(&mut self, ctx: &TrackerContext<'_>) -> bool {
        let players = enabled_players(&self.registry, ctx.settings.detection_filter());
        let recognizer = ctx.recognizer;
        let validator = move |item: &MediaItem| verify_media(recognizer, item);

        let detected = check_running_players(
            &mut self.state.tracking,
            &players,
            ctx.enumerator,
            &validator,
            ctx.heuristics,
            self.state.episode.anime_id.is_valid(),
        );

        if detected {
            if let Some(result) = &self.state.tracking.sticky {
                self.log.push(TrackerEvent::PlayerDetected {
                    player_name: result.player.name.clone(),
                    window: result.window.to_string(),
                    title: self.state.tracking.current_title.clone(),
                });
            }
            if self.state.tracking.title_changed {
                self.log.push(TrackerEvent::TitleChanged {
                    title: self.state.tracking.current_title.clone(),
                });
            }
        } else {
            self.log.push(TrackerEvent::NothingDetected);
        }
        detected
    }

    /// Run one full tick: detection, title resolution and the session
    /// transition. Returns the watching side effects to apply.
    #[tracing::instrument(name = "media_tick", skip_all)]
    pub fn on_tick(&mut self, ctx: &TrackerContext<'_>) -> Vec<WatchEvent> {
        self.log.push(TrackerEvent::Tick);
        let player = if self.check_running_players(ctx) {
            self.running_player().cloned()
        } else {
            None
        };
        self.on_tick_detected(player.as_ref(), ctx)
    }

    /// Apply the session transition for a tick that found `player`, or
    /// nothing.
    pub fn on_tick_detected(
        &mut self,
        player: Option<&PlayerDef>,
        ctx: &TrackerContext<'_>,
    ) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        match player {
            Some(player) => self.process_player_title(player, ctx, &mut events),
            None => self.process_player_closed(ctx, &mut events),
        }
        events
    }

    fn process_player_closed(&mut self, ctx: &TrackerContext<'_>, events: &mut Vec<WatchEvent>) {
        let item = self
            .state
            .episode
            .anime_id
            .id()
            .and_then(|id| ctx.library.find_item(id));

        if let Some(item) = item {
            // The player was closed while watching: finish the session.
            info!(anime = %item.title, "Player closed");
            let ended = self.end_session(item.id);
            events.push(WatchEvent::EndWatching {
                anime_id: item.id,
                episode: ended.clone(),
            });
            if ctx.settings.wait_player {
                events.push(WatchEvent::UpdateList {
                    anime_id: item.id,
                    episode: ended,
                });
            }
            self.state.tracking.player_running = false;
            self.log.push(TrackerEvent::SessionEnded {
                anime_id: item.id,
                reason: EndReason::PlayerClosed,
            });
            ctx.timer.reset();
        } else if self.state.tracking.player_running {
            // The player was running, but its media wasn't recognized.
            debug!("Player closed without a recognized title");
            ctx.notifier.clear_status();
            self.state.episode.set(AnimeId::Unknown);
            self.state.tracking.player_running = false;
            ctx.notifier.set_now_playing(AnimeId::Unknown);
            ctx.timer.reset();
        }
    }

    fn process_player_title(
        &mut self,
        player: &PlayerDef,
        ctx: &TrackerContext<'_>,
        events: &mut Vec<WatchEvent>,
    ) {
        match self.state.episode.anime_id {
            AnimeId::Unknown => self.recognize(player, ctx, events),
            _ if self.state.tracking.title_changed => self.end_changed_session(ctx, events),
            _ => {}
        }
    }

    fn recognize(
        &mut self,
        player: &PlayerDef,
        ctx: &TrackerContext<'_>,
        events: &mut Vec<WatchEvent>,
    ) {
        if !ctx.settings.recognition_enabled {
            return;
        }
        self.state.tracking.title_changed = false;

        let title = self.state.tracking.current_title.clone();
        let options = ParseOptions {
            parse_path: true,
            streaming_media: player.category == PlayerCategory::WebBrowser,
        };

        let mut ignore_file = false;
        if let Some(mut episode) = ctx.recognizer.parse(&title, &options) {
            let check_root = !ctx.settings.update_out_of_root
                && !episode.folder.is_empty()
                && !ctx.settings.library_folders.is_empty();
            let inside_library = !check_root
                || ctx
                    .library
                    .is_inside_library_folders(&episode.folder, &ctx.settings.library_folders);

            if inside_library {
                let anime_id = ctx.recognizer.identify(&mut episode, true, &MatchOptions::STRICT);
                if let Some(item) = anime_id.id().and_then(|id| ctx.library.find_item(id)) {
                    info!(
                        anime = %item.title,
                        episode = ?episode.episode_number,
                        player = %player.name,
                        "Recognized"
                    );
                    episode.set(AnimeId::Id(item.id));
                    self.state.episode = episode.clone();
                    self.log.push(TrackerEvent::Recognized {
                        anime_id: item.id,
                        anime_title: item.title,
                        episode: episode.episode_number,
                    });
                    events.push(WatchEvent::StartWatching {
                        anime_id: item.id,
                        episode,
                    });
                    return;
                }

                let name = if episode.file_name.is_empty() {
                    title.as_str()
                } else {
                    episode.file_name.as_str()
                };
                if !ctx.recognizer.is_valid_anime_type(name) {
                    ignore_file = true;
                } else if !episode.file_extension.is_empty()
                    && !ctx.recognizer.is_valid_file_extension(&episode.file_extension)
                {
                    ignore_file = true;
                }
            } else {
                debug!(folder = %episode.folder, "Outside library folders");
                ignore_file = true;
            }
            self.state.episode = episode;
        }

        self.state.episode.set(AnimeId::NotInList);
        if ignore_file {
            debug!(title = %title, "Ignoring media");
        } else {
            warn!(title = %title, "Recognition failed");
            ctx.notifier.recognition_failed(&title);
        }
        self.log.push(TrackerEvent::Unrecognized {
            raw_title: title,
            ignored: ignore_file,
        });
    }

    fn end_changed_session(&mut self, ctx: &TrackerContext<'_>, events: &mut Vec<WatchEvent>) {
        self.state.tracking.title_changed = false;
        ctx.notifier.clear_status();

        let item = self
            .state
            .episode
            .anime_id
            .id()
            .and_then(|id| ctx.library.find_item(id));

        match item {
            Some(item) => {
                info!(
                    anime = %item.title,
                    title = %self.state.tracking.current_title,
                    "Title changed"
                );
                let ended = self.end_session(item.id);
                events.push(WatchEvent::EndWatching {
                    anime_id: item.id,
                    episode: ended.clone(),
                });
                events.push(WatchEvent::UpdateList {
                    anime_id: item.id,
                    episode: ended,
                });
                self.log.push(TrackerEvent::SessionEnded {
                    anime_id: item.id,
                    reason: EndReason::TitleChanged,
                });
            }
            None => {
                self.state.episode.set(AnimeId::Unknown);
                ctx.notifier.set_now_playing(AnimeId::Unknown);
            }
        }
        ctx.timer.reset();
    }

    /// Reset the session to `Unknown`, returning the episode that was being
    /// watched with its `processed` flag intact.
    fn end_session(&mut self, anime_id: i64) -> EpisodeGuess {
        let mut ended = self.state.episode.clone();
        ended.anime_id = AnimeId::Id(anime_id);
        self.state.episode.set(AnimeId::Unknown);
        ended
    }
}

/// Accept a media item only if a file looks like an episode.
fn verify_media(recognizer: &dyn Recognizer, item: &MediaItem) -> bool {
    match item.kind {
        MediaItemKind::File => {
            recognizer.is_valid_file_extension(file_extension(&item.value))
                && recognizer.is_valid_anime_type(&item.value)
        }
        _ => true,
    }
}

fn file_extension(path: &str) -> &str {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    name.rsplit_once('.').map(|(_, ext)| ext).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::path::PathBuf;

    use tsuiseki_detect::{
        DetectError, DetectionResult, MediaEnumerator, StreamDatabase, WindowHandle,
    };

    use super::*;
    use crate::context::{AnimeLibrary, MediaTimer, Notifier, TrackerSettings};
    use crate::models::LibraryItem;

    const PLAYERS: &str = r#"
        [[player]]
        name = "mpv"

        [[player]]
        name = "Firefox"
        category = "web_browser"
    "#;

    const STREAMS: &str = r#"
        [[stream]]
        name = "Site"
        url_patterns = ["site\\.example/watch/"]
        title_pattern = "^(.+?)\\s+-\\s+Site$"
    "#;

    #[derive(Default)]
    struct FakeEnumerator {
        results: RefCell<Option<Vec<DetectionResult>>>,
        foreground: RefCell<Option<WindowHandle>>,
        calls: Cell<usize>,
    }

    impl FakeEnumerator {
        fn show(&self, results: Vec<DetectionResult>) {
            *self.results.borrow_mut() = Some(results);
        }

        fn fail(&self) {
            *self.results.borrow_mut() = None;
        }
    }

    impl MediaEnumerator for FakeEnumerator {
        fn enumerate(
            &self,
            _players: &[PlayerDef],
            validator: &dyn Fn(&MediaItem) -> bool,
        ) -> Result<Vec<DetectionResult>, DetectError> {
            self.calls.set(self.calls.get() + 1);
            let results = self
                .results
                .borrow()
                .clone()
                .ok_or_else(|| DetectError::Platform("enumeration failed".into()))?;
            Ok(results
                .into_iter()
                .map(|mut r| {
                    r.media.retain(|m| validator(m));
                    r
                })
                .filter(|r| !r.media.is_empty())
                .collect())
        }

        fn foreground_window(&self) -> Option<WindowHandle> {
            self.foreground.borrow().clone()
        }
    }

    /// Reads "<folder>/<Title> - <NN>.<ext>" and "<Title> Ep <N>".
    #[derive(Default)]
    struct FakeRecognizer {
        titles: HashMap<&'static str, i64>,
        last_options: Cell<Option<ParseOptions>>,
        identify_calls: Cell<usize>,
    }

    impl Recognizer for FakeRecognizer {
        fn parse(&self, title: &str, options: &ParseOptions) -> Option<EpisodeGuess> {
            self.last_options.set(Some(*options));
            let (folder, file_name) = title.rsplit_once(['/', '\\']).unwrap_or(("", title));
            let (stem, ext) = match file_name.rsplit_once('.') {
                Some((stem, ext)) if !options.streaming_media => (stem, ext),
                _ => (file_name, ""),
            };
            let (name, number) = stem
                .rsplit_once(" - ")
                .or_else(|| stem.rsplit_once(" Ep "))
                .unwrap_or((stem, ""));
            Some(EpisodeGuess {
                title: Some(name.to_string()),
                episode_number: number.parse().ok(),
                file_name: file_name.to_string(),
                file_extension: ext.to_lowercase(),
                folder: folder.to_string(),
                ..Default::default()
            })
        }

        fn identify(&self, episode: &mut EpisodeGuess, _: bool, options: &MatchOptions) -> AnimeId {
            assert_eq!(*options, MatchOptions::STRICT);
            self.identify_calls.set(self.identify_calls.get() + 1);
            match episode.title.as_deref().and_then(|t| self.titles.get(t)) {
                Some(&id) => AnimeId::Id(id),
                None => AnimeId::NotInList,
            }
        }

        fn is_valid_file_extension(&self, extension: &str) -> bool {
            matches!(extension, "mkv" | "mp4")
        }

        fn is_valid_anime_type(&self, name: &str) -> bool {
            !name.contains("NCOP")
        }
    }

    struct FakeLibrary(Vec<LibraryItem>);

    impl AnimeLibrary for FakeLibrary {
        fn find_item(&self, anime_id: i64) -> Option<LibraryItem> {
            self.0.iter().find(|i| i.id == anime_id).cloned()
        }
    }

    #[derive(Debug, Clone, PartialEq)]
    enum Note {
        Clear,
        NowPlaying(AnimeId),
        Failed(String),
        RegistryError(PathBuf),
    }

    #[derive(Default)]
    struct RecordingNotifier(RefCell<Vec<Note>>);

    impl RecordingNotifier {
        fn failures(&self) -> usize {
            self.0
                .borrow()
                .iter()
                .filter(|n| matches!(n, Note::Failed(_)))
                .count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn clear_status(&self) {
            self.0.borrow_mut().push(Note::Clear);
        }

        fn set_now_playing(&self, anime_id: AnimeId) {
            self.0.borrow_mut().push(Note::NowPlaying(anime_id));
        }

        fn recognition_failed(&self, title: &str) {
            self.0.borrow_mut().push(Note::Failed(title.to_string()));
        }

        fn registry_error(&self, _message: &str, path: &Path) {
            self.0.borrow_mut().push(Note::RegistryError(path.to_path_buf()));
        }
    }

    #[derive(Default)]
    struct CountingTimer(Cell<usize>);

    impl MediaTimer for CountingTimer {
        fn reset(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    struct Harness {
        settings: TrackerSettings,
        enumerator: FakeEnumerator,
        heuristics: StreamDatabase,
        recognizer: FakeRecognizer,
        library: FakeLibrary,
        notifier: RecordingNotifier,
        timer: CountingTimer,
    }

    impl Harness {
        fn new() -> Self {
            let mut recognizer = FakeRecognizer::default();
            recognizer.titles.insert("Show", 123);
            recognizer.titles.insert("Other Show", 456);
            Self {
                settings: TrackerSettings::default(),
                enumerator: FakeEnumerator::default(),
                heuristics: StreamDatabase::from_toml(STREAMS).unwrap(),
                recognizer,
                library: FakeLibrary(vec![
                    LibraryItem {
                        id: 123,
                        title: "Show".into(),
                        episodes: Some(12),
                    },
                    LibraryItem {
                        id: 456,
                        title: "Other Show".into(),
                        episodes: Some(24),
                    },
                ]),
                notifier: RecordingNotifier::default(),
                timer: CountingTimer::default(),
            }
        }

        fn ctx(&self) -> TrackerContext<'_> {
            TrackerContext {
                settings: &self.settings,
                enumerator: &self.enumerator,
                heuristics: &self.heuristics,
                recognizer: &self.recognizer,
                library: &self.library,
                notifier: &self.notifier,
                timer: &self.timer,
            }
        }
    }

    fn tracker() -> MediaTracker {
        MediaTracker::with_registry(PlayerDatabase::from_toml(PLAYERS).unwrap())
    }

    fn player(name: &str, category: PlayerCategory) -> PlayerDef {
        PlayerDef {
            name: name.into(),
            category,
            enabled: true,
            executables: vec![],
            mpris_identities: vec![],
            window_classes: vec![],
            title_patterns: vec![],
        }
    }

    fn mpv(window: &str, kind: MediaItemKind, value: &str) -> DetectionResult {
        DetectionResult {
            player: player("mpv", PlayerCategory::Default),
            window: WindowHandle(window.into()),
            media: vec![MediaItem::new(kind, value)],
        }
    }

    fn mpv_file(window: &str, path: &str) -> DetectionResult {
        mpv(window, MediaItemKind::File, path)
    }

    fn start_watching(events: &[WatchEvent]) -> Vec<(i64, Option<u32>)> {
        events
            .iter()
            .filter_map(|e| match e {
                WatchEvent::StartWatching { anime_id, episode } => {
                    Some((*anime_id, episode.episode_number))
                }
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_no_players_enabled() {
        let mut h = Harness::new();
        h.settings.detect_media_players = false;
        h.settings.detect_streaming_media = false;
        h.enumerator.show(vec![mpv_file("w1", r"C:\Anime\Show - 05.mkv")]);
        let mut tracker = tracker();

        for _ in 0..3 {
            assert!(tracker.on_tick(&h.ctx()).is_empty());
            assert_eq!(tracker.current_episode().anime_id, AnimeId::Unknown);
            assert!(!tracker.player_running());
        }
        assert_eq!(h.enumerator.calls.get(), 0);
        assert!(h.notifier.0.borrow().is_empty());
        assert_eq!(h.timer.0.get(), 0);
    }

    #[test]
    fn test_start_watching_fires_once() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", r"C:\Anime\Show - 05.mkv")]);
        let mut tracker = tracker();

        let events = tracker.on_tick(&h.ctx());
        assert_eq!(start_watching(&events), [(123, Some(5))]);
        assert_eq!(events.len(), 1);
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Id(123));
        assert_eq!(tracker.current_player_name(), "mpv");
        assert_eq!(tracker.current_title(), r"C:\Anime\Show - 05.mkv");
        assert_eq!(
            h.recognizer.last_options.get(),
            Some(ParseOptions {
                parse_path: true,
                streaming_media: false
            })
        );

        for _ in 0..3 {
            assert!(tracker.on_tick(&h.ctx()).is_empty());
        }
        assert_eq!(h.recognizer.identify_calls.get(), 1);
    }

    #[test]
    fn test_player_closed_ends_session() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", r"C:\Anime\Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());
        tracker.mark_processed();

        h.enumerator.show(vec![]);
        let events = tracker.on_tick(&h.ctx());

        assert_eq!(events.len(), 1);
        match &events[0] {
            WatchEvent::EndWatching { anime_id, episode } => {
                assert_eq!(*anime_id, 123);
                assert!(episode.processed);
                assert_eq!(episode.episode_number, Some(5));
            }
            other => panic!("Expected EndWatching, got {other:?}"),
        }
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Unknown);
        assert!(!tracker.current_episode().processed);
        assert!(!tracker.player_running());
        assert_eq!(h.timer.0.get(), 1);

        // Nothing left to end.
        assert!(tracker.on_tick(&h.ctx()).is_empty());
        assert_eq!(h.timer.0.get(), 1);
    }

    #[test]
    fn test_player_closed_updates_list_when_waiting() {
        let mut h = Harness::new();
        h.settings.wait_player = true;
        h.enumerator.show(vec![mpv_file("w1", r"C:\Anime\Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());

        h.enumerator.show(vec![]);
        let events = tracker.on_tick(&h.ctx());

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], WatchEvent::EndWatching { anime_id: 123, .. }));
        match &events[1] {
            WatchEvent::UpdateList { anime_id, episode } => {
                assert_eq!(*anime_id, 123);
                assert_eq!(episode.episode_number, Some(5));
                assert!(!episode.processed);
            }
            other => panic!("Expected UpdateList, got {other:?}"),
        }
    }

    #[test]
    fn test_player_closed_keeps_processed_flag() {
        let mut h = Harness::new();
        h.settings.wait_player = true;
        h.enumerator.show(vec![mpv_file("w1", r"C:\Anime\Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());
        tracker.mark_processed();

        h.enumerator.show(vec![]);
        let events = tracker.on_tick(&h.ctx());

        assert_eq!(events.len(), 2);
        match &events[0] {
            WatchEvent::EndWatching { episode, .. } => assert!(episode.processed),
            other => panic!("Expected EndWatching, got {other:?}"),
        }
        match &events[1] {
            WatchEvent::UpdateList { anime_id, episode } => {
                assert_eq!(*anime_id, 123);
                assert!(episode.processed);
            }
            other => panic!("Expected UpdateList, got {other:?}"),
        }
        assert!(!tracker.current_episode().processed);
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Unknown);
    }

    #[test]
    fn test_enumeration_failure_counts_as_closed() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());

        h.enumerator.fail();
        let events = tracker.on_tick(&h.ctx());
        assert!(matches!(events[..], [WatchEvent::EndWatching { anime_id: 123, .. }]));
    }

    #[test]
    fn test_title_change_closes_session_before_new_one() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());
        tracker.mark_processed();

        h.enumerator.show(vec![mpv_file("w1", "/anime/Other Show - 02.mkv")]);
        let events = tracker.on_tick(&h.ctx());
        assert_eq!(events.len(), 2);
        match (&events[0], &events[1]) {
            (
                WatchEvent::EndWatching { anime_id: 123, episode: ended },
                WatchEvent::UpdateList { anime_id: 123, episode: updated },
            ) => {
                assert!(ended.processed);
                assert!(updated.processed);
                assert_eq!(updated.episode_number, Some(5));
            }
            other => panic!("Expected EndWatching + UpdateList, got {other:?}"),
        }
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Unknown);
        assert!(!tracker.title_changed());
        assert!(h.notifier.0.borrow().contains(&Note::Clear));
        assert_eq!(h.timer.0.get(), 1);

        let events = tracker.on_tick(&h.ctx());
        assert_eq!(start_watching(&events), [(456, Some(2))]);
    }

    #[test]
    fn test_title_changed_is_consumed_once() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Show - 05.mkv")]);
        let mut tracker = tracker();

        assert!(tracker.check_running_players(&h.ctx()));
        assert!(tracker.title_changed());
        let player = tracker.running_player().cloned();
        tracker.on_tick_detected(player.as_ref(), &h.ctx());
        assert!(!tracker.title_changed());

        assert!(tracker.check_running_players(&h.ctx()));
        assert!(!tracker.title_changed());
    }

    #[test]
    fn test_unrecognized_title_reported_once() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Unknown Thing - 01.mkv")]);
        let mut tracker = tracker();

        for _ in 0..4 {
            assert!(tracker.on_tick(&h.ctx()).is_empty());
        }
        assert_eq!(tracker.current_episode().anime_id, AnimeId::NotInList);
        assert_eq!(h.notifier.failures(), 1);
        assert_eq!(h.recognizer.identify_calls.get(), 1);
    }

    #[test]
    fn test_extras_are_ignored_silently() {
        let h = Harness::new();
        h.enumerator
            .show(vec![mpv("w1", MediaItemKind::Title, "Unknown Thing - NCOP1")]);
        let mut tracker = tracker();

        tracker.on_tick(&h.ctx());
        assert_eq!(tracker.current_episode().anime_id, AnimeId::NotInList);
        assert_eq!(h.notifier.failures(), 0);
    }

    #[test]
    fn test_disallowed_extension_ignored_silently() {
        let h = Harness::new();
        h.enumerator
            .show(vec![mpv("w1", MediaItemKind::Title, "Unknown Thing - 03.txt")]);
        let mut tracker = tracker();

        tracker.on_tick(&h.ctx());
        assert_eq!(tracker.current_episode().anime_id, AnimeId::NotInList);
        assert_eq!(h.notifier.failures(), 0);
    }

    #[test]
    fn test_invalid_files_never_detected() {
        let h = Harness::new();
        h.enumerator.show(vec![
            mpv_file("w1", "/anime/Show - NCOP1.mkv"),
            mpv_file("w2", "/anime/Show - 05.srt"),
        ]);
        let mut tracker = tracker();

        assert!(tracker.on_tick(&h.ctx()).is_empty());
        assert!(!tracker.player_running());
        assert_eq!(tracker.current_title(), "");
    }

    #[test]
    fn test_outside_library_folders() {
        let mut h = Harness::new();
        h.settings.update_out_of_root = false;
        h.settings.library_folders = vec![PathBuf::from("/library")];
        h.enumerator.show(vec![mpv_file("w1", "/downloads/Show - 05.mkv")]);
        let mut tracker = tracker();

        assert!(tracker.on_tick(&h.ctx()).is_empty());
        assert_eq!(tracker.current_episode().anime_id, AnimeId::NotInList);
        assert_eq!(h.recognizer.identify_calls.get(), 0);
        assert_eq!(h.notifier.failures(), 0);

        let mut tracker = self::tracker();
        h.enumerator.show(vec![mpv_file("w1", "/library/Show/Show - 05.mkv")]);
        assert_eq!(start_watching(&tracker.on_tick(&h.ctx())), [(123, Some(5))]);
    }

    #[test]
    fn test_out_of_root_allowed() {
        let mut h = Harness::new();
        h.settings.library_folders = vec![PathBuf::from("/library")];
        h.enumerator.show(vec![mpv_file("w1", "/downloads/Show - 05.mkv")]);
        let mut tracker = tracker();

        assert_eq!(start_watching(&tracker.on_tick(&h.ctx())), [(123, Some(5))]);
    }

    #[test]
    fn test_recognition_disabled() {
        let mut h = Harness::new();
        h.settings.recognition_enabled = false;
        h.enumerator.show(vec![mpv_file("w1", "/anime/Show - 05.mkv")]);
        let mut tracker = tracker();

        assert!(tracker.on_tick(&h.ctx()).is_empty());
        assert!(tracker.player_running());
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Unknown);
        assert!(h.recognizer.last_options.get().is_none());
    }

    #[test]
    fn test_unrecognized_player_closed() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Unknown Thing - 01.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());

        h.enumerator.show(vec![]);
        assert!(tracker.on_tick(&h.ctx()).is_empty());

        assert!(!tracker.player_running());
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Unknown);
        let notes = h.notifier.0.borrow();
        assert!(notes.ends_with(&[Note::Clear, Note::NowPlaying(AnimeId::Unknown)]));
        assert_eq!(h.timer.0.get(), 1);
    }

    #[test]
    fn test_unrecognized_title_change_allows_retry() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Unknown Thing - 01.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());

        h.enumerator.show(vec![mpv_file("w1", "/anime/Show - 05.mkv")]);
        assert!(tracker.on_tick(&h.ctx()).is_empty());
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Unknown);
        assert!(h
            .notifier
            .0
            .borrow()
            .contains(&Note::NowPlaying(AnimeId::Unknown)));

        assert_eq!(start_watching(&tracker.on_tick(&h.ctx())), [(123, Some(5))]);
    }

    #[test]
    fn test_sticky_window_keeps_session() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w2", "/anime/Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());

        h.enumerator.show(vec![
            mpv_file("w1", "/anime/Other Show - 02.mkv"),
            mpv_file("w2", "/anime/Show - 05.mkv"),
        ]);
        for _ in 0..2 {
            assert!(tracker.on_tick(&h.ctx()).is_empty());
        }
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Id(123));
        assert_eq!(tracker.state().tracking.sticky.as_ref().unwrap().window.0, "w2");
    }

    #[test]
    fn test_browser_resolves_provider_tab() {
        let h = Harness::new();
        let firefox = DetectionResult {
            player: player("Firefox", PlayerCategory::WebBrowser),
            window: WindowHandle("ff".into()),
            media: vec![
                MediaItem::new(MediaItemKind::Tab, "Home - Site"),
                MediaItem::new(MediaItemKind::Tab, "Show Ep 5 - Site"),
                MediaItem::new(MediaItemKind::Title, "Show Ep 5 - Site"),
                MediaItem::new(MediaItemKind::Url, "https://site.example/watch/show-5"),
            ],
        };
        h.enumerator.show(vec![firefox]);
        let mut tracker = tracker();

        let events = tracker.on_tick(&h.ctx());
        assert_eq!(tracker.current_title(), "Show Ep 5");
        assert_eq!(tracker.state().tracking.page_title, "Show Ep 5");
        assert_eq!(start_watching(&events), [(123, Some(5))]);
        assert_eq!(
            h.recognizer.last_options.get(),
            Some(ParseOptions {
                parse_path: true,
                streaming_media: true
            })
        );
    }

    #[test]
    fn test_browser_tab_switch_keeps_session() {
        let h = Harness::new();
        let browser = |title: &str| DetectionResult {
            player: player("Firefox", PlayerCategory::WebBrowser),
            window: WindowHandle("ff".into()),
            media: vec![
                MediaItem::new(MediaItemKind::Tab, "Home - Site"),
                MediaItem::new(MediaItemKind::Tab, "Show Ep 5 - Site"),
                MediaItem::new(MediaItemKind::Title, title),
                MediaItem::new(MediaItemKind::Url, "https://site.example/watch/show-5"),
            ],
        };
        h.enumerator.show(vec![browser("Show Ep 5 - Site")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());

        // Another tab got focus, the tracked one is still open.
        h.enumerator.show(vec![browser("Home - Site")]);
        assert!(tracker.on_tick(&h.ctx()).is_empty());
        assert_eq!(tracker.current_title(), "Show Ep 5");
        assert_eq!(tracker.current_episode().anime_id, AnimeId::Id(123));
    }

    #[test]
    fn test_foreground_check() {
        let mut h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());

        assert!(tracker.is_active_player_foreground(&h.ctx()));

        h.settings.check_player = true;
        assert!(!tracker.is_active_player_foreground(&h.ctx()));
        *h.enumerator.foreground.borrow_mut() = Some(WindowHandle("other".into()));
        assert!(!tracker.is_active_player_foreground(&h.ctx()));
        *h.enumerator.foreground.borrow_mut() = Some(WindowHandle("w1".into()));
        assert!(tracker.is_active_player_foreground(&h.ctx()));
    }

    #[test]
    fn test_load_registry() {
        let h = Harness::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("players.toml");
        let mut tracker = MediaTracker::new();

        assert!(tracker.load_registry(&path, &h.notifier));
        assert!(!tracker.registry().is_empty());

        assert!(!tracker.load_registry_from("", &path, &h.notifier));
        assert!(tracker.registry().is_empty());
        assert_eq!(*h.notifier.0.borrow(), [Note::RegistryError(path)]);
    }

    #[test]
    fn test_event_log_records_session() {
        let h = Harness::new();
        h.enumerator.show(vec![mpv_file("w1", "/anime/Show - 05.mkv")]);
        let mut tracker = tracker();
        tracker.on_tick(&h.ctx());
        h.enumerator.show(vec![]);
        tracker.on_tick(&h.ctx());

        let events: Vec<&TrackerEvent> = tracker.event_log().events().collect();
        assert!(matches!(events[0], TrackerEvent::Tick));
        assert!(matches!(events[1], TrackerEvent::PlayerDetected { .. }));
        assert!(matches!(events[2], TrackerEvent::TitleChanged { .. }));
        assert!(matches!(events[3], TrackerEvent::Recognized { anime_id: 123, .. }));
        assert!(matches!(events[4], TrackerEvent::Tick));
        assert!(matches!(events[5], TrackerEvent::NothingDetected));
        assert!(matches!(
            events[6],
            TrackerEvent::SessionEnded {
                anime_id: 123,
                reason: EndReason::PlayerClosed
            }
        ));
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension(r"C:\Anime\Show - 05.mkv"), "mkv");
        assert_eq!(file_extension("/anime/v1.0/Show"), "");
        assert_eq!(file_extension("Show"), "");
    }
}
