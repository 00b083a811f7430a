use tracing::debug;

use crate::engine::TrackingState;
use crate::player_db::PlayerCategory;
use crate::stream::WebTitleHeuristics;
use crate::{DetectionResult, MediaItem, MediaItemKind};

/// Extracts "what is playing" from the media a player reported.
pub trait TitleResolver {
    fn resolve(
        &self,
        media: &[MediaItem],
        state: &mut TrackingState,
        recognized: bool,
    ) -> Option<String>;
}

/// Local file players: the file path, or failing that the first item.
pub struct DefaultPlayerResolver;

/// Web browsers: the page title, accepted only on streaming provider pages.
pub struct WebBrowserResolver<'a> {
    pub heuristics: &'a dyn WebTitleHeuristics,
}

/// Resolve the title of a detection result with the resolver for its
/// player category.
pub fn resolve_title(
    result: &DetectionResult,
    state: &mut TrackingState,
    heuristics: &dyn WebTitleHeuristics,
    recognized: bool,
) -> Option<String> {
    match result.player.category {
        PlayerCategory::Default => DefaultPlayerResolver.resolve(&result.media, state, recognized),
        PlayerCategory::WebBrowser => {
            WebBrowserResolver { heuristics }.resolve(&result.media, state, recognized)
        }
    }
}

impl TitleResolver for DefaultPlayerResolver {
    fn resolve(&self, media: &[MediaItem], _: &mut TrackingState, _: bool) -> Option<String> {
        let item = media
            .iter()
            .find(|m| m.kind == MediaItemKind::File)
            .or_else(|| media.first())?;

        let value = match item.kind {
            // Long path prefix, e.g. "\\?\C:\Anime\..."
            MediaItemKind::File => item.value.trim_start_matches(['\\', '?']),
            _ => item.value.as_str(),
        };
        Some(value.to_string())
    }
}

impl TitleResolver for WebBrowserResolver<'_> {
    fn resolve(
        &self,
        media: &[MediaItem],
        state: &mut TrackingState,
        recognized: bool,
    ) -> Option<String> {
        let mut page_title = String::new();
        let mut url = String::new();
        let mut tabs = Vec::new();

        for item in media {
            match item.kind {
                MediaItemKind::Tab => tabs.push(item.value.clone()),
                MediaItemKind::Title => page_title = item.value.clone(),
                MediaItemKind::Url => url = item.value.clone(),
                MediaItemKind::File => {}
            }
        }

        self.heuristics.normalize_title(&url, &mut page_title);
        for tab in &mut tabs {
            self.heuristics.normalize_title(&url, tab);
        }

        // The tracked tab is still open: keep the title we already have.
        if recognized && !state.page_title.is_empty() {
            let cached = state.page_title.as_str();
            if page_title == cached || tabs.iter().any(|t| t == cached) {
                debug!(page_title = %cached, "Tracked tab still open");
                return Some(state.current_title.clone());
            }
        }

        let mut title = page_title.clone();
        if self.heuristics.match_provider(&url, &mut title) {
            state.page_title = page_title;
            Some(title)
        } else {
            state.page_title.clear();
            None
        }
    }
}
