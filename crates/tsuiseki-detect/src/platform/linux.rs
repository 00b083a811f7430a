use mpris::PlayerFinder;
use tracing::debug;

use crate::error::DetectError;
use crate::platform::accept;
use crate::player_db::{find_by_mpris, PlayerDef};
use crate::{DetectionResult, MediaItem, MediaItemKind, WindowHandle};

/// Detect media players via MPRIS D-Bus on Linux.
///
/// The bus name stands in for the window handle.
pub fn detect_mpris(
    players: &[PlayerDef],
    validator: &dyn Fn(&MediaItem) -> bool,
) -> Result<Vec<DetectionResult>, DetectError> {
    let finder = PlayerFinder::new()
        .map_err(|e| DetectError::Platform(format!("failed to connect to D-Bus: {e}")))?;

    let found = match finder.find_all() {
        Ok(p) => p,
        Err(e) => {
            debug!("No MPRIS players found: {e}");
            return Ok(vec![]);
        }
    };

    Ok(found
        .into_iter()
        .filter_map(|player| {
            let identity = player.identity().to_string();
            let bus_name = player.bus_name().to_string();
            let def = find_by_mpris(players, &identity)
                .or_else(|| find_by_mpris(players, &bus_name))?;
            let metadata = player.get_metadata().ok()?;

            let mut media = Vec::new();
            if let Some(url) = metadata.url() {
                media.extend(media_from_url(url));
            }
            if let Some(title) = metadata.title().filter(|t| !t.is_empty()) {
                media.push(MediaItem::new(MediaItemKind::Title, title));
            }

            debug!(
                player = %def.name,
                identity = %identity,
                media = ?media,
                "Detected MPRIS player"
            );
            accept(def, WindowHandle(bus_name), media, validator)
        })
        .collect())
}

/// `file://` URLs become decoded file paths, web URLs stay URLs.
fn media_from_url(url: &str) -> Option<MediaItem> {
    if url.starts_with("file://") {
        let path = url::Url::parse(url).ok()?.to_file_path().ok()?;
        Some(MediaItem::new(
            MediaItemKind::File,
            path.to_string_lossy().into_owned(),
        ))
    } else if url.starts_with("http://") || url.starts_with("https://") {
        Some(MediaItem::new(MediaItemKind::Url, url))
    } else {
        None
    }
}
