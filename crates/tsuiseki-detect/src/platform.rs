#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(target_os = "windows")]
pub mod windows;

use crate::error::DetectError;
use crate::player_db::PlayerDef;
use crate::{DetectionResult, MediaEnumerator, MediaItem, WindowHandle};

/// Enumerates player windows with the native mechanism of the platform:
/// MPRIS on Linux, top-level windows on Windows.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnumerator;

impl MediaEnumerator for SystemEnumerator {
    fn enumerate(
        &self,
        players: &[PlayerDef],
        validator: &dyn Fn(&MediaItem) -> bool,
    ) -> Result<Vec<DetectionResult>, DetectError> {
        #[cfg(target_os = "linux")]
        {
            linux::detect_mpris(players, validator)
        }
        #[cfg(target_os = "windows")]
        {
            windows::detect_windows(players, validator)
        }
        #[cfg(not(any(target_os = "linux", target_os = "windows")))]
        {
            let _ = (players, validator);
            Err(DetectError::Unsupported)
        }
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        #[cfg(target_os = "windows")]
        {
            windows::foreground_window()
        }
        #[cfg(not(target_os = "windows"))]
        {
            None
        }
    }
}

/// Build a result from the media that passes `validator`.
/// Returns `None` when nothing is left.
pub(crate) fn accept(
    player: &PlayerDef,
    window: WindowHandle,
    media: Vec<MediaItem>,
    validator: &dyn Fn(&MediaItem) -> bool,
) -> Option<DetectionResult> {
    let media: Vec<MediaItem> = media.into_iter().filter(|m| validator(m)).collect();
    if media.is_empty() {
        return None;
    }
    Some(DetectionResult {
        player: player.clone(),
        window,
        media,
    })
}
