use tracing::debug;

use windows::Win32::Foundation::{CloseHandle, BOOL, HMODULE, HWND, LPARAM, TRUE};
use windows::Win32::System::ProcessStatus::GetModuleFileNameExW;
use windows::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_INFORMATION, PROCESS_VM_READ};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClassNameW, GetForegroundWindow, GetWindowTextW, GetWindowThreadProcessId,
    IsWindowVisible,
};

use crate::error::DetectError;
use crate::platform::accept;
use crate::player_db::{extract_title, find_by_window, PlayerCategory, PlayerDef};
use crate::{DetectionResult, MediaItem, MediaItemKind, WindowHandle};

struct Scan<'a> {
    players: &'a [PlayerDef],
    validator: &'a dyn Fn(&MediaItem) -> bool,
    results: Vec<DetectionResult>,
}

/// Detect media players via Win32 window enumeration.
pub fn detect_windows(
    players: &[PlayerDef],
    validator: &dyn Fn(&MediaItem) -> bool,
) -> Result<Vec<DetectionResult>, DetectError> {
    let mut scan = Scan {
        players,
        validator,
        results: Vec::new(),
    };

    unsafe {
        EnumWindows(
            Some(enum_window_callback),
            LPARAM(&mut scan as *mut Scan<'_> as isize),
        )
    }
    .map_err(|e| DetectError::Platform(e.to_string()))?;

    Ok(scan.results)
}

/// The window that currently has focus.
pub fn foreground_window() -> Option<WindowHandle> {
    let hwnd = unsafe { GetForegroundWindow() };
    if hwnd.0.is_null() {
        None
    } else {
        Some(handle(hwnd))
    }
}

fn handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(format!("{:?}", hwnd.0))
}

/// Full path of the executable that owns `hwnd`.
unsafe fn process_executable(hwnd: HWND) -> Option<String> {
    let mut pid = 0u32;
    GetWindowThreadProcessId(hwnd, Some(&mut pid));
    if pid == 0 {
        return None;
    }

    let process = OpenProcess(PROCESS_QUERY_INFORMATION | PROCESS_VM_READ, false, pid).ok()?;
    let mut path = [0u16; 1024];
    let len = GetModuleFileNameExW(process, HMODULE::default(), &mut path);
    let _ = CloseHandle(process);

    (len > 0).then(|| String::from_utf16_lossy(&path[..len as usize]))
}

unsafe extern "system" fn enum_window_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let scan = &mut *(lparam.0 as *mut Scan<'_>);

    if !IsWindowVisible(hwnd).as_bool() {
        return TRUE;
    }

    let mut class_name = [0u16; 256];
    let len = GetClassNameW(hwnd, &mut class_name);
    if len == 0 {
        return TRUE;
    }
    let class = String::from_utf16_lossy(&class_name[..len as usize]);

    let executable = process_executable(hwnd);
    let Some(player) = find_by_window(scan.players, &class, executable.as_deref()) else {
        return TRUE;
    };

    let mut title = [0u16; 512];
    let title_len = GetWindowTextW(hwnd, &mut title);
    if title_len <= 0 {
        return TRUE;
    }
    let window_title = String::from_utf16_lossy(&title[..title_len as usize]);

    let media_title = match player.category {
        PlayerCategory::Default if !player.title_patterns.is_empty() => {
            match extract_title(player, &window_title) {
                Some(t) => t,
                // Idle window, nothing loaded.
                None => return TRUE,
            }
        }
        _ => window_title,
    };

    debug!(
        player = %player.name,
        executable = ?executable,
        title = %media_title,
        "Detected Windows player"
    );

    let media = vec![MediaItem::new(MediaItemKind::Title, media_title)];
    if let Some(result) = accept(player, handle(hwnd), media, scan.validator) {
        scan.results.push(result);
    }

    TRUE
}
