//! OS window helpers: focusing target windows and hiding the tool's own
//! console while a batch runs.
//!
//! All entry points are best-effort. On non-Windows platforms they log a
//! warning and report `Ok(false)`; a batch never fails because the desktop
//! could not be rearranged.

use anyhow::Result;
use tracing::debug;

/// Attempt to focus a window whose title contains the given substring
/// (case-insensitive).
///
/// Returns:
/// - Ok(true) if a matching window was brought to the foreground.
/// - Ok(false) if no window matched (or on unsupported platforms).
pub fn focus_window(title_contains: &str) -> Result<bool> {
    debug!(target: "pixelbot::window", %title_contains, "focus_window requested");
    imp::focus_window(title_contains)
}

/// Minimize the console window hosting this process, so the tool itself does
/// not sit on top of the UI it is about to drive.
pub fn minimize_own_console() -> Result<bool> {
    debug!(target: "pixelbot::window", "minimize_own_console requested");
    imp::show_own_console(false)
}

/// Restore the console window after a batch run, so the operator can read
/// the final log lines during the exit delay.
pub fn restore_own_console() -> Result<bool> {
    debug!(target: "pixelbot::window", "restore_own_console requested");
    imp::show_own_console(true)
}

#[cfg(windows)]
mod imp {
    use anyhow::Result;
    use tracing::debug;
    use windows::Win32::Foundation::{HWND, LPARAM, TRUE};
    use windows::Win32::System::Console::GetConsoleWindow;
    use windows::Win32::UI::WindowsAndMessaging::{
        EnumWindows, GetWindowTextLengthW, GetWindowTextW, IsIconic, IsWindowVisible,
        SW_MINIMIZE, SW_RESTORE, SetForegroundWindow, ShowWindow,
    };

    /// Read a window title (empty for untitled/system windows).
    fn window_title(hwnd: HWND) -> String {
        let len = unsafe { GetWindowTextLengthW(hwnd) };
        if len <= 0 {
            return String::new();
        }
        let mut buf = vec![0u16; (len + 1) as usize];
        let copied = unsafe { GetWindowTextW(hwnd, &mut buf) };
        if copied <= 0 {
            return String::new();
        }
        String::from_utf16_lossy(&buf[..copied as usize])
    }

    unsafe extern "system" fn enum_callback(
        hwnd: HWND,
        lparam: LPARAM,
    ) -> windows::Win32::Foundation::BOOL {
        let windows_out = unsafe { &mut *(lparam.0 as *mut Vec<HWND>) };
        if unsafe { IsWindowVisible(hwnd) }.as_bool() {
            windows_out.push(hwnd);
        }
        TRUE
    }

    pub fn focus_window(title_contains: &str) -> Result<bool> {
        let needle = title_contains.to_lowercase();
        let mut visible: Vec<HWND> = Vec::new();
        unsafe {
            EnumWindows(
                Some(enum_callback),
                LPARAM(&raw mut visible as isize),
            )?;
        }

        for hwnd in visible {
            let title = window_title(hwnd);
            if title.is_empty() || !title.to_lowercase().contains(&needle) {
                continue;
            }
            unsafe {
                if IsIconic(hwnd).as_bool() {
                    let _ = ShowWindow(hwnd, SW_RESTORE);
                }
                if SetForegroundWindow(hwnd).as_bool() {
                    debug!(target: "pixelbot::window", %title, "focused window");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    pub fn show_own_console(restore: bool) -> Result<bool> {
        let hwnd = unsafe { GetConsoleWindow() };
        if hwnd.is_invalid() {
            // No attached console (e.g., launched from a GUI shell).
            return Ok(false);
        }
        let cmd = if restore { SW_RESTORE } else { SW_MINIMIZE };
        unsafe {
            let _ = ShowWindow(hwnd, cmd);
        }
        Ok(true)
    }
}

#[cfg(not(windows))]
mod imp {
    use anyhow::Result;
    use tracing::warn;

    pub fn focus_window(title_contains: &str) -> Result<bool> {
        warn!(
            target: "pixelbot::window",
            %title_contains,
            "focus_window is not supported on this platform; returning Ok(false)"
        );
        Ok(false)
    }

    pub fn show_own_console(_restore: bool) -> Result<bool> {
        warn!(
            target: "pixelbot::window",
            "console window control is not supported on this platform; returning Ok(false)"
        );
        Ok(false)
    }
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;

    #[test]
    fn window_helpers_are_noops_off_windows() {
        assert!(!focus_window("anything").unwrap());
        assert!(!minimize_own_console().unwrap());
        assert!(!restore_own_console().unwrap());
    }
}
