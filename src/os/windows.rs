use winapi::um::processthreadsapi::GetCurrentProcessId;
use winapi::um::wincon::GetConsoleWindow;
use winapi::um::winuser::{GetWindowThreadProcessId, ShowWindow, SW_HIDE};

/// Hides the console window when the program was launched from explorer.
/// When launched from cmd the console belongs to cmd, not to us, and is
/// left alone so printing still works.
pub fn hide_console_window() {
    unsafe {
        let console_window = GetConsoleWindow();
        if console_window.is_null() {
            return;
        }

        let mut console_window_pid: u32 = 0;
        GetWindowThreadProcessId(console_window, &mut console_window_pid);

        if console_window_pid == GetCurrentProcessId() {
            ShowWindow(console_window, SW_HIDE);
        }
    }
}
