use adshade_core::system::{EventCallback, EventKind, SubscriptionId, WindowHandle, WindowSystem};
use adshade_core::Rect;

use windows::Win32::Foundation::{HWND, LPARAM, POINT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::ScreenToClient;
use windows::Win32::UI::WindowsAndMessaging::{
    EnumChildWindows, EnumWindows, GetClientRect, GetParent, GetWindowRect,
    GetWindowTextLengthW, GetWindowTextW, GetWindowThreadProcessId, IsWindow, IsWindowVisible,
    PostMessageW, RealGetWindowClassW, SET_WINDOW_POS_FLAGS, SW_HIDE, SW_SHOWNOACTIVATE,
    SetWindowPos, ShowWindow, WM_CLOSE,
};
use windows::core::BOOL;

use crate::hook;

/// The Win32 window system.
///
/// `HWND` is an opaque handle — a number that identifies a window to
/// the OS. The engine passes handles around as `usize`; this adapter
/// converts at the boundary and queries the OS lazily for metadata.
pub struct Win32WindowSystem;

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Win32WindowSystem {
    fn default() -> Self {
        Self::new()
    }
}

fn hwnd(handle: WindowHandle) -> HWND {
    HWND(handle as *mut _)
}

impl WindowSystem for Win32WindowSystem {
    fn enumerate_top_level(&self) -> Vec<WindowHandle> {
        let mut handles: Vec<WindowHandle> = Vec::new();

        // SAFETY: EnumWindows calls our callback for each top-level
        // window. We pass a pointer to our Vec as LPARAM (user data);
        // the callback casts it back. This is safe because EnumWindows
        // runs synchronously — the Vec outlives the call.
        unsafe {
            let _ = EnumWindows(
                Some(collect_callback),
                LPARAM(&mut handles as *mut _ as isize),
            );
        }

        handles
    }

    fn enumerate_children(&self, parent: WindowHandle) -> Vec<WindowHandle> {
        let mut handles: Vec<WindowHandle> = Vec::new();

        // SAFETY: same user-data scheme as enumerate_top_level.
        // EnumChildWindows walks all descendants, so the result is
        // filtered down to direct children via GetParent.
        unsafe {
            let _ = EnumChildWindows(
                Some(hwnd(parent)),
                Some(collect_callback),
                LPARAM(&mut handles as *mut _ as isize),
            );
        }

        handles.retain(|&h| self.parent(h) == parent);
        handles
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        // SAFETY: IsWindow is a simple query returning a BOOL.
        unsafe { IsWindow(Some(hwnd(handle))).as_bool() }
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        // SAFETY: IsWindowVisible is a simple query returning a BOOL.
        unsafe { IsWindowVisible(hwnd(handle)).as_bool() }
    }

    fn class_name(&self, handle: WindowHandle) -> String {
        // SAFETY: RealGetWindowClassW reads the window class name.
        // 256 is the maximum class name length in Win32.
        unsafe {
            let mut buffer = [0u16; 256];
            let length = RealGetWindowClassW(hwnd(handle), &mut buffer);
            String::from_utf16_lossy(&buffer[..length as usize])
        }
    }

    fn text(&self, handle: WindowHandle) -> String {
        // SAFETY: GetWindowTextLengthW and GetWindowTextW read window
        // text without modifying state.
        unsafe {
            let length = GetWindowTextLengthW(hwnd(handle));
            if length == 0 {
                return String::new();
            }

            // +1 for the null terminator that Windows requires
            let mut buffer = vec![0u16; (length + 1) as usize];
            let copied = GetWindowTextW(hwnd(handle), &mut buffer);
            String::from_utf16_lossy(&buffer[..copied as usize])
        }
    }

    fn owner_pid(&self, handle: WindowHandle) -> u32 {
        let mut pid = 0u32;
        // SAFETY: GetWindowThreadProcessId writes the owning pid into
        // the provided out-pointer.
        unsafe {
            GetWindowThreadProcessId(hwnd(handle), Some(&mut pid));
        }
        pid
    }

    fn parent(&self, handle: WindowHandle) -> WindowHandle {
        // SAFETY: GetParent is a simple query; an error means the
        // window is top-level (or gone), which maps to 0.
        unsafe {
            GetParent(hwnd(handle))
                .map(|h| h.0 as WindowHandle)
                .unwrap_or(0)
        }
    }

    fn rect(&self, handle: WindowHandle) -> Option<Rect> {
        let mut rect = RECT::default();
        // SAFETY: GetWindowRect writes the screen rect into the
        // provided out-pointer.
        unsafe {
            GetWindowRect(hwnd(handle), &mut rect).ok()?;
        }
        Some(Rect::from_edges(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn client_rect(&self, handle: WindowHandle) -> Option<Rect> {
        let mut rect = RECT::default();
        // SAFETY: GetClientRect writes the client rect into the
        // provided out-pointer.
        unsafe {
            GetClientRect(hwnd(handle), &mut rect).ok()?;
        }
        Some(Rect::from_edges(rect.left, rect.top, rect.right, rect.bottom))
    }

    fn screen_to_client(&self, handle: WindowHandle, x: i32, y: i32) -> Option<(i32, i32)> {
        let mut point = POINT { x, y };
        // SAFETY: ScreenToClient converts the point in place.
        let ok = unsafe { ScreenToClient(hwnd(handle), &mut point) }.as_bool();
        ok.then_some((point.x, point.y))
    }

    fn show(&self, handle: WindowHandle, visible: bool) -> bool {
        let cmd = if visible { SW_SHOWNOACTIVATE } else { SW_HIDE };
        // SAFETY: ShowWindow with a valid HWND is safe; the return
        // value only reports the previous visibility state.
        unsafe {
            let _ = ShowWindow(hwnd(handle), cmd);
        }
        true
    }

    fn set_position(
        &self,
        handle: WindowHandle,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        flags: u32,
    ) -> bool {
        // The engine's position flags mirror the SWP_* bits, so they
        // pass straight through.
        // SAFETY: SetWindowPos with a valid HWND is safe.
        unsafe {
            SetWindowPos(
                hwnd(handle),
                None,
                x,
                y,
                width,
                height,
                SET_WINDOW_POS_FLAGS(flags),
            )
            .is_ok()
        }
    }

    fn send_close(&self, handle: WindowHandle) -> bool {
        // PostMessageW instead of SendMessageW: a close request must
        // not block on the target's message loop.
        // SAFETY: posting WM_CLOSE with null parameters is safe.
        unsafe { PostMessageW(Some(hwnd(handle)), WM_CLOSE, WPARAM(0), LPARAM(0)).is_ok() }
    }

    fn subscribe(&self, kinds: &[EventKind], callback: EventCallback) -> Option<SubscriptionId> {
        hook::subscribe(kinds, callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        hook::unsubscribe(id);
    }
}

/// Callback invoked by `EnumWindows`/`EnumChildWindows` for each window.
///
/// Returns `TRUE` to continue enumeration. Win32 can't call Rust
/// closures directly, so the collecting Vec travels through the LPARAM
/// user-data pointer.
unsafe extern "system" fn collect_callback(handle: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam is a pointer to our Vec<WindowHandle>, cast by
    // the enumerating function above.
    let handles = unsafe { &mut *(lparam.0 as *mut Vec<WindowHandle>) };
    handles.push(handle.0 as WindowHandle);
    BOOL(1)
}
