//! The window-system capability the engine is written against.
//!
//! The engine never talks to the OS directly. Everything it needs —
//! enumeration, metadata queries, visibility/position mutation, and
//! lifecycle notifications — goes through the [`WindowSystem`] trait.
//! `adshade-windows` provides the Win32 implementation; tests provide
//! in-memory fakes.

use std::sync::Arc;

use crate::Rect;

/// Opaque OS window identifier.
///
/// Never used alone as identity — handles are recycled by the OS, so
/// any decision that mutates a window re-verifies the full [`Identity`]
/// first.
pub type WindowHandle = usize;

/// A boxed error type for engine operations.
pub type EngineResult<T> = Result<T, Box<dyn std::error::Error>>;

/// The (handle, owning process, class name) triple used to detect
/// handle reuse across process restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub handle: WindowHandle,
    pub pid: u32,
    pub class_name: String,
}

impl Identity {
    /// Captures the identity of a live window, or `None` if it is gone.
    pub fn capture(sys: &dyn WindowSystem, handle: WindowHandle) -> Option<Self> {
        if !sys.is_window(handle) {
            return None;
        }
        Some(Self {
            handle,
            pid: sys.owner_pid(handle),
            class_name: sys.class_name(handle),
        })
    }

    /// Returns whether the live window still matches this identity.
    pub fn still_matches(&self, sys: &dyn WindowSystem) -> bool {
        sys.is_window(self.handle)
            && sys.owner_pid(self.handle) == self.pid
            && sys.class_name(self.handle) == self.class_name
    }
}

/// Window-lifecycle notification kinds the engine subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A window object was created.
    Create,
    /// A window became visible.
    Show,
    /// Sibling z-order changed under a parent.
    Reorder,
    /// A window moved or resized.
    LocationChange,
    /// A window's text changed.
    NameChange,
    /// A window received keyboard focus.
    Focus,
}

impl EventKind {
    /// All kinds the engine cares about, in subscription order.
    pub const ALL: [EventKind; 6] = [
        EventKind::Create,
        EventKind::Show,
        EventKind::Reorder,
        EventKind::LocationChange,
        EventKind::NameChange,
        EventKind::Focus,
    ];

    /// Kinds that fire in storms during drags and layout passes and are
    /// therefore throttled per root window.
    pub fn is_noisy(self) -> bool {
        matches!(
            self,
            EventKind::Reorder | EventKind::LocationChange | EventKind::NameChange
        )
    }
}

/// `set_position` flags, mirroring the Win32 `SWP_*` bits the platform
/// adapter passes straight through.
pub mod pos_flags {
    pub const NO_SIZE: u32 = 0x0001;
    pub const NO_MOVE: u32 = 0x0002;
    pub const NO_ZORDER: u32 = 0x0004;
    pub const NO_ACTIVATE: u32 = 0x0010;
    pub const FRAME_CHANGED: u32 = 0x0020;
}

/// Identifies one active notification subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Callback invoked for each raw lifecycle notification.
///
/// Shared (`Arc`) so the platform adapter can retain it in its
/// subscription registry until `unsubscribe` releases it.
pub type EventCallback = Arc<dyn Fn(EventKind, WindowHandle) + Send + Sync>;

/// Capability wrapper over the OS windowing API.
///
/// All queries are best-effort: a dead handle yields empty strings,
/// zero pid, `None` rects, and `false` from mutations. Implementations
/// must be callable from any thread.
pub trait WindowSystem: Send + Sync {
    fn enumerate_top_level(&self) -> Vec<WindowHandle>;
    fn enumerate_children(&self, parent: WindowHandle) -> Vec<WindowHandle>;

    fn is_window(&self, handle: WindowHandle) -> bool;
    fn is_visible(&self, handle: WindowHandle) -> bool;
    fn class_name(&self, handle: WindowHandle) -> String;
    fn text(&self, handle: WindowHandle) -> String;
    fn owner_pid(&self, handle: WindowHandle) -> u32;
    /// Parent handle, or `0` for a top-level window.
    fn parent(&self, handle: WindowHandle) -> WindowHandle;

    fn rect(&self, handle: WindowHandle) -> Option<Rect>;
    fn client_rect(&self, handle: WindowHandle) -> Option<Rect>;
    /// Converts a screen-space point into `handle`'s client space.
    fn screen_to_client(&self, handle: WindowHandle, x: i32, y: i32) -> Option<(i32, i32)>;

    fn show(&self, handle: WindowHandle, visible: bool) -> bool;
    fn set_position(
        &self,
        handle: WindowHandle,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        flags: u32,
    ) -> bool;
    /// Posts a close request to the window. Does not wait.
    fn send_close(&self, handle: WindowHandle) -> bool;

    /// Subscribes to lifecycle notifications for the given kinds.
    ///
    /// Returns `None` when the platform has no notification support, in
    /// which case the engine runs in polling-only mode.
    fn subscribe(&self, _kinds: &[EventKind], _callback: EventCallback) -> Option<SubscriptionId> {
        None
    }

    /// Releases the subscription and the retained callback.
    fn unsubscribe(&self, _id: SubscriptionId) {}
}
