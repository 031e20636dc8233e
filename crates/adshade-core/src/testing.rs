//! An in-memory [`WindowSystem`] for tests.
//!
//! Models a mutable window tree plus call counters, so tests can
//! assert not only on outcomes but on how many OS mutations were
//! issued (idempotence properties). Windows can be made "stubborn" to
//! simulate a host application that overrides hide requests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::Rect;
use crate::system::{
    EventCallback, EventKind, SubscriptionId, WindowHandle, WindowSystem, pos_flags,
};

#[derive(Debug, Clone)]
struct FakeWindow {
    pid: u32,
    class_name: String,
    text: String,
    rect: Option<Rect>,
    visible: bool,
    parent: WindowHandle,
    /// Ignores `show(false)`, forcing the off-screen fallback.
    stubborn: bool,
}

struct Subscription {
    kinds: Vec<EventKind>,
    callback: EventCallback,
}

/// In-memory window tree implementing the full capability surface.
#[derive(Default)]
pub struct FakeWindowSystem {
    windows: Mutex<BTreeMap<WindowHandle, FakeWindow>>,
    subscriptions: Mutex<BTreeMap<u64, Subscription>>,
    next_subscription: AtomicU64,
    /// When `false`, `subscribe` returns `None` (polling-only mode).
    pub hooks_available: bool,
    pub show_calls: AtomicUsize,
    pub position_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    position_log: Mutex<Vec<(WindowHandle, i32, i32, i32, i32, u32)>>,
}

impl FakeWindowSystem {
    pub fn new() -> Self {
        Self {
            hooks_available: true,
            ..Self::default()
        }
    }

    pub fn without_hooks() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_window(
        &self,
        handle: WindowHandle,
        pid: u32,
        class_name: &str,
        text: &str,
        rect: Option<Rect>,
        visible: bool,
        parent: WindowHandle,
    ) {
        self.windows.lock().unwrap().insert(
            handle,
            FakeWindow {
                pid,
                class_name: class_name.into(),
                text: text.into(),
                rect,
                visible,
                parent,
                stubborn: false,
            },
        );
    }

    pub fn destroy_window(&self, handle: WindowHandle) {
        self.windows.lock().unwrap().remove(&handle);
    }

    pub fn set_visible(&self, handle: WindowHandle, visible: bool) {
        if let Some(w) = self.windows.lock().unwrap().get_mut(&handle) {
            w.visible = visible;
        }
    }

    pub fn set_text(&self, handle: WindowHandle, text: &str) {
        if let Some(w) = self.windows.lock().unwrap().get_mut(&handle) {
            w.text = text.into();
        }
    }

    pub fn set_rect(&self, handle: WindowHandle, rect: Option<Rect>) {
        if let Some(w) = self.windows.lock().unwrap().get_mut(&handle) {
            w.rect = rect;
        }
    }

    /// Re-keys the window to a new process, simulating handle reuse.
    pub fn recycle_handle(&self, handle: WindowHandle, pid: u32, class_name: &str) {
        if let Some(w) = self.windows.lock().unwrap().get_mut(&handle) {
            w.pid = pid;
            w.class_name = class_name.into();
        }
    }

    /// Makes the window ignore hide requests.
    pub fn make_stubborn(&self, handle: WindowHandle) {
        if let Some(w) = self.windows.lock().unwrap().get_mut(&handle) {
            w.stubborn = true;
        }
    }

    /// Delivers one notification to every matching subscription.
    pub fn emit(&self, kind: EventKind, handle: WindowHandle) {
        let callbacks: Vec<EventCallback> = self
            .subscriptions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.kinds.contains(&kind))
            .map(|s| s.callback.clone())
            .collect();
        for cb in callbacks {
            cb(kind, handle);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Every `set_position` call so far, as `(handle, x, y, w, h, flags)`.
    pub fn position_history(&self) -> Vec<(WindowHandle, i32, i32, i32, i32, u32)> {
        self.position_log.lock().unwrap().clone()
    }
}

impl WindowSystem for FakeWindowSystem {
    fn enumerate_top_level(&self) -> Vec<WindowHandle> {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, w)| w.parent == 0)
            .map(|(&h, _)| h)
            .collect()
    }

    fn enumerate_children(&self, parent: WindowHandle) -> Vec<WindowHandle> {
        self.windows
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, w)| w.parent == parent)
            .map(|(&h, _)| h)
            .collect()
    }

    fn is_window(&self, handle: WindowHandle) -> bool {
        self.windows.lock().unwrap().contains_key(&handle)
    }

    fn is_visible(&self, handle: WindowHandle) -> bool {
        self.windows
            .lock()
            .unwrap()
            .get(&handle)
            .is_some_and(|w| w.visible)
    }

    fn class_name(&self, handle: WindowHandle) -> String {
        self.windows
            .lock()
            .unwrap()
            .get(&handle)
            .map(|w| w.class_name.clone())
            .unwrap_or_default()
    }

    fn text(&self, handle: WindowHandle) -> String {
        self.windows
            .lock()
            .unwrap()
            .get(&handle)
            .map(|w| w.text.clone())
            .unwrap_or_default()
    }

    fn owner_pid(&self, handle: WindowHandle) -> u32 {
        self.windows
            .lock()
            .unwrap()
            .get(&handle)
            .map(|w| w.pid)
            .unwrap_or(0)
    }

    fn parent(&self, handle: WindowHandle) -> WindowHandle {
        self.windows
            .lock()
            .unwrap()
            .get(&handle)
            .map(|w| w.parent)
            .unwrap_or(0)
    }

    fn rect(&self, handle: WindowHandle) -> Option<Rect> {
        self.windows.lock().unwrap().get(&handle).and_then(|w| w.rect)
    }

    fn client_rect(&self, handle: WindowHandle) -> Option<Rect> {
        // Client area == window area in the fake; tests that need an
        // offset adjust the window rect instead.
        self.rect(handle).map(|r| Rect::new(0, 0, r.width, r.height))
    }

    fn screen_to_client(&self, handle: WindowHandle, x: i32, y: i32) -> Option<(i32, i32)> {
        self.rect(handle).map(|r| (x - r.x, y - r.y))
    }

    fn show(&self, handle: WindowHandle, visible: bool) -> bool {
        self.show_calls.fetch_add(1, Ordering::SeqCst);
        let mut windows = self.windows.lock().unwrap();
        let Some(w) = windows.get_mut(&handle) else {
            return false;
        };
        if !visible && w.stubborn {
            return true;
        }
        w.visible = visible;
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
        self.position_calls.fetch_add(1, Ordering::SeqCst);
        self.position_log
            .lock()
            .unwrap()
            .push((handle, x, y, width, height, flags));
        let mut windows = self.windows.lock().unwrap();
        let Some(w) = windows.get_mut(&handle) else {
            return false;
        };
        let current = w.rect.unwrap_or(Rect::new(0, 0, 0, 0));
        let (nx, ny) = if flags & pos_flags::NO_MOVE != 0 {
            (current.x, current.y)
        } else {
            (x, y)
        };
        let (nw, nh) = if flags & pos_flags::NO_SIZE != 0 {
            (current.width, current.height)
        } else {
            (width, height)
        };
        w.rect = Some(Rect::new(nx, ny, nw, nh));
        true
    }

    fn send_close(&self, handle: WindowHandle) -> bool {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.windows.lock().unwrap().remove(&handle).is_some()
    }

    fn subscribe(&self, kinds: &[EventKind], callback: EventCallback) -> Option<SubscriptionId> {
        if !self.hooks_available {
            return None;
        }
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        self.subscriptions.lock().unwrap().insert(
            id,
            Subscription {
                kinds: kinds.to_vec(),
                callback,
            },
        );
        Some(SubscriptionId(id))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.lock().unwrap().remove(&id.0);
    }
}
