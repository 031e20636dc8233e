//! Memoized per-handle window lookups with handle-reuse defence.
//!
//! Class name, text, and rect queries are comparatively expensive OS
//! round-trips and the event pipeline asks for them in bursts, so they
//! are cached for a short TTL. Handles are recycled by the OS, so a
//! cache hit is only served after the entry's owning PID is re-checked
//! against the live window; a mismatch invalidates the entry.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::Rect;
use crate::system::{WindowHandle, WindowSystem};

/// One cached view of a window's metadata.
#[derive(Debug, Clone)]
pub struct WindowInfo {
    pub pid: u32,
    pub class_name: String,
    pub text: String,
    pub rect: Option<Rect>,
    pub visible: bool,
}

struct Entry {
    at: Instant,
    info: WindowInfo,
}

/// TTL cache keyed by handle, validated against the owning PID.
///
/// Internally locked; the lock is never held across an OS call.
pub struct IdentityCache {
    ttl: Duration,
    entries: Mutex<HashMap<WindowHandle, Entry>>,
}

/// Entry count past which a lookup opportunistically compacts the map.
const COMPACT_THRESHOLD: usize = 4096;

impl IdentityCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the window's metadata, served from cache when fresh.
    ///
    /// `None` means the handle is dead. A fresh entry whose recorded
    /// PID no longer matches the live window is treated as a miss —
    /// that is the handle-reuse guard.
    pub fn lookup(&self, sys: &dyn WindowSystem, handle: WindowHandle) -> Option<WindowInfo> {
        if !sys.is_window(handle) {
            self.invalidate(handle);
            return None;
        }

        let cached = {
            let entries = self.entries.lock().ok()?;
            entries.get(&handle).map(|e| (e.at, e.info.clone()))
        };
        let live_pid = sys.owner_pid(handle);
        if let Some((at, info)) = cached
            && at.elapsed() <= self.ttl
            && info.pid == live_pid
        {
            return Some(info);
        }

        let info = WindowInfo {
            pid: live_pid,
            class_name: sys.class_name(handle),
            text: sys.text(handle),
            rect: sys.rect(handle),
            visible: sys.is_visible(handle),
        };
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                handle,
                Entry {
                    at: Instant::now(),
                    info: info.clone(),
                },
            );
            if entries.len() > COMPACT_THRESHOLD {
                let ttl = self.ttl;
                entries.retain(|_, e| e.at.elapsed() <= ttl * 3);
            }
        }
        Some(info)
    }

    /// Drops the entry for one handle.
    pub fn invalidate(&self, handle: WindowHandle) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(&handle);
        }
    }

    /// Drops expired entries and entries whose window died.
    ///
    /// Handles are collected under the lock but liveness checks run
    /// outside it.
    pub fn evict_stale(&self, sys: &dyn WindowSystem) {
        let candidates: Vec<WindowHandle> = match self.entries.lock() {
            Ok(entries) => entries.keys().copied().collect(),
            Err(_) => return,
        };
        let dead: Vec<WindowHandle> = candidates
            .into_iter()
            .filter(|&h| !sys.is_window(h))
            .collect();
        if let Ok(mut entries) = self.entries.lock() {
            let ttl = self.ttl;
            entries.retain(|h, e| !dead.contains(h) && e.at.elapsed() <= ttl);
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal fake that counts class-name fetches.
    struct CountingSystem {
        pid: AtomicUsize,
        class_calls: AtomicUsize,
    }

    impl CountingSystem {
        fn new(pid: u32) -> Self {
            Self {
                pid: AtomicUsize::new(pid as usize),
                class_calls: AtomicUsize::new(0),
            }
        }
    }

    impl WindowSystem for CountingSystem {
        fn enumerate_top_level(&self) -> Vec<WindowHandle> {
            Vec::new()
        }
        fn enumerate_children(&self, _parent: WindowHandle) -> Vec<WindowHandle> {
            Vec::new()
        }
        fn is_window(&self, _handle: WindowHandle) -> bool {
            true
        }
        fn is_visible(&self, _handle: WindowHandle) -> bool {
            true
        }
        fn class_name(&self, _handle: WindowHandle) -> String {
            self.class_calls.fetch_add(1, Ordering::SeqCst);
            "EVA_Window".into()
        }
        fn text(&self, _handle: WindowHandle) -> String {
            String::new()
        }
        fn owner_pid(&self, _handle: WindowHandle) -> u32 {
            self.pid.load(Ordering::SeqCst) as u32
        }
        fn parent(&self, _handle: WindowHandle) -> WindowHandle {
            0
        }
        fn rect(&self, _handle: WindowHandle) -> Option<Rect> {
            None
        }
        fn client_rect(&self, _handle: WindowHandle) -> Option<Rect> {
            None
        }
        fn screen_to_client(&self, _: WindowHandle, x: i32, y: i32) -> Option<(i32, i32)> {
            Some((x, y))
        }
        fn show(&self, _: WindowHandle, _: bool) -> bool {
            true
        }
        fn set_position(&self, _: WindowHandle, _: i32, _: i32, _: i32, _: i32, _: u32) -> bool {
            true
        }
        fn send_close(&self, _: WindowHandle) -> bool {
            true
        }
    }

    #[test]
    fn fresh_entry_is_served_without_refetch() {
        let sys = CountingSystem::new(100);
        let cache = IdentityCache::new(Duration::from_secs(60));

        cache.lookup(&sys, 42).unwrap();
        cache.lookup(&sys, 42).unwrap();

        assert_eq!(sys.class_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn pid_change_invalidates_recycled_handle() {
        // Arrange — handle 42 cached under pid 100.
        let sys = CountingSystem::new(100);
        let cache = IdentityCache::new(Duration::from_secs(60));
        cache.lookup(&sys, 42).unwrap();

        // Act — the OS recycles the handle for a new process.
        sys.pid.store(200, Ordering::SeqCst);
        let info = cache.lookup(&sys, 42).unwrap();

        // Assert — the entry was refetched under the new pid.
        assert_eq!(info.pid, 200);
        assert_eq!(sys.class_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn expired_entry_is_refetched() {
        let sys = CountingSystem::new(100);
        let cache = IdentityCache::new(Duration::from_millis(0));

        cache.lookup(&sys, 42).unwrap();
        cache.lookup(&sys, 42).unwrap();

        assert_eq!(sys.class_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn evict_stale_drops_expired_entries() {
        let sys = CountingSystem::new(100);
        let cache = IdentityCache::new(Duration::from_millis(0));
        cache.lookup(&sys, 1).unwrap();
        cache.lookup(&sys, 2).unwrap();

        cache.evict_stale(&sys);

        assert_eq!(cache.len(), 0);
    }
}
