//! Bounded event queue with per-handle coalescing.
//!
//! OS notification storms (drags, layout passes) produce dozens of
//! raw events per window in quick succession. The queue keeps at most
//! one pending unit of work per handle: a repeat notification simply
//! overwrites the pending event kind. Overflow drops the event and
//! counts it — the producer never blocks.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::system::{EventKind, WindowHandle};

/// Counters published into the engine state.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub received: u64,
    pub coalesced: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Inner {
    order: VecDeque<WindowHandle>,
    pending: HashMap<WindowHandle, EventKind>,
    /// Recently processed handles, for coalescing across the
    /// dequeue boundary and for consumer-side dedupe.
    recent: HashMap<WindowHandle, Instant>,
    stats: QueueStats,
}

/// Recent-map size past which a push opportunistically compacts it.
const RECENT_COMPACT_THRESHOLD: usize = 2000;

/// Bounded, condvar-driven queue of coalesced window events.
pub struct CoalescingQueue {
    capacity: usize,
    coalesce_window: Duration,
    retention: Duration,
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl CoalescingQueue {
    pub fn new(capacity: usize, coalesce_window: Duration, dedupe_window: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            coalesce_window,
            retention: coalesce_window.max(dedupe_window) * 4,
            inner: Mutex::new(Inner::default()),
            cv: Condvar::new(),
        }
    }

    /// Enqueues one event. Never blocks.
    ///
    /// A handle already queued has its pending kind overwritten; a
    /// handle processed within the coalesce window is absorbed; a full
    /// queue drops the event. Each outcome bumps its counter.
    pub fn push(&self, handle: WindowHandle, kind: EventKind) {
        if handle == 0 {
            return;
        }
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };

        if inner.pending.contains_key(&handle) {
            inner.pending.insert(handle, kind);
            inner.stats.coalesced += 1;
            return;
        }

        if !self.coalesce_window.is_zero()
            && let Some(&seen) = inner.recent.get(&handle)
            && seen.elapsed() < self.coalesce_window
        {
            inner.stats.coalesced += 1;
            return;
        }

        if inner.order.len() >= self.capacity {
            inner.stats.dropped += 1;
            return;
        }

        inner.order.push_back(handle);
        inner.pending.insert(handle, kind);
        inner.stats.received += 1;
        self.cv.notify_one();
    }

    /// Dequeues the oldest pending event, waiting up to `timeout`.
    pub fn pop(&self, timeout: Duration) -> Option<(WindowHandle, EventKind)> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().ok()?;
        while inner.order.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self.cv.wait_timeout(inner, deadline - now).ok()?;
            inner = guard;
        }
        let handle = inner.order.pop_front()?;
        let kind = inner.pending.remove(&handle)?;
        Some((handle, kind))
    }

    /// Marks a handle as processed, starting its coalesce/dedupe window.
    pub fn mark_processed(&self, handle: WindowHandle) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.recent.insert(handle, Instant::now());
        if inner.recent.len() > RECENT_COMPACT_THRESHOLD {
            let retention = self.retention;
            inner.recent.retain(|_, at| at.elapsed() <= retention);
        }
    }

    /// Returns whether the handle was processed within `window`.
    pub fn processed_within(&self, handle: WindowHandle, window: Duration) -> bool {
        if window.is_zero() {
            return false;
        }
        self.inner
            .lock()
            .ok()
            .and_then(|inner| inner.recent.get(&handle).copied())
            .is_some_and(|at| at.elapsed() < window)
    }

    /// Forgets one handle entirely (dead window).
    pub fn forget(&self, handle: WindowHandle) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.recent.remove(&handle);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|i| i.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> QueueStats {
        self.inner
            .lock()
            .map(|i| i.stats)
            .unwrap_or_default()
    }

    /// Discards all queued work, e.g. on shutdown.
    pub fn drain(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.order.clear();
            inner.pending.clear();
        }
        self.cv.notify_all();
    }

    /// Wakes all blocked consumers so they can observe a stop flag.
    pub fn wake_all(&self) {
        self.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> CoalescingQueue {
        CoalescingQueue::new(
            capacity,
            Duration::from_millis(120),
            Duration::from_millis(500),
        )
    }

    #[test]
    fn rapid_events_for_one_handle_coalesce_to_one_unit() {
        // Arrange / Act — one show plus 50 location changes.
        let q = queue(1000);
        q.push(1001, EventKind::Show);
        for _ in 0..50 {
            q.push(1001, EventKind::LocationChange);
        }

        // Assert — one pending unit, the rest coalesced.
        let stats = q.stats();
        assert_eq!(q.len(), 1);
        assert_eq!(stats.received, 1);
        assert_eq!(stats.coalesced, 50);
        // The pending kind is the most recent one.
        let (handle, kind) = q.pop(Duration::from_millis(10)).unwrap();
        assert_eq!(handle, 1001);
        assert_eq!(kind, EventKind::LocationChange);
    }

    #[test]
    fn overflow_drops_and_counts_without_blocking() {
        let q = queue(1000);
        for handle in 1..=1200 {
            q.push(handle, EventKind::Show);
        }

        let stats = q.stats();
        assert_eq!(q.len(), 1000);
        assert_eq!(stats.received, 1000);
        assert_eq!(stats.dropped, 200);
    }

    #[test]
    fn recently_processed_handle_is_absorbed() {
        let q = queue(1000);
        q.push(7, EventKind::Show);
        q.pop(Duration::from_millis(10)).unwrap();
        q.mark_processed(7);

        q.push(7, EventKind::Show);

        assert_eq!(q.len(), 0);
        assert_eq!(q.stats().coalesced, 1);
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let q = queue(16);
        assert!(q.pop(Duration::from_millis(20)).is_none());
    }

    #[test]
    fn drain_discards_queued_work() {
        let q = queue(16);
        q.push(1, EventKind::Show);
        q.push(2, EventKind::Show);

        q.drain();

        assert!(q.is_empty());
        assert!(q.pop(Duration::from_millis(10)).is_none());
    }

    #[test]
    fn processed_within_respects_window() {
        let q = queue(16);
        q.mark_processed(7);
        assert!(q.processed_within(7, Duration::from_secs(60)));
        assert!(!q.processed_within(7, Duration::ZERO));
        assert!(!q.processed_within(8, Duration::from_secs(60)));
    }
}
