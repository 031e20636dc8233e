//! Delayed, multi-stage resize retries.
//!
//! A single resize right after hiding an ad is frequently overwritten
//! by the host application's own asynchronous layout pass. A fixed
//! decaying retry sequence (0.4s, 0.8s, 1.2s, 1.8s by default)
//! empirically converges. One background worker drains a min-heap of
//! due entries, driven by a condition variable — no busy waiting.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::log_debug;
use crate::system::WindowHandle;

/// Each stage delay is clamped to at least this much.
const MIN_STAGE_DELAY: Duration = Duration::from_millis(50);

/// Upper bound on one condvar wait, so `stop()` is honoured promptly.
const MAX_WAIT_SLICE: Duration = Duration::from_millis(500);

/// Callback invoked for each fired stage.
pub type ResizeCallback = Arc<dyn Fn(WindowHandle) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Entry {
    due: Instant,
    seq: u64,
    handle: WindowHandle,
    /// 1-based stage index; `stage == delays.len()` is the last one.
    stage: usize,
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct State {
    heap: BinaryHeap<Reverse<Entry>>,
    pending: HashSet<WindowHandle>,
    seq: u64,
    active: bool,
}

struct Shared {
    state: Mutex<State>,
    cv: Condvar,
    delays: Vec<Duration>,
    callback: ResizeCallback,
}

/// Single-worker delayed scheduler, deduplicated by handle.
pub struct ResizeScheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ResizeScheduler {
    /// `delays_ms` is the per-stage retry schedule; an empty list
    /// falls back to a single 400ms stage.
    pub fn new(delays_ms: &[u64], callback: ResizeCallback) -> Self {
        let mut delays: Vec<Duration> = delays_ms
            .iter()
            .map(|&ms| Duration::from_millis(ms).max(MIN_STAGE_DELAY))
            .collect();
        if delays.is_empty() {
            delays.push(Duration::from_millis(400));
        }
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                cv: Condvar::new(),
                delays,
                callback,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Starts the worker thread. Idempotent.
    pub fn start(&self) {
        {
            let Ok(mut state) = self.shared.state.lock() else {
                return;
            };
            if state.active {
                return;
            }
            state.active = true;
        }
        let shared = self.shared.clone();
        let worker = thread::Builder::new()
            .name("adshade-resize".into())
            .spawn(move || run(&shared));
        if let (Ok(handle), Ok(mut slot)) = (worker, self.worker.lock()) {
            *slot = Some(handle);
        }
    }

    /// Queues the retry sequence for a handle.
    ///
    /// A handle that is already pending is not queued again; its
    /// in-flight sequence continues unchanged.
    pub fn schedule(&self, handle: WindowHandle) {
        if handle == 0 {
            return;
        }
        let Ok(mut state) = self.shared.state.lock() else {
            return;
        };
        if !state.active || state.pending.contains(&handle) {
            return;
        }
        state.pending.insert(handle);
        state.seq += 1;
        let entry = Entry {
            due: Instant::now() + self.shared.delays[0],
            seq: state.seq,
            handle,
            stage: 1,
        };
        state.heap.push(Reverse(entry));
        self.shared.cv.notify_one();
    }

    /// Number of handles with a retry sequence in flight.
    pub fn pending_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|s| s.pending.len())
            .unwrap_or(0)
    }

    /// Clears all pending entries and joins the worker. An in-flight
    /// callback execution is allowed to finish.
    pub fn stop(&self) {
        {
            let Ok(mut state) = self.shared.state.lock() else {
                return;
            };
            state.active = false;
            state.heap.clear();
            state.pending.clear();
            self.shared.cv.notify_all();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }
}

impl Drop for ResizeScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(shared: &Shared) {
    loop {
        let fired: Entry;
        {
            let Ok(mut state) = shared.state.lock() else {
                return;
            };
            loop {
                if !state.active {
                    return;
                }
                let Some(Reverse(next)) = state.heap.peek().cloned() else {
                    let (guard, _) = match shared.cv.wait_timeout(state, MAX_WAIT_SLICE) {
                        Ok(r) => r,
                        Err(_) => return,
                    };
                    state = guard;
                    continue;
                };
                let now = Instant::now();
                if next.due > now {
                    let wait = (next.due - now).min(MAX_WAIT_SLICE);
                    let (guard, _) = match shared.cv.wait_timeout(state, wait) {
                        Ok(r) => r,
                        Err(_) => return,
                    };
                    state = guard;
                    continue;
                }
                state.heap.pop();
                fired = next;
                break;
            }
        }

        // Callback runs outside the lock.
        (shared.callback)(fired.handle);

        let Ok(mut state) = shared.state.lock() else {
            return;
        };
        if !state.active {
            return;
        }
        if fired.stage < shared.delays.len() {
            state.seq += 1;
            let entry = Entry {
                due: Instant::now() + shared.delays[fired.stage],
                seq: state.seq,
                handle: fired.handle,
                stage: fired.stage + 1,
            };
            state.heap.push(Reverse(entry));
            shared.cv.notify_one();
        } else {
            state.pending.remove(&fired.handle);
            log_debug!("Resize retries finished for {:#x}", fired.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_scheduler(delays_ms: &[u64]) -> (ResizeScheduler, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_inner = count.clone();
        let scheduler = ResizeScheduler::new(
            delays_ms,
            Arc::new(move |_| {
                count_inner.fetch_add(1, Ordering::SeqCst);
            }),
        );
        (scheduler, count)
    }

    #[test]
    fn fires_once_per_stage() {
        let (scheduler, count) = counting_scheduler(&[50, 50]);
        scheduler.start();

        scheduler.schedule(42);
        thread::sleep(Duration::from_millis(400));

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pending_count(), 0);
        scheduler.stop();
    }

    #[test]
    fn duplicate_schedule_is_deduplicated() {
        let (scheduler, count) = counting_scheduler(&[50]);
        scheduler.start();

        scheduler.schedule(42);
        scheduler.schedule(42);
        scheduler.schedule(42);
        thread::sleep(Duration::from_millis(300));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        scheduler.stop();
    }

    #[test]
    fn distinct_handles_fire_independently() {
        let (scheduler, count) = counting_scheduler(&[50]);
        scheduler.start();

        scheduler.schedule(1);
        scheduler.schedule(2);
        thread::sleep(Duration::from_millis(300));

        assert_eq!(count.load(Ordering::SeqCst), 2);
        scheduler.stop();
    }

    #[test]
    fn stop_clears_pending_entries() {
        let (scheduler, count) = counting_scheduler(&[5_000]);
        scheduler.start();

        scheduler.schedule(42);
        scheduler.stop();

        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn schedule_before_start_is_ignored() {
        let (scheduler, count) = counting_scheduler(&[50]);

        scheduler.schedule(42);
        thread::sleep(Duration::from_millis(150));

        assert_eq!(scheduler.pending_count(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
