//! Engine lifecycle and published state.
//!
//! The engine owns four cooperating threads: the platform's
//! notification pump (behind [`WindowSystem::subscribe`]), the single
//! event-consumer thread, the polling-fallback thread, and the resize
//! scheduler worker. `stop()` is cooperative: it raises a flag, wakes
//! every waiter, joins the threads, and unconditionally restores every
//! recorded mutation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::cache::IdentityCache;
use crate::config::{Config, Rules};
use crate::graph::DumpNode;
use crate::mutate::MutationEngine;
use crate::queue::CoalescingQueue;
use crate::scan;
use crate::schedule::ResizeScheduler;
use crate::system::{
    EngineResult, EventKind, SubscriptionId, WindowHandle, WindowSystem,
};
use crate::{log_info, log_warn};

/// Engine lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnginePhase {
    Stopped,
    Starting,
    Running,
    Stopping,
}

impl EnginePhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

/// Read-only snapshot of counters and lifecycle, for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct EngineState {
    pub phase: EnginePhase,
    pub enabled: bool,
    pub target_pid: Option<u32>,
    pub events_received: u64,
    pub events_coalesced: u64,
    pub events_dropped: u64,
    pub ads_hidden: u64,
    pub resizes: u64,
    pub closes: u64,
    pub restores: u64,
    pub errors: u64,
    /// Windows currently carrying an undo record (hidden or resized).
    pub tracked_windows: usize,
    pub pending_resizes: usize,
    pub last_tick_unix_ms: u64,
    pub last_error: String,
}

/// Mutable counters, owned by the stats lock.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub ads_hidden: u64,
    pub resizes: u64,
    pub closes: u64,
    pub restores: u64,
    pub errors: u64,
    pub last_tick_unix_ms: u64,
    pub last_error: String,
}

/// Soft cache of the target application's process id.
#[derive(Debug, Default)]
pub(crate) struct PidTracker {
    pub pid: Option<u32>,
    pub last_check: Option<Instant>,
    /// Set when an event arrived while the pid was unknown; forces a
    /// re-resolution ahead of the cooldown.
    pub hint: bool,
}

/// State shared between the engine facade and its worker threads.
///
/// Each mutable collection has exactly one guarding lock, acquired for
/// the shortest practical critical section.
pub(crate) struct Shared {
    pub sys: Arc<dyn WindowSystem>,
    pub config: Config,
    pub rules: Rules,
    pub queue: CoalescingQueue,
    pub cache: IdentityCache,
    pub mutator: Mutex<MutationEngine>,
    pub stats: Mutex<Counters>,
    pub pid: Mutex<PidTracker>,
    pub throttle: Mutex<HashMap<WindowHandle, Instant>>,
    pub observed_log: Mutex<HashMap<WindowHandle, Instant>>,
    pub error_log: Mutex<HashMap<String, Instant>>,
    pub phase: AtomicU8,
    pub stop: AtomicBool,
    pub enabled: AtomicBool,
}

impl Shared {
    pub fn phase(&self) -> EnginePhase {
        EnginePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn set_phase(&self, phase: EnginePhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub fn note_tick(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.last_tick_unix_ms = unix_ms();
        }
    }

    /// Records an error, logging it only after the rate-limit cooldown.
    pub fn set_error(&self, message: &str) {
        let cooldown = Duration::from_secs(self.config.engine.log_rate_limit_secs.max(1));
        let should_log = {
            let mut log = match self.error_log.lock() {
                Ok(l) => l,
                Err(_) => return,
            };
            let now = Instant::now();
            match log.get(message) {
                Some(&last) if now.duration_since(last) < cooldown => false,
                _ => {
                    log.insert(message.to_string(), now);
                    if log.len() > 64 {
                        log.retain(|_, &mut at| at.elapsed() < cooldown * 2);
                    }
                    true
                }
            }
        };
        if should_log {
            log_warn!("{message}");
        }
        if let Ok(mut stats) = self.stats.lock() {
            stats.errors += 1;
            stats.last_error = message.to_string();
            stats.last_tick_unix_ms = unix_ms();
        }
    }
}

pub(crate) fn unix_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// The ad-surface engine facade.
pub struct Engine {
    shared: Arc<Shared>,
    scheduler: Arc<ResizeScheduler>,
    subscription: Option<SubscriptionId>,
    consumer: Option<thread::JoinHandle<()>>,
    poller: Option<thread::JoinHandle<()>>,
}

impl Engine {
    /// Builds an engine over the given window system and configuration.
    ///
    /// Rules are compiled once here; malformed patterns are dropped
    /// with a warning and never match.
    pub fn new(
        sys: Arc<dyn WindowSystem>,
        mut config: Config,
        rules: &crate::config::RuleSet,
    ) -> Self {
        config.validate();
        let enabled = config.engine.enabled;
        let shared = Arc::new(Shared {
            sys: sys.clone(),
            queue: CoalescingQueue::new(
                config.engine.queue_capacity,
                Duration::from_millis(config.engine.event_coalesce_ms),
                Duration::from_millis(config.engine.event_dedupe_ms),
            ),
            cache: IdentityCache::new(Duration::from_millis(config.engine.cache_ttl_ms)),
            mutator: Mutex::new(MutationEngine::new(config.layout.clone())),
            stats: Mutex::new(Counters::default()),
            pid: Mutex::new(PidTracker::default()),
            throttle: Mutex::new(HashMap::new()),
            observed_log: Mutex::new(HashMap::new()),
            error_log: Mutex::new(HashMap::new()),
            phase: AtomicU8::new(EnginePhase::Stopped as u8),
            stop: AtomicBool::new(false),
            enabled: AtomicBool::new(enabled),
            rules: rules.compile(),
            config,
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        let scheduler = Arc::new(ResizeScheduler::new(
            &shared.config.layout.resize_retry_delays_ms,
            Arc::new(move |root| {
                if let Some(shared) = weak.upgrade() {
                    scan::resize_retry(&shared, root);
                }
            }),
        ));

        Self {
            shared,
            scheduler,
            subscription: None,
            consumer: None,
            poller: None,
        }
    }

    /// Starts the notification subscription, the consumer thread, the
    /// polling fallback, and the resize scheduler. Idempotent.
    pub fn start(&mut self) -> EngineResult<()> {
        if self.shared.phase() == EnginePhase::Running {
            return Ok(());
        }
        self.shared.set_phase(EnginePhase::Starting);
        self.shared.stop.store(false, Ordering::Release);

        if self.shared.config.engine.event_hook {
            let weak = Arc::downgrade(&self.shared);
            self.subscription = self.shared.sys.subscribe(
                &EventKind::ALL,
                Arc::new(move |kind, handle| {
                    if let Some(shared) = weak.upgrade() {
                        scan::on_raw_event(&shared, kind, handle);
                    }
                }),
            );
            if self.subscription.is_none() {
                log_info!("Window notifications unavailable; relying on polling");
            }
        }

        if self.subscription.is_none() && !self.shared.config.engine.fallback_polling {
            self.shared.set_phase(EnginePhase::Stopped);
            return Err("no event source: notifications unavailable and polling disabled".into());
        }

        self.scheduler.start();

        {
            let shared = self.shared.clone();
            let scheduler = self.scheduler.clone();
            let spawned = thread::Builder::new()
                .name("adshade-events".into())
                .spawn(move || scan::consumer_loop(&shared, &scheduler));
            match spawned {
                Ok(consumer) => self.consumer = Some(consumer),
                Err(e) => {
                    self.scheduler.stop();
                    self.shared.set_phase(EnginePhase::Stopped);
                    return Err(e.into());
                }
            }
        }

        if self.shared.config.engine.fallback_polling {
            let shared = self.shared.clone();
            let scheduler = self.scheduler.clone();
            if let Ok(poller) = thread::Builder::new()
                .name("adshade-poll".into())
                .spawn(move || scan::poll_loop(&shared, &scheduler))
            {
                self.poller = Some(poller);
            } else {
                log_warn!("Could not start polling thread; notifications only");
            }
        }

        self.shared.set_phase(EnginePhase::Running);
        log_info!("Engine started");
        Ok(())
    }

    /// Stops every thread and restores all recorded mutations.
    pub fn stop(&mut self) {
        if self.shared.phase() != EnginePhase::Running {
            return;
        }
        self.shared.set_phase(EnginePhase::Stopping);
        self.shared.stop.store(true, Ordering::Release);

        if let Some(id) = self.subscription.take() {
            self.shared.sys.unsubscribe(id);
        }

        // Drain stale work and wake the consumer so it sees the flag.
        self.shared.queue.drain();
        self.shared.queue.wake_all();
        if let Some(consumer) = self.consumer.take() {
            let _ = consumer.join();
        }
        if let Some(poller) = self.poller.take() {
            let _ = poller.join();
        }
        self.scheduler.stop();

        let restored = match self.shared.mutator.lock() {
            Ok(mut mutator) => mutator.restore_all(self.shared.sys.as_ref(), "stop"),
            Err(_) => 0,
        };
        if let Ok(mut stats) = self.shared.stats.lock() {
            stats.restores += restored as u64;
        }

        self.shared.set_phase(EnginePhase::Stopped);
        let state = self.state();
        log_info!(
            "Engine stopped: hidden={} resized={} closed={} restored={} coalesced={} dropped={}",
            state.ads_hidden,
            state.resizes,
            state.closes,
            state.restores,
            state.events_coalesced,
            state.events_dropped
        );
    }

    /// Enables or disables mutations. Disabling restores everything the
    /// engine has hidden; observation continues either way.
    pub fn set_enabled(&self, enabled: bool) {
        self.shared.enabled.store(enabled, Ordering::Release);
        if !enabled {
            let restored = match self.shared.mutator.lock() {
                Ok(mut mutator) => mutator.restore_all(self.shared.sys.as_ref(), "disabled"),
                Err(_) => 0,
            };
            if let Ok(mut stats) = self.shared.stats.lock() {
                stats.restores += restored as u64;
            }
            log_info!("Protection disabled; {restored} window(s) restored");
        }
    }

    /// Runs one synchronous classify+mutate pass, bypassing the queue,
    /// the dedupe window, and the per-root throttle.
    pub fn force_scan(&self) {
        scan::resolve_target_pid(&self.shared, true);
        scan::scan_targets(&self.shared, &self.scheduler);
        self.shared.note_tick();
    }

    /// Returns a read-only snapshot of the engine state.
    pub fn state(&self) -> EngineState {
        let queue = self.shared.queue.stats();
        let (ads_hidden, resizes, closes, restores, errors, last_tick, last_error) =
            match self.shared.stats.lock() {
                Ok(s) => (
                    s.ads_hidden,
                    s.resizes,
                    s.closes,
                    s.restores,
                    s.errors,
                    s.last_tick_unix_ms,
                    s.last_error.clone(),
                ),
                Err(_) => (0, 0, 0, 0, 0, 0, String::new()),
            };
        EngineState {
            phase: self.shared.phase(),
            enabled: self.shared.enabled.load(Ordering::Acquire),
            target_pid: self.shared.pid.lock().map(|p| p.pid).unwrap_or(None),
            events_received: queue.received,
            events_coalesced: queue.coalesced,
            events_dropped: queue.dropped,
            ads_hidden,
            resizes,
            closes,
            restores,
            errors,
            tracked_windows: self
                .shared
                .mutator
                .lock()
                .map(|m| m.undo_count())
                .unwrap_or(0),
            pending_resizes: self.scheduler.pending_count(),
            last_tick_unix_ms: last_tick,
            last_error,
        }
    }

    /// Produces the diagnostic window trees of the target application's
    /// top-level windows. The caller decides how to serialize them.
    pub fn dump_trees(&self) -> Vec<DumpNode> {
        scan::dump_target_trees(&self.shared)
    }

    /// Produces the diagnostic tree of one specific root window, or
    /// `None` if the root is not live.
    pub fn dump_tree(&self, root: WindowHandle) -> Option<DumpNode> {
        scan::dump_single(&self.shared, root)
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}
