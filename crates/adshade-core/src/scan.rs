//! Event dispatch and the classify+mutate pass.
//!
//! Raw notifications are filtered and coalesced on the producer side
//! (`on_raw_event`), then a single consumer resolves the owning root
//! window, snapshots its subtree, classifies every node, and applies
//! mutations. The polling loop funnels into the same pass, so the two
//! event sources can never disagree about behaviour.

use std::time::{Duration, Instant};

use crate::engine::Shared;
use crate::graph::{self, DumpNode};
use crate::schedule::ResizeScheduler;
use crate::score;
use crate::system::{EventKind, WindowHandle};
use crate::{log_debug, log_info};

/// Parent-walk depth when resolving the owning root of an event.
const ANCESTOR_WALK_LIMIT: usize = 6;

/// Hard cap when ascending to a top-level ancestor.
const TOP_LEVEL_WALK_LIMIT: usize = 16;

/// Base throttle for noisy event kinds, per root window.
const ROOT_THROTTLE_BASE: Duration = Duration::from_millis(200);

/// Throttle ceiling under queue backpressure.
const ROOT_THROTTLE_MAX: Duration = Duration::from_millis(1000);

/// Cooldown between observed-candidate log batches, per root.
const OBSERVED_LOG_COOLDOWN: Duration = Duration::from_secs(10);

/// Depth used for diagnostic tree dumps.
const DUMP_DEPTH: u32 = 6;

/// Producer-side filter invoked by the notification subscription.
///
/// Must stay cheap: it runs on the platform's pump thread. Events from
/// foreign processes are discarded as early as possible; everything
/// else lands in the coalescing queue.
pub(crate) fn on_raw_event(shared: &Shared, kind: EventKind, handle: WindowHandle) {
    if shared.stop.load(std::sync::atomic::Ordering::Acquire) {
        return;
    }
    if handle == 0 || !shared.sys.is_window(handle) {
        return;
    }

    match current_pid(shared) {
        Some(pid) => {
            if shared.sys.owner_pid(handle) != pid {
                return;
            }
        }
        None => {
            // Unknown target: try a rate-limited re-resolution, and
            // fall back to a class check so unrelated windows don't
            // flood the queue.
            match resolve_target_pid(shared, false) {
                Some(pid) => {
                    if shared.sys.owner_pid(handle) != pid {
                        return;
                    }
                }
                None => {
                    if !shared.rules.is_target_class(&shared.sys.class_name(handle)) {
                        return;
                    }
                }
            }
        }
    }

    shared.queue.push(handle, kind);
}

/// The single consumer thread body.
pub(crate) fn consumer_loop(shared: &Shared, scheduler: &ResizeScheduler) {
    while !shared.stop.load(std::sync::atomic::Ordering::Acquire) {
        let Some((handle, kind)) = shared.queue.pop(Duration::from_millis(500)) else {
            continue;
        };
        process_event(shared, scheduler, handle, kind);
    }
}

/// The polling-fallback thread body.
///
/// Runs the same classify+mutate pass on an adaptive interval: short
/// while the target process is known, long while waiting for it.
pub(crate) fn poll_loop(shared: &Shared, scheduler: &ResizeScheduler) {
    while !shared.stop.load(std::sync::atomic::Ordering::Acquire) {
        let pid = resolve_target_pid(shared, false);
        if pid.is_some() {
            scan_targets(shared, scheduler);
            shared.cache.evict_stale(shared.sys.as_ref());
            if let Ok(mut mutator) = shared.mutator.lock() {
                mutator.evict_dead(shared.sys.as_ref());
            }
        }
        shared.note_tick();

        let interval = Duration::from_millis(if pid.is_some() {
            shared.config.engine.poll_interval_active_ms
        } else {
            shared.config.engine.poll_interval_idle_ms
        });
        sleep_cooperatively(shared, interval);
    }
}

fn sleep_cooperatively(shared: &Shared, total: Duration) {
    let slice = Duration::from_millis(100);
    let deadline = Instant::now() + total;
    while Instant::now() < deadline {
        if shared.stop.load(std::sync::atomic::Ordering::Acquire) {
            return;
        }
        std::thread::sleep(slice.min(deadline - Instant::now()));
    }
}

/// Handles one dequeued event: re-verify, resolve the owning root,
/// classify, mutate.
pub(crate) fn process_event(
    shared: &Shared,
    scheduler: &ResizeScheduler,
    handle: WindowHandle,
    kind: EventKind,
) {
    let sys = shared.sys.as_ref();
    if !sys.is_window(handle) {
        // Stale handle: drop it from every cache, mutate nothing.
        shared.cache.invalidate(handle);
        shared.queue.forget(handle);
        if let Ok(mut mutator) = shared.mutator.lock() {
            mutator.forget(handle);
        }
        return;
    }

    let dedupe = Duration::from_millis(shared.config.engine.event_dedupe_ms);
    if shared.queue.processed_within(handle, dedupe) {
        return;
    }
    shared.queue.mark_processed(handle);

    let Some(info) = shared.cache.lookup(sys, handle) else {
        return;
    };

    // An event deep inside the tree is handled at its owning root.
    let mut current = handle;
    for _ in 0..ANCESTOR_WALK_LIMIT {
        let parent = sys.parent(current);
        if parent == 0 || !sys.is_window(parent) {
            break;
        }
        current = parent;
        if shared.rules.is_target_class(&sys.class_name(current)) {
            if kind.is_noisy() && !throttle_permits(shared, current) {
                return;
            }
            process_root(shared, scheduler, current);
            shared.note_tick();
            return;
        }
    }

    if shared.rules.is_target_class(&info.class_name) {
        if kind.is_noisy() && !throttle_permits(shared, handle) {
            return;
        }
        process_root(shared, scheduler, handle);
    } else if shared.rules.is_ad_window(&info.text, &info.class_name) {
        hide_one(shared, handle, &info.text, "pattern");
    } else if current_pid(shared) == Some(info.pid) {
        // Target process, unrecognised class: rescan from its root.
        let root = top_level_ancestor(shared, handle);
        process_root(shared, scheduler, root);
    }
    shared.note_tick();
}

fn top_level_ancestor(shared: &Shared, handle: WindowHandle) -> WindowHandle {
    let sys = shared.sys.as_ref();
    let mut current = handle;
    for _ in 0..TOP_LEVEL_WALK_LIMIT {
        let parent = sys.parent(current);
        if parent == 0 || !sys.is_window(parent) {
            return current;
        }
        current = parent;
    }
    current
}

/// Per-root throttle for noisy event kinds, widening under queue
/// backpressure so drag storms don't trigger snapshot storms.
fn throttle_permits(shared: &Shared, root: WindowHandle) -> bool {
    let backlog = shared.queue.len();
    let interval = if backlog <= 50 {
        ROOT_THROTTLE_BASE
    } else {
        let factor = (backlog as f64 / 400.0).min(3.0);
        ROOT_THROTTLE_BASE.mul_f64(1.0 + factor).min(ROOT_THROTTLE_MAX)
    };

    let Ok(mut throttle) = shared.throttle.lock() else {
        return true;
    };
    let now = Instant::now();
    if let Some(&last) = throttle.get(&root)
        && now.duration_since(last) < interval
    {
        return false;
    }
    throttle.insert(root, now);
    if throttle.len() > 256 {
        throttle.retain(|_, &mut at| at.elapsed() < ROOT_THROTTLE_MAX * 4);
    }
    true
}

/// One classify+mutate pass over a root window's subtree.
pub(crate) fn process_root(shared: &Shared, scheduler: &ResizeScheduler, root: WindowHandle) {
    if !shared.enabled.load(std::sync::atomic::Ordering::Acquire) {
        return;
    }
    let sys = shared.sys.as_ref();
    if root == 0 || !sys.is_window(root) {
        return;
    }
    // Never touch windows outside the target process once it is known.
    if let Some(pid) = current_pid(shared)
        && sys.owner_pid(root) != pid
    {
        return;
    }

    let snapshot = graph::snapshot(sys, &shared.cache, root, shared.config.engine.snapshot_depth);
    if snapshot.is_empty() {
        return;
    }

    let mut ads_found = false;

    // 1) High-confidence exact patterns across the entire subtree.
    for (&handle, node) in &snapshot {
        if handle == root {
            continue;
        }
        if shared.rules.is_ad_window(&node.text, &node.class_name)
            && hide_one(shared, handle, &node.text, "pattern")
        {
            ads_found = true;
        }
    }

    // 2) Score-based banner detection (geometry + naming signals).
    if shared.config.banner.enabled {
        let scan = score::detect_banners(&snapshot, root, &shared.rules, &shared.config.banner);
        for candidate in &scan.to_hide {
            let label = format!("{} (score={})", candidate.label, candidate.score);
            if hide_one(shared, candidate.handle, &label, "score") {
                ads_found = true;
            }
        }
        log_observed(shared, root, &scan.observed);
    }

    // 3) Empty container shells left behind by dismissed ad slots.
    let closed = match shared.mutator.lock() {
        Ok(mutator) => mutator.close_empty_shells(sys, &snapshot, root, &shared.rules),
        Err(_) => 0,
    };
    if closed > 0
        && let Ok(mut stats) = shared.stats.lock()
    {
        stats.closes += closed as u64;
    }

    // 4) Grow content views into the reclaimed space.
    if let Some(root_rect) = snapshot.get(&root).and_then(|n| n.rect) {
        let mut resized = 0u64;
        if let Ok(mut mutator) = shared.mutator.lock() {
            for (&handle, node) in &snapshot {
                if handle == root {
                    continue;
                }
                if shared.rules.is_resize_target(&node.text, &node.class_name)
                    && mutator.apply_view_resize(sys, handle, &node.text, &root_rect, &shared.rules)
                {
                    resized += 1;
                }
            }
        }
        if resized > 0
            && let Ok(mut stats) = shared.stats.lock()
        {
            stats.resizes += resized;
        }
    }

    // The host's layout pass may undo the first resize; retry later.
    if ads_found {
        scheduler.schedule(root);
    }
}

/// Hides one window and counts it. Returns whether it was hidden now.
fn hide_one(shared: &Shared, handle: WindowHandle, label: &str, reason: &str) -> bool {
    if !shared.enabled.load(std::sync::atomic::Ordering::Acquire) {
        return false;
    }
    let hidden = match shared.mutator.lock() {
        Ok(mut mutator) => mutator.hide(shared.sys.as_ref(), handle),
        Err(_) => false,
    };
    if hidden {
        if let Ok(mut stats) = shared.stats.lock() {
            stats.ads_hidden += 1;
        }
        let label: String = label.chars().take(60).collect();
        log_info!("Hidden ad ({reason}): {label}");
    } else if shared.sys.is_window(handle) && shared.sys.is_visible(handle) {
        // Live, visible, and both hide techniques failed.
        shared.set_error(&format!("failed to hide window {handle:#x}"));
    }
    hidden
}

/// Rate-limited diagnostics for near-threshold candidates, to help
/// weight tuning without log flooding.
fn log_observed(shared: &Shared, root: WindowHandle, observed: &[score::Candidate]) {
    if observed.is_empty() {
        return;
    }
    let Ok(mut log) = shared.observed_log.lock() else {
        return;
    };
    let now = Instant::now();
    if let Some(&last) = log.get(&root)
        && now.duration_since(last) < OBSERVED_LOG_COOLDOWN
    {
        return;
    }
    log.insert(root, now);
    drop(log);
    for candidate in observed.iter().take(5) {
        let label: String = candidate.label.chars().take(60).collect();
        log_debug!(
            "Observed banner candidate: score={} hwnd={:#x} label={label}",
            candidate.score,
            candidate.handle
        );
    }
}

/// Scheduler callback: re-apply content-view resizes for one root.
pub(crate) fn resize_retry(shared: &Shared, root: WindowHandle) {
    if shared.stop.load(std::sync::atomic::Ordering::Acquire)
        || !shared.enabled.load(std::sync::atomic::Ordering::Acquire)
    {
        return;
    }
    let sys = shared.sys.as_ref();
    if !sys.is_window(root) {
        return;
    }

    let snapshot = graph::snapshot(sys, &shared.cache, root, shared.config.engine.snapshot_depth);
    let mut resized = 0u64;
    if let Ok(mut mutator) = shared.mutator.lock() {
        for (&handle, node) in &snapshot {
            if handle == root {
                continue;
            }
            if shared.rules.is_resize_target(&node.text, &node.class_name)
                && mutator.resize_to_fill(sys, handle, root)
            {
                resized += 1;
            }
        }
    }
    if resized > 0
        && let Ok(mut stats) = shared.stats.lock()
    {
        stats.resizes += resized;
    }
}

/// Runs the full pass over every target root window.
pub(crate) fn scan_targets(shared: &Shared, scheduler: &ResizeScheduler) {
    let sys = shared.sys.as_ref();
    let pid = current_pid(shared);
    for root in sys.enumerate_top_level() {
        let owned = match pid {
            Some(pid) => sys.owner_pid(root) == pid,
            None => false,
        };
        let target_class = shared.rules.is_target_class(&sys.class_name(root));
        if (owned && target_class)
            || (pid.is_none() && shared.rules.is_main_window(&sys.class_name(root), &sys.text(root)))
        {
            process_root(shared, scheduler, root);
        }
    }
}

/// Returns the cached target pid without touching the cooldown.
pub(crate) fn current_pid(shared: &Shared) -> Option<u32> {
    shared.pid.lock().map(|p| p.pid).unwrap_or(None)
}

/// Re-resolves the target application's pid, respecting the cooldown
/// unless forced. The result is a soft cache: mutation paths still
/// re-verify liveness immediately before acting.
pub(crate) fn resolve_target_pid(shared: &Shared, force: bool) -> Option<u32> {
    {
        let Ok(mut tracker) = shared.pid.lock() else {
            return None;
        };
        let interval = Duration::from_millis(if tracker.pid.is_some() {
            shared.config.engine.pid_check_active_ms
        } else {
            shared.config.engine.pid_check_idle_ms
        });
        let due = force
            || tracker.hint
            || tracker.last_check.is_none_or(|at| at.elapsed() >= interval);
        if !due {
            return tracker.pid;
        }
        tracker.hint = false;
        tracker.last_check = Some(Instant::now());
    }

    // The window walk happens outside the tracker lock.
    let sys = shared.sys.as_ref();
    let mut fallback = None;
    let mut found = None;
    for handle in sys.enumerate_top_level() {
        let class = sys.class_name(handle);
        if !shared.rules.is_target_class(&class) {
            continue;
        }
        let pid = sys.owner_pid(handle);
        if pid == 0 {
            continue;
        }
        if shared.rules.is_main_window(&class, &sys.text(handle)) {
            found = Some(pid);
            break;
        }
        fallback.get_or_insert(pid);
    }
    let resolved = found.or(fallback);

    if let Ok(mut tracker) = shared.pid.lock() {
        if tracker.pid != resolved {
            match resolved {
                Some(pid) => log_info!("Target process resolved: pid {pid}"),
                None => log_info!("Target process gone"),
            }
        }
        tracker.pid = resolved;
    }
    resolved
}

/// Builds the diagnostic tree for one root window.
pub(crate) fn dump_single(shared: &Shared, root: WindowHandle) -> Option<DumpNode> {
    let snapshot = graph::snapshot(shared.sys.as_ref(), &shared.cache, root, DUMP_DEPTH);
    graph::dump_tree(&snapshot, root)
}

/// Builds diagnostic trees for every top-level window of the target
/// process (or of target-class windows while the pid is unknown).
pub(crate) fn dump_target_trees(shared: &Shared) -> Vec<DumpNode> {
    resolve_target_pid(shared, true);
    let sys = shared.sys.as_ref();
    let pid = current_pid(shared);
    let mut trees = Vec::new();
    for root in sys.enumerate_top_level() {
        let include = match pid {
            Some(pid) => sys.owner_pid(root) == pid,
            None => shared.rules.is_target_class(&sys.class_name(root)),
        };
        if !include {
            continue;
        }
        let snapshot = graph::snapshot(sys, &shared.cache, root, DUMP_DEPTH);
        if let Some(tree) = graph::dump_tree(&snapshot, root) {
            trees.push(tree);
        }
    }
    trees
}
