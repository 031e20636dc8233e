//! WinEvent hook subscriptions with an explicit ownership table.
//!
//! `SetWinEventHook` requires a message pump on the installing thread,
//! so each subscription owns one pump thread. Retained callbacks live
//! in a process-wide registry keyed by subscription id and are
//! released exactly when `unsubscribe` runs — native callback
//! trampolines never rely on ambient lifetime extension.

use std::cell::Cell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Mutex, OnceLock};
use std::thread;

use adshade_core::log_warn;
use adshade_core::system::{EventCallback, EventKind, SubscriptionId, WindowHandle};

use windows::Win32::Foundation::{HWND, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Accessibility::{HWINEVENTHOOK, SetWinEventHook, UnhookWinEvent};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, MSG, PostThreadMessageW, TranslateMessage, WM_QUIT,
    WINEVENT_OUTOFCONTEXT, WINEVENT_SKIPOWNPROCESS,
};

use crate::event;

/// Object ID indicating the event applies to the window itself,
/// not a child element like a scrollbar or menu item.
const OBJID_WINDOW: i32 = 0;

struct Subscription {
    callback: EventCallback,
    kinds: Vec<EventKind>,
    pump_thread_id: u32,
    pump: Option<thread::JoinHandle<()>>,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn registry() -> &'static Mutex<HashMap<u64, Subscription>> {
    static REGISTRY: OnceLock<Mutex<HashMap<u64, Subscription>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

// The WinEvent callback runs on the pump thread that installed the
// hooks; this identifies which subscription that thread serves.
thread_local! {
    static ACTIVE_SUBSCRIPTION: Cell<u64> = const { Cell::new(0) };
}

/// Installs hooks for the given kinds on a new pump thread.
///
/// Returns `None` when no hook could be installed (e.g. a restricted
/// desktop session) — the engine then runs in polling-only mode.
pub(crate) fn subscribe(kinds: &[EventKind], callback: EventCallback) -> Option<SubscriptionId> {
    let id = NEXT_ID.fetch_add(1, Ordering::SeqCst);

    // The callback must be reachable from the registry before the
    // first event can fire on the pump thread.
    if let Ok(mut reg) = registry().lock() {
        reg.insert(
            id,
            Subscription {
                callback,
                kinds: kinds.to_vec(),
                pump_thread_id: 0,
                pump: None,
            },
        );
    } else {
        return None;
    }

    let hook_kinds = kinds.to_vec();
    let (ready_tx, ready_rx) = mpsc::channel::<Result<u32, String>>();

    let spawned = thread::Builder::new()
        .name("adshade-pump".into())
        .spawn(move || pump_thread(id, &hook_kinds, &ready_tx));
    let pump = match spawned {
        Ok(pump) => pump,
        Err(_) => {
            if let Ok(mut reg) = registry().lock() {
                reg.remove(&id);
            }
            return None;
        }
    };

    let ready = ready_rx.recv().unwrap_or_else(|_| {
        Err("event pump thread exited unexpectedly".into())
    });

    match ready {
        Ok(thread_id) => {
            if let Ok(mut reg) = registry().lock()
                && let Some(entry) = reg.get_mut(&id)
            {
                entry.pump_thread_id = thread_id;
                entry.pump = Some(pump);
            }
            Some(SubscriptionId(id))
        }
        Err(e) => {
            log_warn!("WinEvent subscription failed: {e}");
            if let Ok(mut reg) = registry().lock() {
                reg.remove(&id);
            }
            let _ = pump.join();
            None
        }
    }
}

/// Removes the subscription, stops its pump thread, and releases the
/// retained callback.
pub(crate) fn unsubscribe(id: SubscriptionId) {
    let entry = match registry().lock() {
        Ok(mut reg) => reg.remove(&id.0),
        Err(_) => None,
    };
    let Some(entry) = entry else {
        return;
    };
    if entry.pump_thread_id != 0 {
        // SAFETY: posting WM_QUIT to a thread id is always safe; it
        // unblocks GetMessageW on the pump thread.
        unsafe {
            let _ = PostThreadMessageW(entry.pump_thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
    if let Some(pump) = entry.pump {
        let _ = pump.join();
    }
}

/// Body of one subscription's pump thread: install hooks, report
/// readiness, pump messages until WM_QUIT, unhook.
fn pump_thread(id: u64, kinds: &[EventKind], ready_tx: &mpsc::Sender<Result<u32, String>>) {
    ACTIVE_SUBSCRIPTION.with(|cell| cell.set(id));

    // SAFETY: GetCurrentThreadId has no preconditions.
    let thread_id = unsafe { GetCurrentThreadId() };

    let mut hooks: Vec<HWINEVENTHOOK> = Vec::new();
    for &kind in kinds {
        let code = event::event_code(kind);
        // SAFETY: SetWinEventHook registers our callback for the given
        // event range. WINEVENT_OUTOFCONTEXT means the callback runs in
        // our process, on this thread's message loop.
        // WINEVENT_SKIPOWNPROCESS ignores our own windows.
        let hook = unsafe {
            SetWinEventHook(
                code,
                code,
                None,
                Some(win_event_proc),
                0,
                0,
                WINEVENT_OUTOFCONTEXT | WINEVENT_SKIPOWNPROCESS,
            )
        };
        if hook.is_invalid() {
            log_warn!("Failed to install hook for event {code:#x}");
        } else {
            hooks.push(hook);
        }
    }

    if hooks.is_empty() {
        let _ = ready_tx.send(Err("no WinEvent hook could be installed".into()));
        return;
    }
    let _ = ready_tx.send(Ok(thread_id));

    run_message_pump();

    for hook in hooks {
        // SAFETY: unhooking a valid hook handle from the thread that
        // installed it.
        unsafe {
            let _ = UnhookWinEvent(hook);
        }
    }
}

/// The Win32 message pump. Blocks until WM_QUIT is received.
fn run_message_pump() {
    let mut msg = MSG::default();

    // SAFETY: standard message pump; GetMessageW returns 0 on WM_QUIT
    // and -1 on error, both of which end the loop.
    while unsafe { GetMessageW(&mut msg, None, 0, 0) }.as_bool() {
        unsafe {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
}

/// The WinEvent callback.
///
/// Runs on the pump thread. Ignores events on child objects
/// (scrollbars, menu items); forwards window-level events to the
/// subscription's retained callback.
unsafe extern "system" fn win_event_proc(
    _hook: HWINEVENTHOOK,
    event: u32,
    hwnd: HWND,
    id_object: i32,
    id_child: i32,
    _event_thread: u32,
    _event_time: u32,
) {
    if id_object != OBJID_WINDOW || id_child != 0 {
        return;
    }
    let Some(kind) = event::translate(event) else {
        return;
    };

    let id = ACTIVE_SUBSCRIPTION.with(|cell| cell.get());
    if id == 0 {
        return;
    }
    let callback = match registry().lock() {
        Ok(reg) => reg
            .get(&id)
            .filter(|s| s.kinds.contains(&kind))
            .map(|s| s.callback.clone()),
        Err(_) => None,
    };
    if let Some(callback) = callback {
        callback(kind, hwnd.0 as WindowHandle);
    }
}
