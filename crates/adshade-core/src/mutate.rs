//! Reversible window mutations: hide, resize, restore.
//!
//! Every first mutation of a handle records a [`HiddenWindowSnapshot`]
//! so the engine can put the host application back exactly as it found
//! it. A mutation is only attempted against a window whose identity
//! can be re-verified at mutation time, and a restore only runs if the
//! live identity still equals the recorded one — a recycled handle is
//! never touched with stale state.

use std::collections::HashMap;

use crate::config::{LayoutConfig, Rules};
use crate::graph::Snapshot;
use crate::system::{Identity, WindowHandle, WindowSystem, pos_flags};
use crate::{Rect, log_debug, log_warn};

/// Off-screen parking spot for windows that refuse to hide. Far outside
/// any plausible monitor arrangement.
const OFFSCREEN: i32 = -32_000;

/// Undo record for one mutated window.
#[derive(Debug, Clone)]
pub struct HiddenWindowSnapshot {
    pub identity: Identity,
    pub was_visible: bool,
    pub rect: Option<Rect>,
}

/// Applies hide/resize effects and restores them on demand.
pub struct MutationEngine {
    layout: LayoutConfig,
    undo: HashMap<WindowHandle, HiddenWindowSnapshot>,
}

impl MutationEngine {
    pub fn new(layout: LayoutConfig) -> Self {
        Self {
            layout,
            undo: HashMap::new(),
        }
    }

    /// Number of windows with a recorded undo snapshot (hidden or
    /// resized).
    pub fn undo_count(&self) -> usize {
        self.undo.len()
    }

    /// Records the undo snapshot for a handle, once — the first
    /// mutation wins, so a later hide of an already-resized window
    /// keeps the original rect.
    fn record_undo(&mut self, sys: &dyn WindowSystem, handle: WindowHandle, identity: Identity) {
        self.undo
            .entry(handle)
            .or_insert_with(|| HiddenWindowSnapshot {
                identity,
                was_visible: sys.is_visible(handle),
                rect: sys.rect(handle),
            });
    }

    /// Hides a window, recording an undo snapshot the first time.
    ///
    /// Tries `show(false)` first; if the host overrides it and the
    /// window stays visible, falls back to parking it off-screen with
    /// its size preserved. Returns `true` only if one of the two
    /// techniques achieved invisibility. Calling this again on a
    /// still-hidden handle is a no-op with zero OS mutation calls.
    pub fn hide(&mut self, sys: &dyn WindowSystem, handle: WindowHandle) -> bool {
        if !sys.is_window(handle) {
            self.undo.remove(&handle);
            return false;
        }
        let Some(identity) = Identity::capture(sys, handle) else {
            return false;
        };

        if let Some(snapshot) = self.undo.get(&handle) {
            if snapshot.identity != identity {
                // Handle recycled since the snapshot was taken.
                self.undo.remove(&handle);
            } else if !sys.is_visible(handle) {
                return false;
            }
            // Still recorded and visible again: the host re-showed it.
            // Reuse the snapshot and retry the hide below.
        }

        self.record_undo(sys, handle, identity);

        sys.show(handle, false);
        if !sys.is_visible(handle) {
            return true;
        }
        let parked = sys.set_position(
            handle,
            OFFSCREEN,
            OFFSCREEN,
            0,
            0,
            pos_flags::NO_SIZE | pos_flags::NO_ZORDER | pos_flags::NO_ACTIVATE,
        );
        if !parked {
            // Nothing changed; keep no undo record for it.
            self.undo.remove(&handle);
        }
        parked
    }

    /// Restores one window to its recorded rect and visibility.
    ///
    /// Skipped (and the record evicted) when the live identity differs
    /// from the recorded one. Sub-operation failures are logged but do
    /// not raise — restoration is best-effort.
    pub fn restore(&mut self, sys: &dyn WindowSystem, handle: WindowHandle, reason: &str) -> bool {
        let Some(snapshot) = self.undo.remove(&handle) else {
            return false;
        };
        if !snapshot.identity.still_matches(sys) {
            log_warn!("Restore of {handle:#x} skipped ({reason}): identity changed");
            return false;
        }

        let mut ok = true;
        if let Some(rect) = snapshot.rect
            && !sys.set_position(
                handle,
                rect.x,
                rect.y,
                rect.width,
                rect.height,
                pos_flags::NO_ZORDER | pos_flags::NO_ACTIVATE,
            )
        {
            log_warn!("Restore of {handle:#x}: repositioning failed");
            ok = false;
        }
        if snapshot.was_visible && !sys.show(handle, true) {
            log_warn!("Restore of {handle:#x}: re-show failed");
            ok = false;
        }
        log_debug!("Restored {handle:#x} ({reason})");
        ok
    }

    /// Restores every recorded window, clearing the hidden set even
    /// when individual restores fail. Returns the success count.
    pub fn restore_all(&mut self, sys: &dyn WindowSystem, reason: &str) -> usize {
        let handles: Vec<WindowHandle> = self.undo.keys().copied().collect();
        let mut restored = 0;
        for handle in handles {
            if self.restore(sys, handle, reason) {
                restored += 1;
            }
        }
        self.undo.clear();
        restored
    }

    /// Drops the undo record of a window that no longer exists.
    pub fn forget(&mut self, handle: WindowHandle) {
        self.undo.remove(&handle);
    }

    /// Evicts records whose windows died without a restore.
    pub fn evict_dead(&mut self, sys: &dyn WindowSystem) {
        self.undo.retain(|&handle, _| sys.is_window(handle));
    }

    /// Resizes a content view with the main/lock view formula.
    ///
    /// Width is the root's width minus the shadow padding; height is
    /// the root's height minus the title-strip padding for the main
    /// view, or the full root height for the lock view. A window
    /// already within `resize_threshold_px` of the target is left
    /// alone — zero OS position calls.
    pub fn apply_view_resize(
        &mut self,
        sys: &dyn WindowSystem,
        child: WindowHandle,
        text: &str,
        root_rect: &Rect,
        rules: &Rules,
    ) -> bool {
        let width = root_rect.width - self.layout.shadow_padding_px;
        let height = if text.starts_with(rules.main_view_prefix.as_str()) {
            root_rect.height - self.layout.main_view_padding_px
        } else if text.starts_with(rules.lock_view_prefix.as_str()) {
            root_rect.height
        } else {
            return false;
        };
        if width < 1 || height < 1 {
            return false;
        }

        let threshold = self.layout.resize_threshold_px;
        if let Some(current) = sys.rect(child)
            && (current.width - width).abs() <= threshold
            && (current.height - height).abs() <= threshold
        {
            return false;
        }

        let Some(identity) = Identity::capture(sys, child) else {
            return false;
        };
        self.record_undo(sys, child, identity);

        sys.set_position(
            child,
            0,
            0,
            width,
            height,
            pos_flags::NO_MOVE | pos_flags::NO_ZORDER | pos_flags::NO_ACTIVATE,
        )
    }

    /// Stretches a content view down to fill the root's client area.
    ///
    /// Used by the delayed resize retries: after the host's own layout
    /// pass has settled, the view is grown to `client height − view's
    /// client-space top`. No-op within the resize threshold.
    pub fn resize_to_fill(
        &mut self,
        sys: &dyn WindowSystem,
        child: WindowHandle,
        root: WindowHandle,
    ) -> bool {
        let Some(client) = sys.client_rect(root) else {
            return false;
        };
        if client.height <= 0 {
            return false;
        }
        let Some(child_rect) = sys.rect(child) else {
            return false;
        };
        let Some((_, client_y)) = sys.screen_to_client(root, child_rect.x, child_rect.y) else {
            return false;
        };

        let target_height = client.height - client_y;
        if target_height < self.layout.min_view_height_px {
            return false;
        }
        if (target_height - child_rect.height).abs() <= self.layout.resize_threshold_px {
            return false;
        }

        let Some(identity) = Identity::capture(sys, child) else {
            return false;
        };
        self.record_undo(sys, child, identity);

        sys.set_position(
            child,
            0,
            0,
            child_rect.width,
            target_height,
            pos_flags::NO_MOVE
                | pos_flags::NO_ZORDER
                | pos_flags::NO_ACTIVATE
                | pos_flags::FRAME_CHANGED,
        )
    }

    /// Closes empty child-container shells under a titled main window.
    ///
    /// The host leaves behind chrome-less container children when an ad
    /// slot is dismissed; they reserve layout space while rendering
    /// nothing. A subtree carrying a custom scroll control is real
    /// content and is never closed. Returns the close count.
    pub fn close_empty_shells(
        &self,
        sys: &dyn WindowSystem,
        snapshot: &Snapshot,
        root: WindowHandle,
        rules: &Rules,
    ) -> usize {
        if !self.layout.close_empty_children {
            return 0;
        }
        let Some(root_node) = snapshot.get(&root) else {
            return 0;
        };
        if root_node.text.is_empty() {
            return 0;
        }
        let has_custom_scroll = snapshot.values().any(|n| {
            !rules.custom_scroll_prefix.is_empty()
                && n.class_name.starts_with(rules.custom_scroll_prefix.as_str())
        });
        if has_custom_scroll {
            return 0;
        }

        let mut closed = 0;
        for &child in &root_node.children {
            let Some(node) = snapshot.get(&child) else {
                continue;
            };
            if node.class_name == rules.child_container_class
                && node.text.is_empty()
                && sys.is_window(child)
                && sys.send_close(child)
            {
                closed += 1;
            }
        }
        closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleSet;
    use crate::testing::FakeWindowSystem;
    use std::sync::atomic::Ordering;

    fn engine() -> MutationEngine {
        MutationEngine::new(LayoutConfig::default())
    }

    fn rules() -> Rules {
        RuleSet::default().compile()
    }

    #[test]
    fn hide_records_snapshot_and_hides() {
        let sys = FakeWindowSystem::new();
        sys.add_window(7, 100, "Chrome_WidgetWin_1", "AdFit", Some(Rect::new(0, 587, 500, 113)), true, 1);
        let mut mutator = engine();

        assert!(mutator.hide(&sys, 7));
        assert!(!sys.is_visible(7));
        assert_eq!(mutator.undo_count(), 1);
    }

    #[test]
    fn second_hide_of_hidden_window_makes_no_os_calls() {
        let sys = FakeWindowSystem::new();
        sys.add_window(7, 100, "Chrome_WidgetWin_1", "AdFit", None, true, 1);
        let mut mutator = engine();
        mutator.hide(&sys, 7);
        let shows = sys.show_calls.load(Ordering::SeqCst);
        let moves = sys.position_calls.load(Ordering::SeqCst);

        assert!(!mutator.hide(&sys, 7));

        assert_eq!(sys.show_calls.load(Ordering::SeqCst), shows);
        assert_eq!(sys.position_calls.load(Ordering::SeqCst), moves);
    }

    #[test]
    fn stubborn_window_is_parked_off_screen_with_size_kept() {
        let sys = FakeWindowSystem::new();
        sys.add_window(7, 100, "Chrome_WidgetWin_1", "AdFit", Some(Rect::new(0, 587, 500, 113)), true, 1);
        sys.make_stubborn(7);
        let mut mutator = engine();

        assert!(mutator.hide(&sys, 7));

        let rect = sys.rect(7).unwrap();
        assert_eq!((rect.x, rect.y), (OFFSCREEN, OFFSCREEN));
        assert_eq!((rect.width, rect.height), (500, 113));
    }

    #[test]
    fn rehidden_window_reuses_original_snapshot() {
        // Arrange — hide once, then the host re-shows the window at a
        // different position.
        let sys = FakeWindowSystem::new();
        sys.add_window(7, 100, "Chrome_WidgetWin_1", "AdFit", Some(Rect::new(0, 587, 500, 113)), true, 1);
        let mut mutator = engine();
        mutator.hide(&sys, 7);
        sys.set_visible(7, true);
        sys.set_rect(7, Some(Rect::new(50, 50, 10, 10)));

        // Act — hide again, then restore.
        assert!(mutator.hide(&sys, 7));
        mutator.restore(&sys, 7, "test");

        // Assert — the restore used the rect recorded at first hide.
        assert_eq!(sys.rect(7).unwrap(), Rect::new(0, 587, 500, 113));
        assert!(sys.is_visible(7));
    }

    #[test]
    fn restore_is_a_noop_for_recycled_identity() {
        let sys = FakeWindowSystem::new();
        sys.add_window(7, 100, "Chrome_WidgetWin_1", "AdFit", Some(Rect::new(0, 587, 500, 113)), true, 1);
        let mut mutator = engine();
        mutator.hide(&sys, 7);

        // The OS hands the handle to a different process.
        sys.recycle_handle(7, 999, "Notepad");
        let moves = sys.position_calls.load(Ordering::SeqCst);

        assert!(!mutator.restore(&sys, 7, "test"));
        assert_eq!(sys.position_calls.load(Ordering::SeqCst), moves);
        assert_eq!(mutator.undo_count(), 0);
    }

    #[test]
    fn restore_all_clears_set_even_when_windows_died() {
        let sys = FakeWindowSystem::new();
        sys.add_window(7, 100, "A", "", None, true, 1);
        sys.add_window(8, 100, "B", "", None, true, 1);
        let mut mutator = engine();
        mutator.hide(&sys, 7);
        mutator.hide(&sys, 8);
        sys.destroy_window(8);

        let restored = mutator.restore_all(&sys, "stop");

        assert_eq!(restored, 1);
        assert_eq!(mutator.undo_count(), 0);
        assert!(sys.is_visible(7));
    }

    #[test]
    fn main_view_resize_formula() {
        let sys = FakeWindowSystem::new();
        sys.add_window(2, 100, "EVA_ChildWindow", "OnlineMainView_0x10", Some(Rect::new(0, 31, 400, 500)), true, 1);
        let mut mutator = engine();
        let root = Rect::from_edges(0, 0, 500, 700);

        assert!(mutator.apply_view_resize(&sys, 2, "OnlineMainView_0x10", &root, &rules()));

        let rect = sys.rect(2).unwrap();
        assert_eq!((rect.width, rect.height), (498, 669));
    }

    #[test]
    fn second_resize_at_target_size_makes_no_position_calls() {
        let sys = FakeWindowSystem::new();
        sys.add_window(2, 100, "EVA_ChildWindow", "OnlineMainView_0x10", Some(Rect::new(0, 31, 400, 500)), true, 1);
        let mut mutator = engine();
        let root = Rect::from_edges(0, 0, 500, 700);
        mutator.apply_view_resize(&sys, 2, "OnlineMainView_0x10", &root, &rules());
        let moves = sys.position_calls.load(Ordering::SeqCst);

        assert!(!mutator.apply_view_resize(&sys, 2, "OnlineMainView_0x10", &root, &rules()));

        assert_eq!(sys.position_calls.load(Ordering::SeqCst), moves);
    }

    #[test]
    fn resize_is_undone_by_restore_all() {
        // Arrange — resize the content view once.
        let sys = FakeWindowSystem::new();
        sys.add_window(2, 100, "EVA_ChildWindow", "OnlineMainView_0x10", Some(Rect::new(0, 31, 400, 500)), true, 1);
        let mut mutator = engine();
        let root = Rect::from_edges(0, 0, 500, 700);
        mutator.apply_view_resize(&sys, 2, "OnlineMainView_0x10", &root, &rules());
        assert_eq!(mutator.undo_count(), 1);

        // Act
        let restored = mutator.restore_all(&sys, "stop");

        // Assert — back to the pre-mutation rect.
        assert_eq!(restored, 1);
        assert_eq!(sys.rect(2).unwrap(), Rect::new(0, 31, 400, 500));
    }

    #[test]
    fn lock_view_resizes_to_full_height() {
        let sys = FakeWindowSystem::new();
        sys.add_window(2, 100, "EVA_ChildWindow", "LockModeView_0x20", Some(Rect::new(0, 0, 400, 500)), true, 1);
        let mut mutator = engine();
        let root = Rect::from_edges(0, 0, 500, 700);

        assert!(mutator.apply_view_resize(&sys, 2, "LockModeView_0x20", &root, &rules()));

        let rect = sys.rect(2).unwrap();
        assert_eq!((rect.width, rect.height), (498, 700));
    }

    #[test]
    fn non_view_text_is_not_resized() {
        let sys = FakeWindowSystem::new();
        sys.add_window(2, 100, "EVA_ChildWindow", "BannerAdView", None, true, 1);
        let mut mutator = engine();
        let root = Rect::from_edges(0, 0, 500, 700);

        assert!(!mutator.apply_view_resize(&sys, 2, "BannerAdView", &root, &rules()));
        assert_eq!(sys.position_calls.load(Ordering::SeqCst), 0);
    }
}
