//! End-to-end engine tests against the in-memory window system.
//!
//! These drive the real thread set (consumer, poller, scheduler) with
//! fake windows, so they assert on observable outcomes — visibility,
//! counters, restores — rather than on internals.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use adshade_core::config::{Config, RuleSet};
use adshade_core::system::EventKind;
use adshade_core::testing::FakeWindowSystem;
use adshade_core::{Engine, EnginePhase, Rect, WindowSystem};

/// Target tree: a titled main window with a content view and an ad
/// banner pinned to its bottom edge.
fn populate(sys: &FakeWindowSystem) {
    sys.add_window(
        1,
        100,
        "EVA_Window",
        "카카오톡",
        Some(Rect::from_edges(0, 0, 500, 700)),
        true,
        0,
    );
    sys.add_window(
        2,
        100,
        "EVA_ChildWindow",
        "OnlineMainView_0x10",
        Some(Rect::from_edges(0, 31, 500, 587)),
        true,
        1,
    );
    sys.add_window(
        3,
        100,
        "Chrome_WidgetWin_1",
        "BannerAdView_1",
        Some(Rect::from_edges(0, 587, 500, 700)),
        true,
        1,
    );
}

fn hook_config() -> Config {
    let mut config = Config::default();
    config.engine.event_hook = true;
    config.engine.fallback_polling = false;
    config.engine.event_dedupe_ms = 0;
    config
}

fn poll_config() -> Config {
    let mut config = Config::default();
    config.engine.event_hook = false;
    config.engine.fallback_polling = true;
    config.engine.poll_interval_active_ms = 50;
    config.engine.poll_interval_idle_ms = 50;
    config
}

fn settle() {
    thread::sleep(Duration::from_millis(400));
}

#[test]
fn notification_drives_hide_and_stop_restores() {
    // Arrange
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    let mut engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    // Act — start, then the banner announces itself.
    engine.start().unwrap();
    assert_eq!(engine.state().phase, EnginePhase::Running);
    sys.emit(EventKind::Show, 3);
    settle();

    // Assert — hidden and counted; the content view resize is tracked
    // for undo as well.
    assert!(!sys.is_visible(3));
    let state = engine.state();
    assert_eq!(state.ads_hidden, 1);
    assert_eq!(state.tracked_windows, 2);

    // Act — stop restores everything it touched.
    engine.stop();

    assert!(sys.is_visible(3));
    // The content view is back at its original size.
    assert_eq!(sys.rect(2).unwrap(), Rect::from_edges(0, 31, 500, 587));
    let state = engine.state();
    assert_eq!(state.phase, EnginePhase::Stopped);
    assert_eq!(state.restores, 2);
    assert_eq!(state.tracked_windows, 0);
    // The subscription was released on stop.
    assert_eq!(sys.subscription_count(), 0);
}

#[test]
fn polling_fallback_hides_without_notifications() {
    let sys = Arc::new(FakeWindowSystem::without_hooks());
    populate(&sys);
    let mut engine = Engine::new(sys.clone(), poll_config(), &RuleSet::default());

    engine.start().unwrap();
    thread::sleep(Duration::from_millis(700));

    assert!(!sys.is_visible(3));
    assert!(engine.state().ads_hidden >= 1);
    engine.stop();
}

#[test]
fn start_fails_with_no_event_source() {
    let sys = Arc::new(FakeWindowSystem::without_hooks());
    let mut config = Config::default();
    config.engine.event_hook = true;
    config.engine.fallback_polling = false;
    let mut engine = Engine::new(sys, config, &RuleSet::default());

    assert!(engine.start().is_err());
    assert_eq!(engine.state().phase, EnginePhase::Stopped);
}

#[test]
fn force_scan_works_without_start() {
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    engine.force_scan();

    assert!(!sys.is_visible(3));
    assert_eq!(engine.state().ads_hidden, 1);
    assert_eq!(engine.state().target_pid, Some(100));
}

#[test]
fn force_scan_resizes_content_view_with_formula() {
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    engine.force_scan();

    // Root 500x700 → content view 498x669.
    let rect = sys.rect(2).unwrap();
    assert_eq!((rect.width, rect.height), (498, 669));
    assert!(engine.state().resizes >= 1);
}

#[test]
fn disabling_restores_and_suppresses_mutations() {
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());
    engine.force_scan();
    assert!(!sys.is_visible(3));

    engine.set_enabled(false);

    assert!(sys.is_visible(3));
    engine.force_scan();
    assert!(sys.is_visible(3));
    assert_eq!(engine.state().ads_hidden, 1);
}

#[test]
fn foreign_process_windows_are_never_touched() {
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    // A different process reuses the target's class vocabulary.
    sys.add_window(
        50,
        999,
        "EVA_Window",
        "카카오톡",
        Some(Rect::from_edges(0, 0, 500, 700)),
        true,
        0,
    );
    sys.add_window(
        51,
        999,
        "Chrome_WidgetWin_1",
        "BannerAdView_1",
        Some(Rect::from_edges(0, 587, 500, 700)),
        true,
        50,
    );
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    engine.force_scan();

    // Only the resolved target pid's banner is hidden.
    assert!(!sys.is_visible(3));
    assert!(sys.is_visible(51));
}

#[test]
fn score_path_hides_anonymous_banner() {
    let sys = Arc::new(FakeWindowSystem::new());
    sys.add_window(
        1,
        100,
        "EVA_Window",
        "카카오톡",
        Some(Rect::from_edges(0, 0, 500, 700)),
        true,
        0,
    );
    // No hide pattern matches this text; only the geometric score does.
    sys.add_window(
        3,
        100,
        "Chrome_WidgetWin_1",
        "AdFit NAS Advertisement",
        Some(Rect::from_edges(0, 587, 500, 700)),
        true,
        1,
    );
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    engine.force_scan();

    assert!(!sys.is_visible(3));
}

#[test]
fn repeated_scans_do_not_rehide_or_double_count() {
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    engine.force_scan();
    engine.force_scan();
    engine.force_scan();

    assert_eq!(engine.state().ads_hidden, 1);
}

#[test]
fn dump_trees_reflect_live_hierarchy() {
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    let trees = engine.dump_trees();

    assert_eq!(trees.len(), 1);
    let root = &trees[0];
    assert_eq!(root.class, "EVA_Window");
    assert_eq!(root.children.len(), 2);
    // The dump is serializable as-is.
    let json = serde_json::to_string(root).unwrap();
    assert!(json.contains("BannerAdView_1"));
}

#[test]
fn stubborn_banner_is_parked_off_screen_and_restored() {
    let sys = Arc::new(FakeWindowSystem::new());
    populate(&sys);
    sys.make_stubborn(3);
    let original = sys.rect(3).unwrap();
    let engine = Engine::new(sys.clone(), hook_config(), &RuleSet::default());

    engine.force_scan();
    let parked = sys.rect(3).unwrap();
    assert!(parked.x < -10_000);
    assert_eq!((parked.width, parked.height), (original.width, original.height));

    engine.set_enabled(false);
    assert_eq!(sys.rect(3).unwrap(), original);
}
