mod loader;
pub mod rules;
pub mod template;

use serde::{Deserialize, Serialize};

pub use loader::{
    config_dir, config_path, load, load_rules, patterns_path, try_load, try_load_rules,
};
pub use rules::{Rules, RuleSet};

use crate::log::LogConfig;

/// Top-level configuration for Adshade.
///
/// Loaded from `~/.config/adshade/config.toml`. Missing sections fall
/// back to defaults thanks to `#[serde(default)]`. Pattern rules live
/// in a separate `patterns.toml` (see [`rules`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Event pipeline and polling timing.
    pub engine: EngineConfig,
    /// Resize formula and undo behaviour.
    pub layout: LayoutConfig,
    /// Score-based banner detection.
    pub banner: BannerConfig,
    /// File logging.
    pub logging: LogConfig,
}

/// Event pipeline, polling, and cache timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Whether mutations are applied at all. When `false` the engine
    /// still observes but hides nothing.
    pub enabled: bool,
    /// Use OS lifecycle notifications when the platform offers them.
    pub event_hook: bool,
    /// Run the polling safety net alongside (or instead of) the hook.
    pub fallback_polling: bool,
    /// Poll interval while the target process is known to be running.
    pub poll_interval_active_ms: u64,
    /// Poll interval while waiting for the target process to appear.
    pub poll_interval_idle_ms: u64,
    /// Re-resolution cooldown for the target PID while it is known.
    pub pid_check_active_ms: u64,
    /// Re-resolution cooldown while the target PID is unknown.
    pub pid_check_idle_ms: u64,
    /// Window within which repeat notifications for a handle coalesce.
    pub event_coalesce_ms: u64,
    /// Window within which an already-processed handle is skipped.
    pub event_dedupe_ms: u64,
    /// Bounded event queue capacity; overflow drops, never blocks.
    pub queue_capacity: usize,
    /// Maximum depth of a window subtree snapshot.
    pub snapshot_depth: u32,
    /// TTL for memoized per-handle class/text/rect lookups.
    pub cache_ttl_ms: u64,
    /// Cooldown before an identical error message is logged again.
    pub log_rate_limit_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            event_hook: true,
            fallback_polling: true,
            poll_interval_active_ms: 500,
            poll_interval_idle_ms: 2000,
            pid_check_active_ms: 5000,
            pid_check_idle_ms: 20_000,
            event_coalesce_ms: 120,
            event_dedupe_ms: 500,
            queue_capacity: 1000,
            snapshot_depth: 8,
            cache_ttl_ms: 100,
            log_rate_limit_secs: 10,
        }
    }
}

/// Content-view resize formula and related mutation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Horizontal slack the host reserves for its drop shadow.
    pub shadow_padding_px: i32,
    /// Vertical padding above the main content view (title strip).
    pub main_view_padding_px: i32,
    /// Size delta below which a resize is considered already applied.
    pub resize_threshold_px: i32,
    /// Never shrink a content view below this height.
    pub min_view_height_px: i32,
    /// Decaying retry schedule re-applying a resize after a hide,
    /// because the host's own layout pass races the first attempt.
    pub resize_retry_delays_ms: Vec<u64>,
    /// Close empty child shells left behind under titled main windows.
    pub close_empty_children: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            shadow_padding_px: 2,
            main_view_padding_px: 31,
            resize_threshold_px: 5,
            min_view_height_px: 100,
            resize_retry_delays_ms: vec![400, 800, 1200, 1800],
            close_empty_children: true,
        }
    }
}

/// Score-based banner detection thresholds.
///
/// The weight table and thresholds are empirically tuned against the
/// stock target application; treat them as a starting point, not an
/// optimum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BannerConfig {
    /// Whether the score-based path runs at all (exact patterns always do).
    pub enabled: bool,
    /// Minimum score for a node to be hidden.
    pub score_threshold: i32,
    /// Banner height band, inclusive.
    pub min_height_px: i32,
    pub max_height_px: i32,
    /// Minimum horizontal overlap with the root, as a width fraction.
    pub min_width_ratio: f64,
    /// How close the node's bottom edge must sit to the root's.
    pub bottom_margin_px: i32,
    /// Per-signal score weights.
    pub weights: ScoreWeights,
}

impl Default for BannerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            score_threshold: 6,
            min_height_px: 80,
            max_height_px: 170,
            min_width_ratio: 0.9,
            bottom_margin_px: 10,
            weights: ScoreWeights::default(),
        }
    }
}

/// Score contribution of each banner signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub is_chrome_widget: i32,
    pub title_contains_ad_token: i32,
    pub height_in_band: i32,
    pub overlap_ratio_high: i32,
    pub bottom_aligned_strong: i32,
    pub is_child_container: i32,
    /// Typically negative — the false-positive guard for content views.
    pub is_content_view: i32,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            is_chrome_widget: 3,
            title_contains_ad_token: 4,
            height_in_band: 2,
            overlap_ratio_high: 2,
            bottom_aligned_strong: 2,
            is_child_container: 1,
            is_content_view: -5,
        }
    }
}

impl Config {
    /// Clamps values to safe ranges.
    ///
    /// Prevents zero-length polling loops, inverted height bands, and
    /// queue capacities that would make the coalescing map useless.
    pub fn validate(&mut self) {
        let e = &mut self.engine;
        e.poll_interval_active_ms = e.poll_interval_active_ms.clamp(50, 60_000);
        e.poll_interval_idle_ms = e.poll_interval_idle_ms.clamp(e.poll_interval_active_ms, 300_000);
        e.pid_check_active_ms = e.pid_check_active_ms.clamp(500, 300_000);
        e.pid_check_idle_ms = e.pid_check_idle_ms.clamp(1000, 600_000);
        e.event_coalesce_ms = e.event_coalesce_ms.min(5000);
        e.event_dedupe_ms = e.event_dedupe_ms.min(10_000);
        e.queue_capacity = e.queue_capacity.clamp(16, 100_000);
        e.snapshot_depth = e.snapshot_depth.clamp(1, 32);
        e.cache_ttl_ms = e.cache_ttl_ms.clamp(10, 60_000);

        let l = &mut self.layout;
        l.shadow_padding_px = l.shadow_padding_px.clamp(0, 200);
        l.main_view_padding_px = l.main_view_padding_px.clamp(0, 500);
        l.resize_threshold_px = l.resize_threshold_px.clamp(0, 100);
        l.min_view_height_px = l.min_view_height_px.clamp(1, 10_000);

        let b = &mut self.banner;
        b.min_height_px = b.min_height_px.max(1);
        b.max_height_px = b.max_height_px.max(1);
        if b.min_height_px > b.max_height_px {
            std::mem::swap(&mut b.min_height_px, &mut b.max_height_px);
        }
        b.min_width_ratio = b.min_width_ratio.clamp(0.1, 1.0);
        b.bottom_margin_px = b.bottom_margin_px.clamp(0, 100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        // Arrange / Act
        let config = Config::default();

        // Assert
        assert_eq!(config.engine.queue_capacity, 1000);
        assert_eq!(config.engine.event_coalesce_ms, 120);
        assert_eq!(config.banner.score_threshold, 6);
        assert_eq!(config.layout.shadow_padding_px, 2);
        assert_eq!(config.layout.main_view_padding_px, 31);
        assert_eq!(config.layout.resize_retry_delays_ms, vec![400, 800, 1200, 1800]);
    }

    #[test]
    fn partial_toml_uses_defaults_for_missing_sections() {
        // Arrange
        let toml_str = "[banner]\nscore_threshold = 8\n";

        // Act
        let config: Config = toml::from_str(toml_str).unwrap();

        // Assert
        assert_eq!(config.banner.score_threshold, 8);
        assert_eq!(config.banner.weights.title_contains_ad_token, 4);
        assert_eq!(config.engine.queue_capacity, 1000);
    }

    #[test]
    fn validate_swaps_inverted_height_band() {
        let mut config = Config::default();
        config.banner.min_height_px = 300;
        config.banner.max_height_px = 100;

        config.validate();

        assert_eq!(config.banner.min_height_px, 100);
        assert_eq!(config.banner.max_height_px, 300);
    }

    #[test]
    fn validate_clamps_extreme_values() {
        let mut config = Config::default();
        config.engine.poll_interval_active_ms = 0;
        config.engine.queue_capacity = 1;
        config.banner.min_width_ratio = 99.0;

        config.validate();

        assert_eq!(config.engine.poll_interval_active_ms, 50);
        assert_eq!(config.engine.queue_capacity, 16);
        assert!((config.banner.min_width_ratio - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn default_weights_match_stock_tuning() {
        let w = ScoreWeights::default();
        assert_eq!(w.is_chrome_widget, 3);
        assert_eq!(w.title_contains_ad_token, 4);
        assert_eq!(w.is_content_view, -5);
    }
}
