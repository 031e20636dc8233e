//! Generators for the default configuration files.
//!
//! Used by `adshade init` to create commented starting points. The
//! values here mirror the serde defaults, so a generated file parses
//! back into `Config::default()` / `RuleSet::default()`.

/// Returns the default `config.toml` contents, with comments.
pub fn generate_config() -> String {
    r#"# Adshade engine configuration.
# Delete any line to fall back to its default.

[engine]
# Apply mutations. When false the engine observes but hides nothing.
enabled = true
# Use OS window notifications when available.
event_hook = true
# Run the polling safety net alongside (or instead of) the hook.
fallback_polling = true
# Poll interval while the target process is running / absent.
poll_interval_active_ms = 500
poll_interval_idle_ms = 2000
# Target-pid re-resolution cooldowns.
pid_check_active_ms = 5000
pid_check_idle_ms = 20000
# Repeat notifications for one window within this window coalesce.
event_coalesce_ms = 120
# A window processed this recently is skipped.
event_dedupe_ms = 500
# Bounded event queue; overflow drops events, never blocks.
queue_capacity = 1000
# Window subtree snapshot depth.
snapshot_depth = 8
# TTL for memoized class/text/rect lookups.
cache_ttl_ms = 100
# Cooldown before an identical error is logged again.
log_rate_limit_secs = 10

[layout]
# Content view resize formula: width = root - shadow_padding,
# height = root - main_view_padding (main view) or full (lock view).
shadow_padding_px = 2
main_view_padding_px = 31
# Size delta treated as "already resized".
resize_threshold_px = 5
# Never shrink a content view below this height.
min_view_height_px = 100
# Delayed resize retries after a hide (the host's layout pass races
# the first attempt).
resize_retry_delays_ms = [400, 800, 1200, 1800]
# Close empty container shells left behind by dismissed ad slots.
close_empty_children = true

[banner]
# Score-based banner detection. Exact patterns always run.
enabled = true
score_threshold = 6
# Banner height band, inclusive.
min_height_px = 80
max_height_px = 170
# Minimum horizontal overlap with the root, as a width fraction.
min_width_ratio = 0.9
# Bottom-edge alignment tolerance.
bottom_margin_px = 10

[banner.weights]
is_chrome_widget = 3
title_contains_ad_token = 4
height_in_band = 2
overlap_ratio_high = 2
bottom_aligned_strong = 2
is_child_container = 1
# Negative: the false-positive guard for content views.
is_content_view = -5

[logging]
# File logging to ~/.config/adshade/logs/adshade.log
enabled = false
level = "info"   # debug | info | warn | error
max_file_mb = 10
"#
    .to_string()
}

/// Returns the default `patterns.toml` contents, with comments.
pub fn generate_patterns() -> String {
    r#"# Adshade rule set. The stock values target KakaoTalk.

# Classes of the host application's top-level windows.
main_window_classes = ["EVA_Window"]
# Title tokens distinguishing real main windows from popup shells.
main_window_titles = ["카카오톡", "KakaoTalk"]
# Generic child container class, and the scroll-control prefix that
# marks a container subtree as real content.
child_container_class = "EVA_ChildWindow"
custom_scroll_prefix = "_EVA_CustomScrollCtrl"
# Embedded web view class prefixes used for ad rendering.
chrome_widget_prefixes = ["Chrome_WidgetWin", "Chrome_"]
# Title tokens marking ad content. One- and two-character tokens only
# match whole words.
ad_tokens = ["ad", "adfit", "advertisement", "adbanner", "광고"]
# Text prefixes of the resizable content views.
main_view_prefix = "OnlineMainView"
lock_view_prefix = "LockModeView"

# Windows matching any [[hide]] pattern are hidden.
# Kinds: text-equals, text-starts-with, text-contains, text-regex,
#        class-equals, class-starts-with

[[hide]]
kind = "text-starts-with"
value = "BannerAdView"

[[hide]]
kind = "text-starts-with"
value = "AdView"

[[hide]]
kind = "text-starts-with"
value = "LockScreenAdView"

# Windows matching any [[resize]] pattern are content views, resized
# into reclaimed space and protected from the banner score.

[[resize]]
kind = "text-starts-with"
value = "OnlineMainView"

[[resize]]
kind = "text-starts-with"
value = "LockModeView"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RuleSet};

    #[test]
    fn config_template_parses_to_defaults() {
        let parsed: Config = toml::from_str(&generate_config()).unwrap();
        let default = Config::default();
        assert_eq!(parsed.engine.queue_capacity, default.engine.queue_capacity);
        assert_eq!(parsed.banner.score_threshold, default.banner.score_threshold);
        assert_eq!(
            parsed.layout.resize_retry_delays_ms,
            default.layout.resize_retry_delays_ms
        );
        assert_eq!(parsed.logging.level, default.logging.level);
    }

    #[test]
    fn patterns_template_parses_to_defaults() {
        let parsed: RuleSet = toml::from_str(&generate_patterns()).unwrap();
        let default = RuleSet::default();
        assert_eq!(parsed.main_window_classes, default.main_window_classes);
        assert_eq!(parsed.ad_tokens, default.ad_tokens);
        assert_eq!(parsed.hide.len(), default.hide.len());
        assert_eq!(parsed.resize.len(), default.resize.len());
    }
}
