//! The rule set describing the target application's window vocabulary.
//!
//! Loaded from `~/.config/adshade/patterns.toml`. The stock defaults
//! target KakaoTalk; every value is replaceable without recompiling.

use serde::{Deserialize, Serialize};

use crate::pattern::{PatternSet, PatternSpec};

/// Raw rule configuration as written in `patterns.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleSet {
    /// Classes of the host application's top-level windows.
    pub main_window_classes: Vec<String>,
    /// Title tokens distinguishing real main windows from chrome-less
    /// popup shells of the same class.
    pub main_window_titles: Vec<String>,
    /// Class of the generic child container the host nests views in.
    pub child_container_class: String,
    /// Class prefix marking a custom scroll control; a container whose
    /// subtree carries one is real content, not an empty ad shell.
    pub custom_scroll_prefix: String,
    /// Class prefixes of embedded web views used to render ads.
    pub chrome_widget_prefixes: Vec<String>,
    /// Case-insensitive tokens whose presence in a title marks ad
    /// content. Tokens of one or two characters only match whole words.
    pub ad_tokens: Vec<String>,
    /// Text prefix of the resizable main content view.
    pub main_view_prefix: String,
    /// Text prefix of the lock-screen view (resized to full height).
    pub lock_view_prefix: String,
    /// Patterns that mark a window as an ad to hide.
    pub hide: Vec<PatternSpec>,
    /// Patterns that mark a window as a content view to resize.
    pub resize: Vec<PatternSpec>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            main_window_classes: vec!["EVA_Window".into()],
            main_window_titles: vec!["카카오톡".into(), "KakaoTalk".into()],
            child_container_class: "EVA_ChildWindow".into(),
            custom_scroll_prefix: "_EVA_CustomScrollCtrl".into(),
            chrome_widget_prefixes: vec!["Chrome_WidgetWin".into(), "Chrome_".into()],
            ad_tokens: vec![
                "ad".into(),
                "adfit".into(),
                "advertisement".into(),
                "adbanner".into(),
                "광고".into(),
            ],
            main_view_prefix: "OnlineMainView".into(),
            lock_view_prefix: "LockModeView".into(),
            hide: vec![
                PatternSpec::new("text-starts-with", "BannerAdView"),
                PatternSpec::new("text-starts-with", "AdView"),
                PatternSpec::new("text-starts-with", "LockScreenAdView"),
            ],
            resize: vec![
                PatternSpec::new("text-starts-with", "OnlineMainView"),
                PatternSpec::new("text-starts-with", "LockModeView"),
            ],
        }
    }
}

impl RuleSet {
    /// Compiles the rule set into its matcher form. Malformed patterns
    /// are dropped here, with a warning, and never match.
    pub fn compile(&self) -> Rules {
        Rules {
            hide: PatternSet::compile(&self.hide),
            resize: PatternSet::compile(&self.resize),
            main_window_classes: self.main_window_classes.clone(),
            main_window_titles: self.main_window_titles.clone(),
            child_container_class: self.child_container_class.clone(),
            custom_scroll_prefix: self.custom_scroll_prefix.clone(),
            chrome_widget_prefixes: self.chrome_widget_prefixes.clone(),
            ad_tokens_lc: self
                .ad_tokens
                .iter()
                .map(|t| t.to_lowercase())
                .filter(|t| !t.is_empty())
                .collect(),
            main_view_prefix: self.main_view_prefix.clone(),
            lock_view_prefix: self.lock_view_prefix.clone(),
        }
    }
}

/// Compiled rule set used on the hot path.
#[derive(Debug, Clone)]
pub struct Rules {
    pub hide: PatternSet,
    pub resize: PatternSet,
    pub main_window_classes: Vec<String>,
    pub main_window_titles: Vec<String>,
    pub child_container_class: String,
    pub custom_scroll_prefix: String,
    pub chrome_widget_prefixes: Vec<String>,
    pub ad_tokens_lc: Vec<String>,
    pub main_view_prefix: String,
    pub lock_view_prefix: String,
}

impl Rules {
    /// Whether this class belongs to the target application's window
    /// vocabulary at all (main windows and their chrome-less popups).
    pub fn is_target_class(&self, class: &str) -> bool {
        self.main_window_classes.iter().any(|c| c == class)
            || self
                .main_window_classes
                .first()
                .is_some_and(|c| class.starts_with(c.as_str()))
    }

    /// Whether this is a titled main window of the target application.
    pub fn is_main_window(&self, class: &str, title: &str) -> bool {
        self.is_target_class(class)
            && self
                .main_window_titles
                .iter()
                .any(|t| !t.is_empty() && title.contains(t.as_str()))
    }

    /// Whether the class is an embedded web view used for ad rendering.
    pub fn is_chrome_widget(&self, class: &str) -> bool {
        self.chrome_widget_prefixes
            .iter()
            .any(|p| !p.is_empty() && class.starts_with(p.as_str()))
    }

    /// Whether the window is an ad by exact pattern (first match wins).
    pub fn is_ad_window(&self, text: &str, class: &str) -> bool {
        self.hide.matches(text, class)
    }

    /// Whether the window is a content view that should be resized into
    /// reclaimed space (also the false-positive guard for scoring).
    pub fn is_resize_target(&self, text: &str, class: &str) -> bool {
        self.resize.matches(text, class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rules_compile_cleanly() {
        let rules = RuleSet::default().compile();
        assert!(!rules.hide.is_empty());
        assert!(!rules.resize.is_empty());
    }

    #[test]
    fn main_window_requires_title_token() {
        let rules = RuleSet::default().compile();
        assert!(rules.is_main_window("EVA_Window", "카카오톡"));
        assert!(rules.is_main_window("EVA_Window", "KakaoTalk Edge"));
        // Same class without a title token is a popup shell, not a main window.
        assert!(!rules.is_main_window("EVA_Window", ""));
        assert!(!rules.is_main_window("Notepad", "KakaoTalk"));
    }

    #[test]
    fn target_class_accepts_class_prefix_variants() {
        let rules = RuleSet::default().compile();
        assert!(rules.is_target_class("EVA_Window"));
        assert!(rules.is_target_class("EVA_Window_Popup"));
        assert!(!rules.is_target_class("Chrome_WidgetWin_1"));
    }

    #[test]
    fn stock_hide_patterns_catch_known_ad_views() {
        let rules = RuleSet::default().compile();
        assert!(rules.is_ad_window("BannerAdView_0x1", "EVA_ChildWindow"));
        assert!(rules.is_ad_window("AdView", "EVA_ChildWindow"));
        assert!(rules.is_ad_window("LockScreenAdView_2", ""));
        assert!(!rules.is_ad_window("OnlineMainView_0x123", "EVA_ChildWindow"));
    }

    #[test]
    fn resize_targets_double_as_content_guard() {
        let rules = RuleSet::default().compile();
        assert!(rules.is_resize_target("OnlineMainView_0x123", ""));
        assert!(rules.is_resize_target("LockModeView_0x20", ""));
        assert!(!rules.is_resize_target("BannerAdView", ""));
    }
}
