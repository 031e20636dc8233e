//! Score-based banner classification.
//!
//! The exact patterns in [`crate::config::Rules`] catch ad views the
//! host names honestly. Banners rendered inside anonymous embedded web
//! views carry no such name, so they are recognised by a weighted sum
//! of geometric and naming signals instead. Scoring is a pure function
//! of its inputs: identical snapshots always classify identically.

use crate::Rect;
use crate::config::{BannerConfig, Rules};
use crate::graph::Snapshot;
use crate::system::WindowHandle;

/// The bottom-aligned signal tolerates at most this many pixels even
/// when the configured margin is wider.
const BOTTOM_ALIGN_CAP_PX: i32 = 10;

/// One scored banner candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub handle: WindowHandle,
    pub label: String,
    pub score: i32,
}

/// Result of one scoring pass over a snapshot.
#[derive(Debug, Default)]
pub struct BannerScan {
    /// Candidates at or above the hide threshold.
    pub to_hide: Vec<Candidate>,
    /// Candidates within two points below the threshold — logged for
    /// tuning, never mutated.
    pub observed: Vec<Candidate>,
}

/// Returns whether the title carries any configured ad token.
///
/// Tokens of one or two characters must match as a whole lowercase
/// word, so `"ad"` does not light up inside `"header"`; longer tokens
/// match as case-insensitive substrings.
pub fn contains_ad_token(title: &str, tokens_lc: &[String]) -> bool {
    if tokens_lc.is_empty() || title.is_empty() {
        return false;
    }
    let title_lc = title.to_lowercase();
    tokens_lc.iter().any(|token| {
        if token.chars().count() <= 2 {
            title_lc
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| word == token)
        } else {
            title_lc.contains(token.as_str())
        }
    })
}

/// Scores one window against its root.
///
/// Pure function of its arguments; the weight table and thresholds come
/// from configuration.
pub fn score(
    class: &str,
    title: &str,
    rect: &Rect,
    root_rect: &Rect,
    is_content_view: bool,
    rules: &Rules,
    banner: &BannerConfig,
) -> i32 {
    let w = &banner.weights;
    let root_width = root_rect.width.max(1);
    let mut total = 0;

    if rules.is_chrome_widget(class) {
        total += w.is_chrome_widget;
    }
    if contains_ad_token(title, &rules.ad_tokens_lc) {
        total += w.title_contains_ad_token;
    }
    if rect.height >= banner.min_height_px && rect.height <= banner.max_height_px {
        total += w.height_in_band;
    }
    let overlap = rect.horizontal_overlap(root_rect);
    if f64::from(overlap) / f64::from(root_width) >= banner.min_width_ratio {
        total += w.overlap_ratio_high;
    }
    let margin = banner.bottom_margin_px.clamp(1, BOTTOM_ALIGN_CAP_PX);
    if (rect.bottom() - root_rect.bottom()).abs() <= margin {
        total += w.bottom_aligned_strong;
    }
    if class.starts_with(rules.child_container_class.as_str()) {
        total += w.is_child_container;
    }
    if is_content_view {
        total += w.is_content_view;
    }

    total
}

/// Scores every non-root node of a snapshot with a positive rect.
///
/// Snapshot iteration order is stable (keyed map), so the returned
/// candidate lists are deterministic for identical snapshots.
pub fn detect_banners(
    snapshot: &Snapshot,
    root: WindowHandle,
    rules: &Rules,
    banner: &BannerConfig,
) -> BannerScan {
    let mut scan = BannerScan::default();
    let Some(root_rect) = snapshot.get(&root).and_then(|n| n.rect) else {
        return scan;
    };
    if root_rect.width <= 0 {
        return scan;
    }

    for (&handle, node) in snapshot {
        if handle == root {
            continue;
        }
        let Some(rect) = node.rect else {
            continue;
        };
        if !rect.is_positive() {
            continue;
        }

        let is_content = rules.is_resize_target(&node.text, &node.class_name);
        let score = score(
            &node.class_name,
            &node.text,
            &rect,
            &root_rect,
            is_content,
            rules,
            banner,
        );
        let label = if node.text.is_empty() {
            format!("[{}]", node.class_name)
        } else {
            node.text.clone()
        };

        if score >= banner.score_threshold {
            scan.to_hide.push(Candidate {
                handle,
                label,
                score,
            });
        } else if score >= banner.score_threshold - 2 {
            scan.observed.push(Candidate {
                handle,
                label,
                score,
            });
        }
    }

    scan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::IdentityCache;
    use crate::config::RuleSet;
    use crate::graph;
    use crate::testing::FakeWindowSystem;
    use std::time::Duration;

    fn rules() -> Rules {
        RuleSet::default().compile()
    }

    fn banner() -> BannerConfig {
        BannerConfig::default()
    }

    #[test]
    fn short_token_requires_word_boundary() {
        let tokens = vec!["ad".to_string()];
        assert!(contains_ad_token("ad", &tokens));
        assert!(contains_ad_token("bottom ad strip", &tokens));
        assert!(!contains_ad_token("header", &tokens));
        assert!(!contains_ad_token("readlater", &tokens));
    }

    #[test]
    fn longer_token_matches_as_substring() {
        // "adfit nas" carries no standalone "ad" word, but the longer
        // "adfit" token still catches it.
        let tokens = rules().ad_tokens_lc;
        assert!(contains_ad_token("AdFit NAS", &tokens));
        assert!(contains_ad_token("ad", &tokens));
        assert!(!contains_ad_token("header", &tokens));
        assert!(!contains_ad_token("readlater", &tokens));
    }

    #[test]
    fn bottom_banner_scores_above_threshold() {
        // Root 500x700; candidate pinned to the bottom 113px.
        let root = Rect::from_edges(0, 0, 500, 700);
        let rect = Rect::from_edges(0, 587, 500, 700);

        let s = score(
            "Chrome_WidgetWin_1",
            "AdFit NAS Advertisement",
            &rect,
            &root,
            false,
            &rules(),
            &banner(),
        );

        // chrome(3) + token(4) + band(2) + overlap(2) + bottom(2)
        assert_eq!(s, 13);
        assert!(s >= banner().score_threshold);
    }

    #[test]
    fn content_view_scores_below_threshold() {
        let root = Rect::from_edges(0, 0, 500, 700);
        let rect = Rect::from_edges(0, 100, 500, 700);

        let s = score(
            "EVA_ChildWindow",
            "OnlineMainView_0x123",
            &rect,
            &root,
            true,
            &rules(),
            &banner(),
        );

        // container(1) + overlap(2) + bottom(2) + content(-5)
        assert_eq!(s, 0);
        assert!(s < banner().score_threshold);
    }

    #[test]
    fn score_is_deterministic() {
        let root = Rect::from_edges(0, 0, 500, 700);
        let rect = Rect::from_edges(0, 587, 500, 700);
        let rules = rules();
        let banner = banner();

        let first = score("Chrome_WidgetWin_1", "AdFit", &rect, &root, false, &rules, &banner);
        let second = score("Chrome_WidgetWin_1", "AdFit", &rect, &root, false, &rules, &banner);

        assert_eq!(first, second);
    }

    #[test]
    fn detect_banners_splits_hide_and_observed() {
        let sys = FakeWindowSystem::new();
        sys.add_window(1, 100, "EVA_Window", "카카오톡", Some(Rect::from_edges(0, 0, 500, 700)), true, 0);
        // Full-strength banner: chrome class + token + band + overlap + bottom.
        sys.add_window(2, 100, "Chrome_WidgetWin_1", "AdFit NAS", Some(Rect::from_edges(0, 587, 500, 700)), true, 1);
        // Near miss: a 60px container strip pinned to the bottom scores
        // container(1) + overlap(2) + bottom(2) = 5, one short of the
        // threshold — observed, never hidden.
        sys.add_window(3, 100, "EVA_ChildWindow", "", Some(Rect::from_edges(0, 640, 500, 700)), true, 1);

        let cache = IdentityCache::new(Duration::from_millis(100));
        let snap = graph::snapshot(&sys, &cache, 1, 8);
        let scan = detect_banners(&snap, 1, &rules(), &banner());

        assert_eq!(scan.to_hide.len(), 1);
        assert_eq!(scan.to_hide[0].handle, 2);
        assert_eq!(scan.observed.len(), 1);
        assert_eq!(scan.observed[0].handle, 3);
        assert_eq!(scan.observed[0].score, 5);
    }

    #[test]
    fn detect_banners_without_root_rect_is_empty() {
        let sys = FakeWindowSystem::new();
        sys.add_window(1, 100, "EVA_Window", "카카오톡", None, true, 0);

        let cache = IdentityCache::new(Duration::from_millis(100));
        let snap = graph::snapshot(&sys, &cache, 1, 8);
        let scan = detect_banners(&snap, 1, &rules(), &banner());

        assert!(scan.to_hide.is_empty());
        assert!(scan.observed.is_empty());
    }
}
