//! Ad-surface pattern rules and their compiled matcher.
//!
//! Rules arrive from `patterns.toml` as `{ kind, value }` tables and are
//! compiled once into a [`PatternSet`] grouped by kind, so matching a
//! window is a handful of cheap string operations in a fixed order:
//! equals → starts-with → contains → regex. First match wins.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::log_warn;

/// One pattern rule as written in the config file.
///
/// `kind` is kept as a plain string so a single unknown kind drops that
/// rule with a warning instead of failing the whole file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSpec {
    pub kind: String,
    pub value: String,
}

impl PatternSpec {
    pub fn new(kind: &str, value: &str) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// A compiled pattern rule.
///
/// The closed set of kinds is a real enum so every consumer matches it
/// exhaustively; an unknown kind never reaches this type.
#[derive(Debug, Clone)]
pub enum AdPattern {
    TextStartsWith(String),
    TextContains(String),
    TextEquals(String),
    /// `compiled` is `None` when the expression failed to compile; such
    /// a pattern never matches (warned once at compile time).
    TextRegex {
        source: String,
        compiled: Option<Regex>,
    },
    ClassEquals(String),
    ClassStartsWith(String),
}

impl AdPattern {
    /// Compiles one spec, or `None` for an unknown kind or empty value.
    pub fn compile(spec: &PatternSpec) -> Option<Self> {
        let value = spec.value.trim();
        if value.is_empty() {
            log_warn!("Dropping pattern with empty value (kind '{}')", spec.kind);
            return None;
        }
        match spec.kind.as_str() {
            "text-starts-with" => Some(Self::TextStartsWith(value.into())),
            "text-contains" => Some(Self::TextContains(value.into())),
            "text-equals" => Some(Self::TextEquals(value.into())),
            "text-regex" => {
                let compiled = match Regex::new(&format!("(?i){value}")) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        log_warn!("Pattern regex '{value}' failed to compile: {e}");
                        None
                    }
                };
                Some(Self::TextRegex {
                    source: value.into(),
                    compiled,
                })
            }
            "class-equals" => Some(Self::ClassEquals(value.into())),
            "class-starts-with" => Some(Self::ClassStartsWith(value.into())),
            other => {
                log_warn!("Dropping pattern with unknown kind '{other}'");
                None
            }
        }
    }

    /// Evaluates this single pattern against a window's text and class.
    pub fn matches(&self, text: &str, class: &str) -> bool {
        match self {
            Self::TextStartsWith(v) => text.starts_with(v),
            Self::TextContains(v) => text.contains(v),
            Self::TextEquals(v) => text == v,
            Self::TextRegex { compiled, .. } => {
                compiled.as_ref().is_some_and(|re| re.is_match(text))
            }
            Self::ClassEquals(v) => class == v,
            Self::ClassStartsWith(v) => class.starts_with(v),
        }
    }
}

/// A set of patterns grouped by kind for cheap-first evaluation.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    text_equals: Vec<String>,
    class_equals: Vec<String>,
    text_starts_with: Vec<String>,
    class_starts_with: Vec<String>,
    text_contains: Vec<String>,
    text_regex: Vec<Regex>,
}

impl PatternSet {
    /// Compiles the raw rule list, dropping malformed entries with a
    /// warning.
    pub fn compile(specs: &[PatternSpec]) -> Self {
        let mut set = Self::default();
        for spec in specs {
            let Some(pattern) = AdPattern::compile(spec) else {
                continue;
            };
            match pattern {
                AdPattern::TextEquals(v) => set.text_equals.push(v),
                AdPattern::ClassEquals(v) => set.class_equals.push(v),
                AdPattern::TextStartsWith(v) => set.text_starts_with.push(v),
                AdPattern::ClassStartsWith(v) => set.class_starts_with.push(v),
                AdPattern::TextContains(v) => set.text_contains.push(v),
                AdPattern::TextRegex { compiled, .. } => {
                    if let Some(re) = compiled {
                        set.text_regex.push(re);
                    }
                }
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.text_equals.is_empty()
            && self.class_equals.is_empty()
            && self.text_starts_with.is_empty()
            && self.class_starts_with.is_empty()
            && self.text_contains.is_empty()
            && self.text_regex.is_empty()
    }

    /// Returns whether any pattern matches the window. Evaluation order
    /// is fixed (equals → starts-with → contains → regex) so identical
    /// inputs always take the identical path.
    pub fn matches(&self, text: &str, class: &str) -> bool {
        if self.text_equals.iter().any(|v| text == v) {
            return true;
        }
        if self.class_equals.iter().any(|v| class == v) {
            return true;
        }
        if self.text_starts_with.iter().any(|v| text.starts_with(v)) {
            return true;
        }
        if self.class_starts_with.iter().any(|v| class.starts_with(v)) {
            return true;
        }
        if self.text_contains.iter().any(|v| text.contains(v)) {
            return true;
        }
        self.text_regex.iter().any(|re| re.is_match(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(specs: &[(&str, &str)]) -> PatternSet {
        let specs: Vec<PatternSpec> = specs
            .iter()
            .map(|(k, v)| PatternSpec::new(k, v))
            .collect();
        PatternSet::compile(&specs)
    }

    #[test]
    fn text_starts_with_matches_prefix_only() {
        let set = set(&[("text-starts-with", "BannerAdView")]);
        assert!(set.matches("BannerAdView_0x42", ""));
        assert!(!set.matches("MyBannerAdView", ""));
    }

    #[test]
    fn class_equals_requires_exact_class() {
        let set = set(&[("class-equals", "EVA_Window")]);
        assert!(set.matches("", "EVA_Window"));
        assert!(!set.matches("", "EVA_Window_Dialog"));
    }

    #[test]
    fn regex_matches_case_insensitively() {
        let set = set(&[("text-regex", r"ad(view|fit)\b")]);
        assert!(set.matches("Main AdFit panel", ""));
        assert!(!set.matches("radfitter", ""));
    }

    #[test]
    fn broken_regex_never_matches() {
        let set = set(&[("text-regex", r"ad[unclosed")]);
        assert!(!set.matches("ad[unclosed", ""));
    }

    #[test]
    fn unknown_kind_is_dropped() {
        let set = set(&[("text-fuzzy", "whatever")]);
        assert!(set.is_empty());
    }

    #[test]
    fn empty_value_is_dropped() {
        let set = set(&[("text-contains", "   ")]);
        assert!(set.is_empty());
    }

    #[test]
    fn first_match_short_circuits_across_kinds() {
        // Arrange — a window matching both an equals and a contains rule.
        let set = set(&[
            ("text-contains", "AdView"),
            ("text-equals", "AdView"),
        ]);

        // Act / Assert — either way the result is a match.
        assert!(set.matches("AdView", "EVA_ChildWindow"));
    }
}
