use std::path::PathBuf;

use super::{Config, RuleSet};

/// Returns the config directory: `~/.config/adshade/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".config").join("adshade"))
}

/// Returns the config file path: `~/.config/adshade/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Returns the rules file path: `~/.config/adshade/patterns.toml`.
pub fn patterns_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("patterns.toml"))
}

/// Tries to load and parse `config.toml`.
///
/// Returns `Ok(Config)` on success, or an error string describing
/// what went wrong (IO error, parse error, etc.).
pub fn try_load() -> Result<Config, String> {
    let path = config_path().ok_or("could not determine config path")?;
    let content = std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut config: Config =
        toml::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))?;
    config.validate();
    Ok(config)
}

/// Loads the configuration from disk, falling back to defaults.
///
/// After loading, values are clamped to safe ranges via [`Config::validate`].
/// Non-existent files silently return defaults; other IO errors are logged.
pub fn load() -> Config {
    load_or_default(try_load, Config::default)
}

/// Tries to load and parse `patterns.toml`.
///
/// Returns the parsed rule set or an error string.
pub fn try_load_rules() -> Result<RuleSet, String> {
    let path = patterns_path().ok_or("could not determine patterns path")?;
    let content = std::fs::read_to_string(&path).map_err(|e| format!("{}: {e}", path.display()))?;
    let rules: RuleSet = toml::from_str(&content).map_err(|e| format!("{}: {e}", path.display()))?;
    Ok(rules)
}

/// Loads rules from `~/.config/adshade/patterns.toml`.
///
/// Falls back to the stock defaults if the file is missing or invalid.
pub fn load_rules() -> RuleSet {
    load_or_default(try_load_rules, RuleSet::default)
}

/// Loads a config value from disk, falling back to defaults.
///
/// Non-existent files silently return defaults; other IO errors are logged.
fn load_or_default<T>(try_load: impl FnOnce() -> Result<T, String>, default: impl Fn() -> T) -> T {
    match try_load() {
        Ok(val) => val,
        Err(e) if is_file_not_found(&e) => default(),
        Err(e) => {
            eprintln!("Warning: {e}");
            default()
        }
    }
}

/// Returns true if the error message indicates a missing file.
fn is_file_not_found(e: &str) -> bool {
    e.contains("cannot find the path")
        || e.contains("The system cannot find")
        || e.contains("No such file")
}
