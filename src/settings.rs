use crate::cache::MAX_TTL;
use crate::core::{DashError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application settings parsed from an optional TOML file.
///
/// These configure the tool itself; database credentials live in the
/// per-dashboard key=value files under `config_dir`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the `DashboardN.toml` credential files
    pub config_dir: PathBuf,
    /// tracing filter directive, e.g. "info" or "dashfeed=debug"
    pub log_level: String,
    /// Rebuild connection handles older than this; unset keeps them for the process lifetime
    pub connection_ttl_secs: Option<u64>,
    /// Upper bound on cached query results per dashboard
    pub cache_capacity: u64,
    /// Per-dashboard result TTL overrides in seconds, keyed by dashboard name
    pub ttl_overrides: HashMap<String, u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            config_dir: PathBuf::from(".streamlit"),
            log_level: "info".to_string(),
            connection_ttl_secs: None,
            cache_capacity: 16,
            ttl_overrides: HashMap::new(),
        }
    }
}

impl Settings {
    /// Rejects durations the cache and connection layers cannot hold
    pub fn validate(&self) -> Result<()> {
        let max = MAX_TTL.as_secs();
        if let Some(secs) = self.connection_ttl_secs.filter(|secs| *secs > max) {
            return Err(DashError::Settings(format!(
                "connection_ttl_secs = {} exceeds the maximum of {}",
                secs, max
            )));
        }
        let mut too_long: Vec<_> = self
            .ttl_overrides
            .iter()
            .filter(|(_, secs)| **secs > max)
            .collect();
        too_long.sort();
        if let Some((name, secs)) = too_long.first() {
            return Err(DashError::Settings(format!(
                "ttl_overrides.{} = {} exceeds the maximum of {}",
                name, secs, max
            )));
        }
        Ok(())
    }

    pub fn connection_ttl(&self) -> Option<Duration> {
        self.connection_ttl_secs.map(Duration::from_secs)
    }

    /// Result TTL for a dashboard, honoring any override
    pub fn query_ttl(&self, dashboard: &str, default: Duration) -> Duration {
        self.ttl_overrides
            .get(dashboard)
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(default)
    }
}

/// Default settings location: `<config dir>/dashfeed/settings.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("dashfeed").join("settings.toml"))
}

/// Loads settings from a TOML file at the given path.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| DashError::Settings(format!("cannot read {}: {}", path.display(), e)))?;
    let settings: Settings = toml::from_str(&content)
        .map_err(|e| DashError::Settings(format!("invalid {}: {}", path.display(), e)))?;
    settings.validate()?;
    Ok(settings)
}

/// Resolves settings: an explicit path must load, the default location is
/// used only if present, otherwise built-in defaults apply.
pub fn resolve_settings(explicit: Option<&Path>) -> Result<Settings> {
    if let Some(path) = explicit {
        return load_settings(path);
    }
    match default_settings_path() {
        Some(path) if path.is_file() => load_settings(path),
        _ => Ok(Settings::default()),
    }
}
