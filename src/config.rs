use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Embedded default configuration.
const DEFAULT_CONFIG: &str = include_str!("../config.default.toml");

// ── Final (merged) config types ──

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HistoryConfig {
    /// Empty selects the per-user data directory.
    #[serde(default)]
    pub file: String,
    #[serde(default)]
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct JobsConfig {
    #[serde(default)]
    pub max_background: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct SearchConfig {
    #[serde(default)]
    pub max_depth: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: String,
    /// Empty logs to standard error.
    #[serde(default)]
    pub file: String,
}

// ── Overlay types (user config that merges with defaults) ──

#[derive(Debug, Deserialize, Default)]
struct ConfigOverlay {
    #[serde(default)]
    history: HistoryOverlay,
    #[serde(default)]
    jobs: JobsOverlay,
    #[serde(default)]
    search: SearchOverlay,
    #[serde(default)]
    logging: LoggingOverlay,
}

#[derive(Debug, Deserialize, Default)]
struct HistoryOverlay {
    file: Option<String>,
    capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct JobsOverlay {
    max_background: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SearchOverlay {
    max_depth: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct LoggingOverlay {
    level: Option<String>,
    file: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

impl Config {
    /// Load the default embedded configuration.
    pub fn default_config() -> Self {
        toml::from_str(DEFAULT_CONFIG).expect("embedded default config must parse")
    }

    /// Load configuration with resolution order:
    /// 1. Start with embedded defaults
    /// 2. Overlay `explicit` if given, else `<config dir>/minish/config.toml` if it exists
    ///
    /// Scalars present in the user file override the defaults. A file that cannot be
    /// read or parsed is reported on standard error and ignored.
    pub fn load(explicit: Option<&Path>) -> Self {
        let mut config = Self::default_config();
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::user_config_path().filter(|p| p.exists()),
        };
        if let Some(overlay) = path.as_deref().and_then(Self::load_overlay) {
            config.apply_overlay(overlay);
        }
        config
    }

    /// `<config dir>/minish/config.toml`, e.g. `~/.config/minish/config.toml`.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("minish").join("config.toml"))
    }

    fn load_overlay(path: &Path) -> Option<ConfigOverlay> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                eprintln!("minish: cannot read config {}: {e}", path.display());
                return None;
            }
        };
        Self::parse_overlay(&content, path)
    }

    fn parse_overlay(content: &str, origin: &Path) -> Option<ConfigOverlay> {
        match toml::from_str(content) {
            Ok(overlay) => Some(overlay),
            Err(e) => {
                eprintln!("minish: config parse error in {}: {e}", origin.display());
                None
            }
        }
    }

    /// Apply an overlay on top of this config.
    fn apply_overlay(&mut self, overlay: ConfigOverlay) {
        let h = overlay.history;
        if let Some(v) = h.file {
            self.history.file = v;
        }
        if let Some(v) = h.capacity {
            self.history.capacity = v;
        }
        if let Some(v) = overlay.jobs.max_background {
            self.jobs.max_background = v;
        }
        if let Some(v) = overlay.search.max_depth {
            self.search.max_depth = v;
        }
        let l = overlay.logging;
        if let Some(v) = l.level {
            self.logging.level = v;
        }
        if let Some(v) = l.file {
            self.logging.file = v;
        }
    }

    /// Where the history log lives. `None` when no data directory can be determined.
    pub fn history_path(&self, base_dir: &Path) -> Option<PathBuf> {
        if self.history.file.is_empty() {
            return dirs::data_dir().map(|d| d.join("minish").join("history"));
        }
        Some(base_dir.join(&self.history.file))
    }

    /// Configured log level; unknown names fall back to `warn`.
    pub fn log_level(&self) -> LevelFilter {
        self.logging.level.parse().unwrap_or(LevelFilter::Warn)
    }

    pub fn log_file(&self) -> Option<&Path> {
        (!self.logging.file.is_empty()).then(|| Path::new(&self.logging.file))
    }
}
