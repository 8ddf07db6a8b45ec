use crate::config::Config;
use crate::history::History;
use crate::jobs::{JobTable, Terminal};
use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Mutable state of one interpreter session.
///
/// Owned by the main loop and lent to built-ins by mutable reference. The foreground
/// process slot lives in [`crate::jobs`] instead.
#[derive(Debug)]
pub struct Session {
    /// Working directory at start-up; `~` refers to it.
    pub base_dir: PathBuf,
    pub current_dir: PathBuf,
    /// Directory before the last successful change, for `cd -`.
    pub previous_dir: Option<PathBuf>,
    pub history: History,
    pub jobs: JobTable,
    pub config: Config,
    /// Set by `exit`; the main loop stops before the next statement.
    pub should_exit: bool,
}

impl Session {
    /// Capture the process working directory and open the configured history.
    pub fn new(config: Config, terminal: Option<Terminal>) -> Result<Self> {
        let base_dir = env::current_dir().context("cannot determine the working directory")?;
        let history = match config.history_path(&base_dir) {
            Some(path) => History::load(path, config.history.capacity),
            None => History::in_memory(config.history.capacity),
        };
        let jobs = JobTable::new(config.jobs.max_background).with_terminal(terminal);
        Ok(Self {
            current_dir: base_dir.clone(),
            base_dir,
            previous_dir: None,
            history,
            jobs,
            config,
            should_exit: false,
        })
    }

    /// Change the process working directory to `target` (relative to the current one).
    ///
    /// On success the old directory becomes [`Session::previous_dir`].
    pub fn change_dir(&mut self, target: &Path) -> Result<()> {
        let new_dir = self.current_dir.join(target);
        let canonical = fs::canonicalize(&new_dir)
            .with_context(|| target.display().to_string())?;
        env::set_current_dir(&canonical)
            .with_context(|| target.display().to_string())?;
        let old = std::mem::replace(&mut self.current_dir, canonical);
        self.previous_dir = Some(old);
        Ok(())
    }

    /// Expand a leading `~` to the start-up directory.
    pub fn expand_tilde(&self, arg: &str) -> PathBuf {
        match arg.strip_prefix('~') {
            Some("") => self.base_dir.clone(),
            Some(rest) if rest.starts_with('/') => self.base_dir.join(&rest[1..]),
            _ => PathBuf::from(arg),
        }
    }

    /// Current directory with the start-up directory shown as `~`.
    pub fn display_dir(&self) -> String {
        match self.current_dir.strip_prefix(&self.base_dir) {
            Ok(rest) if rest.as_os_str().is_empty() => "~".to_string(),
            Ok(rest) => format!("~/{}", rest.display()),
            Err(_) => self.current_dir.display().to_string(),
        }
    }

    /// A session rooted at `dir` with an in-memory history and no terminal.
    #[cfg(test)]
    pub(crate) fn for_tests(dir: &Path) -> Self {
        let config = Config::default_config();
        Self {
            base_dir: dir.to_path_buf(),
            current_dir: dir.to_path_buf(),
            previous_dir: None,
            history: History::in_memory(config.history.capacity),
            jobs: JobTable::new(config.jobs.max_background),
            config,
            should_exit: false,
        }
    }
}
