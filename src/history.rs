use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// Bounded log of past input lines, oldest first.
///
/// When a file is attached the whole log is rewritten after every new entry.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    path: Option<PathBuf>,
}

impl History {
    pub const DEFAULT_CAPACITY: usize = 20;

    /// A history that is never written to disk.
    pub fn in_memory(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            path: None,
        }
    }

    /// Load the log kept at `path`; a missing or unreadable file gives an empty history.
    ///
    /// Only the newest `capacity` lines are kept when the file holds more.
    pub fn load(path: impl Into<PathBuf>, capacity: usize) -> Self {
        let path = path.into();
        let mut history = Self::in_memory(capacity);
        match fs::read_to_string(&path) {
            Ok(content) => {
                for line in content.lines().filter(|l| !l.trim().is_empty()) {
                    history.insert(line);
                }
                debug!("loaded {} history entries from {}", history.len(), path.display());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("cannot read history {}: {e}", path.display()),
        }
        history.path = Some(path);
        history
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record `line` and persist the log. Blank lines are ignored.
    ///
    /// The entry is kept in memory even when writing the file fails.
    pub fn push(&mut self, line: &str) -> Result<()> {
        if line.trim().is_empty() {
            return Ok(());
        }
        self.insert(line);
        self.persist()
    }

    fn insert(&mut self, line: &str) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_string());
    }

    fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }
        let mut content = String::new();
        for entry in &self.entries {
            content.push_str(entry);
            content.push('\n');
        }
        fs::write(path, content).with_context(|| format!("cannot write {}", path.display()))
    }

    /// The newest `n` entries in chronological order; `n` is clamped to the stored count.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &str> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
