//! Backend for the `log` facade.

use crate::config::Config;
use anyhow::{Context, Result};
use log::LevelFilter;
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode, WriteLogger};
use std::fs::OpenOptions;

/// Install the global logger: a file logger when `logging.file` is configured,
/// otherwise standard error. `verbose` raises the level to `debug`.
pub fn init(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        LevelFilter::Debug.max(config.log_level())
    } else {
        config.log_level()
    };
    let log_config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Off)
        .set_thread_level(LevelFilter::Off)
        .build();

    match config.log_file() {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("cannot create {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            WriteLogger::init(level, log_config, file)
        }
        None => TermLogger::init(level, log_config, TerminalMode::Stderr, ColorChoice::Auto),
    }
    .context("logger already initialised")
}
