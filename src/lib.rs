//! A small interactive command interpreter with pipelines, redirection and job control.
//!
//! An input line is split into `;`-separated statements, each statement into
//! `|`-separated stages, and each stage into an argument vector plus its `<`, `>` and
//! `>>` redirections. State-mutating built-ins such as `cd` run inside the interpreter
//! process; everything else runs as child processes placed in their own process group,
//! wired together with pipes and supervised by the job controller.
//!
//! The main entry point is [`Interpreter`]. The public modules expose the data model
//! ([`command`]), the parser ([`parser`]) and the execution engine ([`pipeline`],
//! [`jobs`]) for callers that want to drive them directly.

mod builtin;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod history;
mod interpreter;
pub mod io_adapters;
pub mod jobs;
pub mod launcher;
pub mod lexer;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod session;

/// Just a convenient re-export of the interactive command runner.
///
/// See [`Interpreter`] for the high-level API and examples.
pub use interpreter::Interpreter;

pub use config::Config;
pub use session::Session;

/// Serialises tests that touch process-wide state: the working directory and the
/// foreground slot.
#[cfg(test)]
pub(crate) fn serial_guard() -> std::sync::MutexGuard<'static, ()> {
    use std::sync::{Mutex, OnceLock};
    static MUTEX: OnceLock<Mutex<()>> = OnceLock::new();
    MUTEX
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}
