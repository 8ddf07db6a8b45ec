use std::io;
use thiserror::Error;

/// Errors produced while turning an input line into commands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A single or double quote was opened but never closed.
    #[error("unterminated quote")]
    UnterminatedQuote,
    /// A redirection operator was the last token of its stage.
    #[error("syntax error: expected a file name after `{0}`")]
    MissingRedirectTarget(String),
    /// Nothing to run: blank line, lone separators or only redirections.
    #[error("empty command")]
    EmptyCommand,
    /// A stage between two `|` operators is blank (`a | | b`).
    #[error("syntax error: empty command in pipeline")]
    EmptyPipelineStage,
}

/// Failures of the execution engine. None of them are fatal to the interpreter.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Pipe, fork or job-table exhaustion.
    #[error("{0}")]
    Resource(String),
    /// A redirection target could not be opened by the interpreter itself.
    #[error("{path}: {source}")]
    Redirection {
        path: String,
        #[source]
        source: io::Error,
    },
    /// The program could not be prepared for execution (e.g. interior NUL byte).
    #[error("{0}")]
    Exec(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ShellError {
    pub(crate) fn resource(what: &str, err: nix::errno::Errno) -> Self {
        ShellError::Resource(format!("{what}: {}", err.desc()))
    }

    /// Whether the main loop should stay quiet about this error.
    pub fn is_silent(&self) -> bool {
        matches!(self, ShellError::Parse(ParseError::EmptyCommand))
    }
}
