use crate::session::Session;
use anyhow::Result;
use std::io::Write;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// This mirrors the convention used by POSIX shells and many command-line tools.
pub type ExitCode = i32;

/// How an output redirection treats an existing file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// `>`: replace the previous content.
    #[default]
    Truncate,
    /// `>>`: keep the previous content and write after it.
    Append,
}

/// One stage of a pipeline after redirection operators have been resolved.
///
/// `argv` is never empty. Redirection paths are kept as written and only opened,
/// relative to the working directory of that moment, when the stage executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Program or built-in name followed by its arguments.
    pub argv: Vec<String>,
    /// Target of `<`.
    pub input_path: Option<String>,
    /// Target of `>` or `>>`.
    pub output_path: Option<String>,
    /// Meaningful only when `output_path` is set.
    pub output_mode: OutputMode,
    /// Set on the last stage when the pipeline ended with `&`.
    pub background: bool,
}

impl Command {
    /// Build a plain command without any redirection.
    pub fn new<S: Into<String>>(argv: impl IntoIterator<Item = S>) -> Self {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            input_path: None,
            output_path: None,
            output_mode: OutputMode::default(),
            background: false,
        }
    }

    /// The program or built-in name (`argv[0]`).
    pub fn name(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }

    /// Arguments after the name.
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or_default()
    }
}

/// Stages connected left to right; stage `i` writes into stage `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub stages: Vec<Command>,
    /// Text of the pipeline as typed, used in job notifications.
    pub text: String,
}

impl Pipeline {
    /// Only the last stage's flag decides whether the whole pipeline runs in background.
    pub fn is_background(&self) -> bool {
        self.stages.last().is_some_and(|c| c.background)
    }
}

/// Pipelines separated by `;`, run strictly in order.
pub type StatementList = Vec<Pipeline>;

/// Whether a built-in must touch the session of the interpreter's own process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinKind {
    /// `cd`, `exit`: only meaningful when applied to the interpreter itself.
    StateMutating,
    /// Output-only helpers that may also run as an external program.
    Stateless,
}

/// Object-safe trait for any built-in that can be executed by the shell.
///
/// Implemented through a blanket impl for every built-in. A built-in never forks and
/// never touches pipes; it only writes to the stream it is handed.
pub trait ExecutableCommand {
    /// Executes the command.
    fn execute(self: Box<Self>, stdout: &mut dyn Write, session: &mut Session) -> Result<ExitCode>;
}

/// Factory that tries to create a built-in from a name and its arguments.
pub trait CommandFactory {
    /// Name the factory answers to.
    fn name(&self) -> &'static str;

    /// Classification used by the dispatcher.
    fn kind(&self) -> BuiltinKind;

    /// Attempt to create a command instance for the provided name and arguments.
    ///
    /// Returns `None` when the factory doesn't recognize the `name`.
    fn try_create(&self, name: &str, args: &[&str]) -> Option<Box<dyn ExecutableCommand>>;
}
