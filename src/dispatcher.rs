//! Routing of a parsed pipeline to an in-process built-in or to child processes.

use crate::builtin;
use crate::command::{BuiltinKind, CommandFactory, ExitCode, Pipeline};
use crate::error::{ParseError, ShellError};
use crate::io_adapters::OutputSink;
use crate::pipeline::{ExitReport, run_pipeline};
use crate::session::Session;
use log::debug;

/// Factory allows creating instances of ExecutableCommand.
///
/// Only supports built-ins defined in this crate; see [`crate::command::CommandFactory`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// Where a pipeline is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Run a built-in against the session inside the interpreter process.
    InProcess,
    /// Launch every stage as a child process.
    External,
}

/// Result of [`Dispatcher::dispatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    InProcess(ExitCode),
    Spawned(ExitReport),
}

impl Outcome {
    pub fn status(&self) -> ExitCode {
        match self {
            Outcome::InProcess(code) => *code,
            Outcome::Spawned(report) => report.status(),
        }
    }
}

/// Registry of built-ins plus the classification rule.
pub struct Dispatcher {
    builtins: Vec<Box<dyn CommandFactory>>,
}

impl Default for Dispatcher {
    /// All built-ins: `cd`, `exit`, `pwd`, `echo`, `ls`, `pinfo`, `search`, `history`.
    fn default() -> Self {
        Self::new(builtin::factories())
    }
}

impl Dispatcher {
    pub fn new(builtins: Vec<Box<dyn CommandFactory>>) -> Self {
        Self { builtins }
    }

    fn builtin(&self, name: &str) -> Option<&dyn CommandFactory> {
        self.builtins
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    /// Decide how `pipeline` runs.
    ///
    /// State-mutating built-ins always run in-process, even when backgrounded.
    /// Other built-ins run in-process only as a single foreground command; inside a
    /// multi-stage or background pipeline their name is launched as a program.
    pub fn classify(&self, pipeline: &Pipeline) -> Route {
        let [command] = pipeline.stages.as_slice() else {
            return Route::External;
        };
        match self.builtin(command.name()).map(|f| f.kind()) {
            Some(BuiltinKind::StateMutating) => Route::InProcess,
            Some(BuiltinKind::Stateless) if !command.background => Route::InProcess,
            _ => Route::External,
        }
    }

    /// Run `pipeline` according to [`Dispatcher::classify`].
    pub fn dispatch(&self, pipeline: &Pipeline, session: &mut Session) -> Result<Outcome, ShellError> {
        if pipeline.stages.iter().any(|c| c.argv.is_empty()) {
            return Err(ParseError::EmptyCommand.into());
        }
        let route = self.classify(pipeline);
        debug!("{:?}: {}", route, pipeline.text);

        match route {
            Route::External => run_pipeline(pipeline, &mut session.jobs).map(Outcome::Spawned),
            Route::InProcess => {
                let command = &pipeline.stages[0];
                let name = command.name();
                let Some(factory) = self.builtin(name) else {
                    return Err(ShellError::Exec(format!("{name}: not a built-in")));
                };
                let args: Vec<&str> = command.args().iter().map(String::as_str).collect();
                let Some(builtin) = factory.try_create(name, &args) else {
                    return Err(ShellError::Exec(format!("{name}: not a built-in")));
                };
                let mut sink = OutputSink::for_command(command)?;
                let code = builtin
                    .execute(&mut sink, session)
                    .map_err(|e| ShellError::Exec(format!("{name}: {e:#}")))?;
                Ok(Outcome::InProcess(code))
            }
        }
    }
}
