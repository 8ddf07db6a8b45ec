use crate::command::ExitCode;
use crate::dispatcher::{Dispatcher, Outcome};
use crate::launcher::{self, EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND};
use crate::parser;
use crate::pipeline::{ExitReport, StageStatus};
use crate::session::Session;
use log::{debug, warn};
use nix::sys::signal::Signal;
use nix::sys::utsname::uname;
use nix::unistd::{User, getuid};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

/// The interactive command interpreter.
///
/// Owns the [`Session`] and a [`Dispatcher`]; every input line goes through
/// [`Interpreter::execute_line`].
///
/// Example
/// ```no_run
/// use minish::{Config, Interpreter, Session};
/// let session = Session::new(Config::load(None), None).unwrap();
/// let mut sh = Interpreter::new(session);
/// sh.execute_line("echo hello | tr a-z A-Z");
/// ```
pub struct Interpreter {
    session: Session,
    dispatcher: Dispatcher,
}

impl Interpreter {
    /// Create an interpreter with every built-in registered.
    pub fn new(session: Session) -> Self {
        Self {
            session,
            dispatcher: Dispatcher::default(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// `<user>@<sysname>:<dir>> `
    pub fn prompt(&self) -> String {
        let user = User::from_uid(getuid())
            .ok()
            .flatten()
            .map(|u| u.name)
            .unwrap_or_else(|| getuid().to_string());
        let system = uname()
            .map(|u| u.sysname().to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{user}@{system}:{}> ", self.session.display_dir())
    }

    /// Record `line` in history, then run each of its statements in order.
    ///
    /// Errors are printed and never end the session. Returns the status of the last
    /// statement that ran.
    pub fn execute_line(&mut self, line: &str) -> ExitCode {
        if let Err(e) = self.session.history.push(line) {
            warn!("history not saved: {e:#}");
        }

        let statements = match parser::parse_line(line) {
            Ok(statements) => statements,
            Err(e) => {
                eprintln!("minish: {e}");
                return 2;
            }
        };
        debug!("parsed {} statement(s): {statements:?}", statements.len());

        let mut status = 0;
        for pipeline in &statements {
            status = match self.dispatcher.dispatch(pipeline, &mut self.session) {
                Ok(outcome) => {
                    report(&outcome);
                    outcome.status()
                }
                Err(e) if e.is_silent() => 0,
                Err(e) => {
                    eprintln!("minish: {e}");
                    1
                }
            };
            if self.session.should_exit {
                break;
            }
        }
        status
    }

    /// Print a notice for every background job that finished since the last call.
    pub fn report_finished_jobs(&mut self) {
        for completion in self.session.jobs.reap() {
            println!("{completion}");
        }
    }

    /// Read and execute lines until `exit` or end of input.
    ///
    /// Only a failure to read input is returned as an error.
    pub fn repl(&mut self) -> rustyline::Result<()> {
        let mut rl = DefaultEditor::new()?;
        for entry in self.session.history.iter() {
            rl.add_history_entry(entry)?;
        }

        let result = loop {
            self.report_finished_jobs();
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    self.execute_line(&line);
                    if self.session.should_exit {
                        break Ok(());
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => {
                    println!();
                    break Ok(());
                }
                Err(err) => break Err(err),
            }
        };
        self.shutdown();
        result
    }

    /// Run one line non-interactively, then end the session.
    pub fn run_line(&mut self, line: &str) -> ExitCode {
        let status = self.execute_line(line);
        self.report_finished_jobs();
        self.shutdown();
        status
    }

    /// Stopped jobs would otherwise stay suspended forever.
    fn shutdown(&mut self) {
        self.session.jobs.hangup_stopped();
    }
}

/// Print failures of spawned stages that the stage could not report itself.
fn report(outcome: &Outcome) {
    let Outcome::Spawned(ExitReport::Completed { stages }) = outcome else {
        return;
    };
    for StageStatus { name, code } in stages {
        if should_report(*code) {
            eprintln!("minish: {name}: {}", launcher::describe_status(*code));
        }
    }
}

fn should_report(code: ExitCode) -> bool {
    let quiet_signals = [Signal::SIGINT, Signal::SIGPIPE].map(|s| 128 + s as i32);
    match code {
        EXIT_NOT_FOUND | EXIT_NOT_EXECUTABLE => true,
        code if code > 128 => !quiet_signals.contains(&code),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn interpreter(dir: &Path) -> Interpreter {
        Interpreter::new(Session::for_tests(dir))
    }

    #[test]
    fn statements_run_in_order() {
        let _guard = crate::serial_guard();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("seq.txt");
        let mut sh = interpreter(dir.path());

        let line = format!(
            "echo one > {0}; sh -c 'sleep 0.2; echo two' >> {0}; echo three >> {0}",
            out.display()
        );
        assert_eq!(sh.execute_line(&line), 0);
        assert_eq!(fs::read_to_string(&out).unwrap(), "one\ntwo\nthree\n");
    }

    #[test]
    fn exit_stops_remaining_statements() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("never.txt");
        let mut sh = interpreter(dir.path());

        sh.execute_line(&format!("exit; echo late > {}", out.display()));
        assert!(sh.session().should_exit);
        assert!(!out.exists());
    }

    #[test]
    fn every_line_is_recorded_before_running() {
        let dir = tempfile::tempdir().unwrap();
        let mut sh = interpreter(dir.path());
        sh.execute_line("history 1 > /dev/null");
        sh.execute_line("echo \"unterminated");
        sh.execute_line("   ");
        let entries: Vec<&str> = sh.session().history.iter().collect();
        assert_eq!(entries, ["history 1 > /dev/null", "echo \"unterminated"]);
    }

    #[test]
    fn errors_do_not_end_the_session() {
        let _guard = crate::serial_guard();
        let dir = tempfile::tempdir().unwrap();
        let mut sh = interpreter(dir.path());
        assert_eq!(sh.execute_line("cat <"), 2);
        assert_eq!(sh.execute_line("no-such-program-xyz"), EXIT_NOT_FOUND);
        assert_eq!(sh.execute_line("> only-redirect.txt"), 0);
        assert_eq!(sh.execute_line("true"), 0);
        assert!(!sh.session().should_exit);
    }

    #[test]
    fn reported_statuses() {
        assert!(should_report(EXIT_NOT_FOUND));
        assert!(should_report(EXIT_NOT_EXECUTABLE));
        assert!(should_report(128 + 9));
        assert!(!should_report(130));
        assert!(!should_report(141));
        assert!(!should_report(1));
        assert!(!should_report(launcher::EXIT_REDIRECT_FAILED));
    }

    #[test]
    fn prompt_shows_start_directory_as_tilde() {
        let dir = tempfile::tempdir().unwrap();
        let sh = interpreter(dir.path());
        let prompt = sh.prompt();
        assert!(prompt.ends_with(":~> "), "{prompt}");
        assert!(prompt.contains('@'));
    }
}
